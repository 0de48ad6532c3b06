//! App - アプリケーション層
//!
//! ports を組み合わせて artifact のライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **ExpiryService**: 期限参照・延長・期限間近の一覧・一括削除
//! - **LifecycleMonitor**: artifact ごとの期限監視タイマー
//! - **CleanupLoop**: 期限切れ artifact の定期掃除
//! - **poll_training / poll_images**: 外部ジョブの完了待ち
//! - **GenerationPipeline**: 学習待ちから画像生成・record 更新まで

pub mod cleanup_loop;
pub mod expiry;
pub mod monitor;
pub mod pipeline;
pub mod poll_loop;

pub use self::cleanup_loop::{CleanupLoop, CleanupLoopHandle};
pub use self::expiry::{CleanupReport, ExpiringArtifact, ExpiryService};
pub use self::monitor::{ExpiryCallback, LifecycleMonitor};
pub use self::pipeline::GenerationPipeline;
pub use self::poll_loop::{CancelHandle, Cancellation, poll_images, poll_training};
