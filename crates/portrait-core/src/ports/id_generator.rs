//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::ArtifactId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は artifact の ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_artifact_id(&self) -> ArtifactId;
}

/// UlidGenerator は Clock を使って現在時刻ベースの ULID を生成します。
/// テスト時に FixedClock を渡せば timestamp 部分が固定されます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_artifact_id(&self) -> ArtifactId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        ArtifactId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
