//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（record store, blob storage, model provider）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod artifact_store;
pub mod clock;
pub mod expiry_source;
pub mod id_generator;
pub mod model_provider;

pub use self::artifact_store::{ArtifactStore, BlobStore};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::expiry_source::ExpiryInfoSource;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::model_provider::ModelProvider;
