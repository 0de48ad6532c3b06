//! Impls - ports の実装（開発用・テスト用）
//!
//! 本番用の実装（Postgres の record store, S3 互換の blob store, HTTP の
//! model provider）は別クレートに置く想定です。

pub mod memory_store;

pub use self::memory_store::{InMemoryArtifactStore, InMemoryBlobStore};
