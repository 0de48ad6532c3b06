//! portrait-core
//!
//! Lifecycle management for AI-generated portrait images: expiry math,
//! per-artifact expiry monitoring, bulk cleanup and polling of the remote
//! training / generation jobs that produce the images.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, artifact, lifetime, poll_policy, remote, state, errors）
//! - **ports**: 抽象化レイヤー（ArtifactStore, BlobStore, ModelProvider, Clock, など）
//! - **app**: アプリケーションロジック（expiry, monitor, cleanup_loop, poll_loop, pipeline）
//! - **impls**: 実装（InMemoryArtifactStore など開発用）
//! - **config**: LifecycleConfig（JSON / 環境変数）
//! - **observability**: status 集計

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
