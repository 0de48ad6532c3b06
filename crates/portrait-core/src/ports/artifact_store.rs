//! ArtifactStore / BlobStore ports
//!
//! ArtifactStore は generated image のメタ情報（正本）を保持し、
//! BlobStore は画像バイト列そのものを保持します。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ArtifactId, ArtifactRecord, ArtifactStatus, LifecycleError, OwnerId};
use crate::observability::ArtifactCounts;

/// Persistent record store for artifacts.
///
/// Point operations are keyed by `(artifact_id, owner_id)`: a record that
/// exists but belongs to someone else is indistinguishable from a missing one.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn insert(&self, record: ArtifactRecord) -> Result<(), LifecycleError>;

    async fn find(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
    ) -> Result<Option<ArtifactRecord>, LifecycleError>;

    /// Replace an existing record. `NotFound` if it does not exist.
    async fn update(&self, record: ArtifactRecord) -> Result<(), LifecycleError>;

    /// Reset `created_at`. Returns `false` when no record matched.
    async fn reset_created_at(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
        at: DateTime<Utc>,
    ) -> Result<bool, LifecycleError>;

    /// Records in `status` whose `created_at <= cutoff`, oldest first.
    async fn list_created_at_or_before(
        &self,
        status: ArtifactStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ArtifactRecord>, LifecycleError>;

    /// Delete those of `ids` that are still completed with `created_at <= cutoff`,
    /// returning the ids actually removed.
    ///
    /// The condition is checked at delete time, so a record extended after it
    /// was listed survives.
    async fn delete_expired(
        &self,
        ids: &[ArtifactId],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ArtifactId>, LifecycleError>;

    async fn counts_by_status(&self) -> Result<ArtifactCounts, LifecycleError>;
}

/// Binary storage for the image bytes behind a record's `result_url`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn delete(&self, artifact_id: ArtifactId, locator: &str) -> Result<(), LifecycleError>;
}
