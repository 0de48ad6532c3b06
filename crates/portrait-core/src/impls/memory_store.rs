//! In-memory adapters for the storage ports.
//!
//! # 学習ポイント
//! - tokio::sync::Mutex で HashMap を保護（ロックを跨いで await しない）
//! - owner でスコープした point read / update

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{ArtifactId, ArtifactRecord, ArtifactStatus, LifecycleError, OwnerId};
use crate::observability::ArtifactCounts;
use crate::ports::{ArtifactStore, BlobStore};

/// Artifact records kept in a `HashMap`, for development and tests.
#[derive(Default, Clone)]
pub struct InMemoryArtifactStore {
    records: Arc<Mutex<HashMap<ArtifactId, ArtifactRecord>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Lookup without the owner check, for assertions and admin tooling.
    pub async fn get_unscoped(&self, artifact_id: ArtifactId) -> Option<ArtifactRecord> {
        self.records.lock().await.get(&artifact_id).cloned()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn insert(&self, record: ArtifactRecord) -> Result<(), LifecycleError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.artifact_id) {
            return Err(LifecycleError::Store(format!(
                "duplicate artifact id {}",
                record.artifact_id
            )));
        }
        records.insert(record.artifact_id, record);
        Ok(())
    }

    async fn find(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
    ) -> Result<Option<ArtifactRecord>, LifecycleError> {
        let records = self.records.lock().await;
        Ok(records
            .get(&artifact_id)
            .filter(|r| r.owner_id == owner_id)
            .cloned())
    }

    async fn update(&self, record: ArtifactRecord) -> Result<(), LifecycleError> {
        let mut records = self.records.lock().await;
        match records.get_mut(&record.artifact_id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(LifecycleError::NotFound(format!(
                "artifact {}",
                record.artifact_id
            ))),
        }
    }

    async fn reset_created_at(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
        at: DateTime<Utc>,
    ) -> Result<bool, LifecycleError> {
        let mut records = self.records.lock().await;
        match records.get_mut(&artifact_id) {
            Some(record) if record.owner_id == owner_id => {
                record.extend(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_created_at_or_before(
        &self,
        status: ArtifactStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ArtifactRecord>, LifecycleError> {
        let records = self.records.lock().await;
        let mut matched: Vec<ArtifactRecord> = records
            .values()
            .filter(|r| r.status == status && r.created_at <= cutoff)
            .cloned()
            .collect();
        matched.sort_by_key(|r| (r.created_at, r.artifact_id));
        Ok(matched)
    }

    async fn delete_expired(
        &self,
        ids: &[ArtifactId],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ArtifactId>, LifecycleError> {
        let mut records = self.records.lock().await;
        let mut deleted = Vec::new();
        for id in ids {
            let expired = records.get(id).is_some_and(|r| {
                r.status == ArtifactStatus::Completed && r.created_at <= cutoff
            });
            if expired {
                records.remove(id);
                deleted.push(*id);
            }
        }
        Ok(deleted)
    }

    async fn counts_by_status(&self) -> Result<ArtifactCounts, LifecycleError> {
        let records = self.records.lock().await;
        let mut counts = ArtifactCounts::default();
        for record in records.values() {
            counts.record(record.status);
        }
        Ok(counts)
    }
}

/// Image bytes keyed by artifact id. Only the locator is kept; tests care
/// about presence, not content.
#[derive(Default, Clone)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<ArtifactId, String>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, artifact_id: ArtifactId, locator: impl Into<String>) {
        self.blobs.lock().await.insert(artifact_id, locator.into());
    }

    pub async fn contains(&self, artifact_id: ArtifactId) -> bool {
        self.blobs.lock().await.contains_key(&artifact_id)
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn delete(&self, artifact_id: ArtifactId, locator: &str) -> Result<(), LifecycleError> {
        match self.blobs.lock().await.remove(&artifact_id) {
            Some(_) => Ok(()),
            None => Err(LifecycleError::NotFound(format!(
                "blob {locator} for {artifact_id}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn completed(owner: OwnerId, created_at: DateTime<Utc>) -> ArtifactRecord {
        let mut record =
            ArtifactRecord::new(ArtifactId::from_ulid(Ulid::new()), owner, None, created_at);
        record.start(created_at).unwrap();
        record.complete("https://cdn/x.png", created_at).unwrap();
        record
    }

    #[tokio::test]
    async fn find_is_scoped_by_owner() {
        let store = InMemoryArtifactStore::new();
        let owner = OwnerId::from_ulid(Ulid::new());
        let stranger = OwnerId::from_ulid(Ulid::new());
        let record = completed(owner, t0());
        let id = record.artifact_id;
        store.insert(record).await.unwrap();

        assert!(store.find(id, owner).await.unwrap().is_some());
        assert!(store.find(id, stranger).await.unwrap().is_none());
        assert!(!store.reset_created_at(id, stranger, t0()).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryArtifactStore::new();
        let record = completed(OwnerId::from_ulid(Ulid::new()), t0());
        store.insert(record.clone()).await.unwrap();
        assert!(matches!(
            store.insert(record).await,
            Err(LifecycleError::Store(_))
        ));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_cutoff() {
        let store = InMemoryArtifactStore::new();
        let owner = OwnerId::from_ulid(Ulid::new());

        let old = completed(owner, t0() - TimeDelta::hours(2));
        let fresh = completed(owner, t0());
        let pending = ArtifactRecord::new(
            ArtifactId::from_ulid(Ulid::new()),
            owner,
            None,
            t0() - TimeDelta::hours(3),
        );
        let old_id = old.artifact_id;
        for r in [old, fresh, pending] {
            store.insert(r).await.unwrap();
        }

        let listed = store
            .list_created_at_or_before(ArtifactStatus::Completed, t0() - TimeDelta::hours(1))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].artifact_id, old_id);

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total(), 3);
    }

    #[tokio::test]
    async fn delete_expired_rechecks_the_cutoff() {
        let store = InMemoryArtifactStore::new();
        let owner = OwnerId::from_ulid(Ulid::new());
        let cutoff = t0() - TimeDelta::hours(1);
        let old = completed(owner, t0() - TimeDelta::hours(2));
        let extended = completed(owner, t0() - TimeDelta::hours(2));
        let (old_id, extended_id) = (old.artifact_id, extended.artifact_id);
        store.insert(old).await.unwrap();
        store.insert(extended).await.unwrap();
        assert!(store.reset_created_at(extended_id, owner, t0()).await.unwrap());

        let missing = ArtifactId::from_ulid(Ulid::new());
        let deleted = store
            .delete_expired(&[old_id, extended_id, missing], cutoff)
            .await
            .unwrap();

        assert_eq!(deleted, vec![old_id]);
        assert!(store.get_unscoped(extended_id).await.is_some());
        assert!(store.delete_expired(&[old_id], cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blob_delete_reports_missing_blob() {
        let blobs = InMemoryBlobStore::new();
        let id = ArtifactId::from_ulid(Ulid::new());
        blobs.put(id, "https://cdn/x.png").await;

        blobs.delete(id, "https://cdn/x.png").await.unwrap();
        assert!(!blobs.contains(id).await);
        assert!(blobs.delete(id, "https://cdn/x.png").await.is_err());
    }
}
