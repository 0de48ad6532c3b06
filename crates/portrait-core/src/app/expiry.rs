//! ExpiryService - artifact の期限参照・延長・一括削除
//!
//! # フロー（cleanup_expired）
//! 1. status=completed かつ created_at <= now - ttl の record を取得
//! 2. batch_size ごとに delete_expired（削除時にも cutoff を再確認）
//! 3. 実際に削除できた record の blob だけを削除
//! 4. batch 単位の失敗は記録して次の batch に進む

use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::domain::{
    ArtifactId, ArtifactRecord, ArtifactStatus, Caller, LifecycleError, LifetimeDescriptor,
    OwnerId, remaining_lifetime,
};
use crate::ports::{ArtifactStore, BlobStore, Clock, ExpiryInfoSource};

/// An artifact together with its freshly computed lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiringArtifact {
    pub record: ArtifactRecord,
    pub lifetime: LifetimeDescriptor,
}

/// Summary of one cleanup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub cleaned_count: usize,
    pub errors: Vec<String>,
}

pub struct ExpiryService {
    store: Arc<dyn ArtifactStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    batch_size: usize,
    expiring_soon_minutes: i64,
}

impl ExpiryService {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        config: &LifecycleConfig,
    ) -> Self {
        let ttl = config.ttl();
        Self {
            store,
            blobs: None,
            clock,
            ttl,
            batch_size: config.cleanup_batch_size.max(1),
            // remaining time never exceeds the TTL, so a wider window adds nothing
            expiring_soon_minutes: config.expiring_soon_minutes.clamp(0, ttl.num_minutes()),
        }
    }

    /// Also delete image bytes when their record is cleaned up.
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub async fn get_expiry_info(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
    ) -> Result<LifetimeDescriptor, LifecycleError> {
        let record = self
            .store
            .find(artifact_id, owner_id)
            .await?
            .ok_or_else(|| not_found(artifact_id, owner_id))?;
        Ok(remaining_lifetime(
            record.created_at,
            self.clock.now(),
            self.ttl,
        ))
    }

    /// Restart the artifact's expiry window from now.
    pub async fn extend_life(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        if !self.store.reset_created_at(artifact_id, owner_id, now).await? {
            return Err(not_found(artifact_id, owner_id));
        }
        info!(%artifact_id, %owner_id, "artifact lifetime extended");
        Ok(())
    }

    /// Completed artifacts with `0 <= remaining <= expiring_soon_minutes`.
    pub async fn list_expiring_soon(
        &self,
        caller: &Caller,
    ) -> Result<Vec<ExpiringArtifact>, LifecycleError> {
        caller.require_admin("list_expiring_soon")?;

        let now = self.clock.now();
        // Anything created after this instant has more than the window left.
        let cutoff = now - self.ttl + TimeDelta::minutes(self.expiring_soon_minutes + 1);
        let candidates = self
            .store
            .list_created_at_or_before(ArtifactStatus::Completed, cutoff)
            .await?;

        Ok(candidates
            .into_iter()
            .map(|record| {
                let lifetime = remaining_lifetime(record.created_at, now, self.ttl);
                ExpiringArtifact { record, lifetime }
            })
            .filter(|a| {
                a.lifetime.milliseconds_remaining >= 0
                    && a.lifetime.minutes_remaining <= self.expiring_soon_minutes
            })
            .collect())
    }

    /// Delete every completed artifact whose age has reached the TTL.
    ///
    /// Per-batch failures are collected into the report; the sweep carries on
    /// with the next batch. Running it again right away cleans nothing.
    pub async fn cleanup_expired(&self, caller: &Caller) -> Result<CleanupReport, LifecycleError> {
        caller.require_admin("cleanup_expired")?;

        let cutoff = self.clock.now() - self.ttl;
        let expired = self
            .store
            .list_created_at_or_before(ArtifactStatus::Completed, cutoff)
            .await?;

        let mut report = CleanupReport::default();
        if expired.is_empty() {
            debug!("no expired artifacts");
            return Ok(report);
        }

        for (index, batch) in expired.chunks(self.batch_size).enumerate() {
            let ids: Vec<ArtifactId> = batch.iter().map(|r| r.artifact_id).collect();
            match self.store.delete_expired(&ids, cutoff).await {
                Ok(deleted) => {
                    report.cleaned_count += deleted.len();
                    let removed = batch.iter().filter(|r| deleted.contains(&r.artifact_id));
                    self.delete_blobs(removed, &mut report).await;
                }
                Err(e) => {
                    warn!(batch = index, size = ids.len(), error = %e, "cleanup batch failed");
                    report.errors.push(format!("batch {index}: {e}"));
                }
            }
        }

        info!(
            cleaned = report.cleaned_count,
            errors = report.errors.len(),
            "expired artifacts cleaned up"
        );
        Ok(report)
    }

    async fn delete_blobs<'a>(
        &self,
        removed: impl Iterator<Item = &'a ArtifactRecord>,
        report: &mut CleanupReport,
    ) {
        let Some(blobs) = &self.blobs else {
            return;
        };
        for record in removed {
            let Some(locator) = record.result_url.as_deref() else {
                continue;
            };
            if let Err(e) = blobs.delete(record.artifact_id, locator).await {
                warn!(artifact_id = %record.artifact_id, error = %e, "blob delete failed");
                report
                    .errors
                    .push(format!("blob {}: {e}", record.artifact_id));
            }
        }
    }
}

#[async_trait]
impl ExpiryInfoSource for ExpiryService {
    async fn expiry_info(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
    ) -> Result<LifetimeDescriptor, LifecycleError> {
        self.get_expiry_info(artifact_id, owner_id).await
    }
}

fn not_found(artifact_id: ArtifactId, owner_id: OwnerId) -> LifecycleError {
    LifecycleError::NotFound(format!("artifact {artifact_id} for {owner_id}"))
}
