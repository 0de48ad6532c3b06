//! Artifact record: a generated image and its lifecycle.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::errors::LifecycleError;
use super::ids::{ArtifactId, OwnerId};
use super::remote::ModelId;

/// Generation status of an artifact.
///
/// State transitions:
/// - Pending -> InProgress -> Completed
/// - Pending -> InProgress -> Failed
/// - Pending -> Failed (the generation request itself was rejected)
///
/// Only `Completed` artifacts are subject to time-based expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ArtifactStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ArtifactStatus::Completed | ArtifactStatus::Failed)
    }
}

/// Persistent record of one generated image.
///
/// `created_at` is the sole basis for expiry. It is written once at creation
/// and only ever moved forward by [`ArtifactRecord::extend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact_id: ArtifactId,
    pub owner_id: OwnerId,
    pub model_id: Option<ModelId>,
    pub status: ArtifactStatus,

    /// Where the finished image can be fetched from.
    pub result_url: Option<String>,

    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn new(
        artifact_id: ArtifactId,
        owner_id: OwnerId,
        model_id: Option<ModelId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            artifact_id,
            owner_id,
            model_id,
            status: ArtifactStatus::Pending,
            result_url: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending -> InProgress.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if self.status != ArtifactStatus::Pending {
            return Err(self.invalid("in_progress"));
        }
        self.status = ArtifactStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }

    /// InProgress -> Completed. The locator must be non-empty.
    pub fn complete(
        &mut self,
        result_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let result_url = result_url.into();
        if self.status != ArtifactStatus::InProgress || result_url.trim().is_empty() {
            return Err(self.invalid("completed"));
        }
        self.status = ArtifactStatus::Completed;
        self.result_url = Some(result_url);
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.status.is_terminal() {
            return Err(self.invalid("failed"));
        }
        self.status = ArtifactStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    /// Restart the expiry window.
    pub fn extend(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }

    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.created_at
    }

    /// A completed artifact is expired once its age reaches the TTL.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.status == ArtifactStatus::Completed && self.age(now) >= ttl
    }

    fn invalid(&self, to: &'static str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            artifact_id: self.artifact_id,
            from: self.status,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn record() -> (ArtifactRecord, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let record = ArtifactRecord::new(
            ArtifactId::from_ulid(Ulid::new()),
            OwnerId::from_ulid(Ulid::new()),
            None,
            now,
        );
        (record, now)
    }

    #[test]
    fn new_record_is_pending() {
        let (record, now) = record();
        assert_eq!(record.status, ArtifactStatus::Pending);
        assert_eq!(record.created_at, now);
        assert!(record.result_url.is_none());
    }

    #[test]
    fn happy_path_reaches_completed() {
        let (mut record, now) = record();
        record.start(now).unwrap();
        record.complete("https://cdn/img.png", now).unwrap();

        assert_eq!(record.status, ArtifactStatus::Completed);
        assert_eq!(record.result_url.as_deref(), Some("https://cdn/img.png"));
    }

    #[test]
    fn complete_requires_in_progress_and_locator() {
        let (mut record, now) = record();
        assert!(matches!(
            record.complete("https://cdn/img.png", now),
            Err(LifecycleError::InvalidTransition { from: ArtifactStatus::Pending, .. })
        ));

        record.start(now).unwrap();
        assert!(record.complete("  ", now).is_err());
        assert_eq!(record.status, ArtifactStatus::InProgress);
    }

    #[test]
    fn failed_is_terminal() {
        let (mut record, now) = record();
        record.fail("rejected", now).unwrap();
        assert!(record.fail("again", now).is_err());
        assert!(record.start(now).is_err());
        assert_eq!(record.failure_reason.as_deref(), Some("rejected"));
    }

    #[test]
    fn only_completed_records_expire() {
        let (mut record, now) = record();
        let ttl = TimeDelta::hours(1);
        let later = now + TimeDelta::hours(2);
        assert!(!record.is_expired(later, ttl));

        record.start(now).unwrap();
        record.complete("https://cdn/img.png", now).unwrap();
        assert!(record.is_expired(later, ttl));
        assert!(record.is_expired(now + ttl, ttl));
        assert!(!record.is_expired(now + ttl - TimeDelta::milliseconds(1), ttl));
    }

    #[test]
    fn extend_restarts_the_window() {
        let (mut record, now) = record();
        record.start(now).unwrap();
        record.complete("https://cdn/img.png", now).unwrap();

        let later = now + TimeDelta::minutes(58);
        record.extend(later);

        assert_eq!(record.created_at, later);
        assert_eq!(record.age(later), TimeDelta::zero());
    }
}
