//! Errors - エラー型と分類
//!
//! Every fallible operation in the crate returns [`LifecycleError`]. The poll
//! loops consult [`LifecycleError::kind`] to decide whether an attempt may be
//! retried.

use thiserror::Error;

use super::artifact::ArtifactStatus;
use super::ids::ArtifactId;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（store / blob の障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Artifact or job is missing, or does not belong to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("invalid transition for {artifact_id}: {from:?} -> {to}")]
    InvalidTransition {
        artifact_id: ArtifactId,
        from: ArtifactStatus,
        to: &'static str,
    },

    /// A single status check failed (network blip, unparsable body, ...).
    #[error("poll attempt failed: {0}")]
    TransientPoll(String),

    /// The remote job explicitly reported failure.
    #[error("remote job failed: {0}")]
    TerminalFailure(String),

    #[error("timed out after {attempts} attempts{}", last_error_suffix(.last_error))]
    Timeout {
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("store error: {0}")]
    Store(String),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::TransientPoll(_) => ErrorKind::Transient,
            LifecycleError::Store(_) => ErrorKind::Infrastructure,
            LifecycleError::NotFound(_)
            | LifecycleError::Forbidden(_)
            | LifecycleError::InvalidTimestamp { .. }
            | LifecycleError::InvalidTransition { .. }
            | LifecycleError::TerminalFailure(_)
            | LifecycleError::Timeout { .. }
            | LifecycleError::Cancelled { .. } => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
