use serde::{Deserialize, Serialize};

use crate::domain::ArtifactStatus;

/// Artifact counts by status, for status pages and the CLI summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ArtifactCounts {
    pub fn record(&mut self, status: ArtifactStatus) {
        match status {
            ArtifactStatus::Pending => self.pending += 1,
            ArtifactStatus::InProgress => self.in_progress += 1,
            ArtifactStatus::Completed => self.completed += 1,
            ArtifactStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }
}
