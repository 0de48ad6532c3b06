//! Remote jobs tracked by polling (model training, image generation).
//!
//! The provider reports free-form status strings. They are normalized here
//! into the small closed sets the poll loops reason about.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::ArtifactId;

/// Training job identifier issued by the model provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteJobId(String);

impl RemoteJobId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a trained (or training) model at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Normalized model-training status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Trained,
    Training,
    Failed,
}

impl TrainingStatus {
    /// Anything the provider reports that is neither success nor failure is
    /// treated as still training.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trained" | "succeeded" | "success" | "completed" | "finished" => {
                TrainingStatus::Trained
            }
            "failed" | "error" | "canceled" | "cancelled" => TrainingStatus::Failed,
            _ => TrainingStatus::Training,
        }
    }
}

/// Normalized per-image generation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Completed,
    Generating,
    Failed,
}

impl ImageStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "succeeded" | "success" | "done" => ImageStatus::Completed,
            "failed" | "error" | "canceled" | "cancelled" => ImageStatus::Failed,
            _ => ImageStatus::Generating,
        }
    }
}

/// One image as reported by the provider's listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSnapshot {
    pub artifact_id: ArtifactId,
    pub status: ImageStatus,
    pub result_url: Option<String>,
}

impl ImageSnapshot {
    /// Completed *and* carrying a usable locator. A "completed" image without
    /// a URL is still counted as generating.
    pub fn completed_url(&self) -> Option<&str> {
        match (self.status, self.result_url.as_deref()) {
            (ImageStatus::Completed, Some(url)) if !url.trim().is_empty() => Some(url),
            _ => None,
        }
    }
}

/// A finished image handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub artifact_id: ArtifactId,
    pub url: String,
}

/// Result of an image-generation poll.
///
/// `partial` is set when the loop ran out of attempts before reaching the
/// success threshold and returned whatever had completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub images: Vec<GeneratedImage>,
    pub failed: Vec<ArtifactId>,
    pub partial: bool,
    pub attempts: u32,
}
