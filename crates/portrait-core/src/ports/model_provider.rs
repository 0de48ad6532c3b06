//! ModelProvider port - 外部の学習 / 画像生成 API
//!
//! Request and response shapes belong to the provider; adapters translate
//! them into the normalized domain types.

use async_trait::async_trait;

use crate::domain::{ArtifactId, ImageSnapshot, LifecycleError, ModelId, RemoteJobId, TrainingStatus};

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// One training status check. Network or decode problems should surface
    /// as `LifecycleError::TransientPoll` so the poll loop retries them.
    async fn training_status(&self, job: &RemoteJobId) -> Result<TrainingStatus, LifecycleError>;

    /// Ask the provider to render one image per artifact id. The provider
    /// reports each image back under the id it was given.
    async fn request_images(
        &self,
        model: &ModelId,
        artifacts: &[ArtifactId],
    ) -> Result<(), LifecycleError>;

    /// Current state of every image generated with `model`.
    async fn image_statuses(&self, model: &ModelId) -> Result<Vec<ImageSnapshot>, LifecycleError>;
}
