//! ExpiryInfoSource port - 監視 tick ごとの lifetime 取得

use async_trait::async_trait;

use crate::domain::{ArtifactId, LifecycleError, LifetimeDescriptor, OwnerId};

/// Where the lifecycle monitor reads remaining lifetimes from.
///
/// In-process this is [`crate::app::ExpiryService`]; a client-side monitor
/// would put a remote call behind it.
#[async_trait]
pub trait ExpiryInfoSource: Send + Sync {
    async fn expiry_info(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
    ) -> Result<LifetimeDescriptor, LifecycleError>;
}
