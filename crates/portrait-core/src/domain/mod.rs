//! Domain model (IDs, artifacts, remote jobs, lifetimes, errors).

pub mod artifact;
pub mod caller;
pub mod errors;
pub mod ids;
pub mod lifetime;
pub mod poll_policy;
pub mod remote;
pub mod state;

pub use artifact::{ArtifactRecord, ArtifactStatus};
pub use caller::{Caller, Role};
pub use errors::{ErrorKind, LifecycleError};
pub use ids::{ArtifactId, OwnerId};
pub use lifetime::{
    LifetimeDescriptor, StatusTier, needs_urgency_indicator, remaining_lifetime,
    remaining_lifetime_from_str,
};
pub use poll_policy::PollPolicy;
pub use remote::{
    GeneratedImage, GenerationOutcome, ImageSnapshot, ImageStatus, ModelId, RemoteJobId,
    TrainingStatus,
};
pub use state::{MonitorState, PollState};
