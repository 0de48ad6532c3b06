//! State - モニターとポーリングの状態

use serde::Serialize;

/// Per-artifact state inside a [`crate::app::LifecycleMonitor`].
///
/// - NotMonitored: never started in this monitor
/// - Monitoring: a ticking timer is registered
/// - Stopped: cancelled explicitly or stopped itself on expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    NotMonitored,
    Monitoring,
    Stopped,
}

/// State of one bounded poll loop.
///
/// Pending -> Polling -> {Succeeded | Failed | TimedOut}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Pending,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Succeeded | PollState::Failed | PollState::TimedOut
        )
    }
}
