//! Poll policy: how often and how many times a remote job is checked.

use std::time::Duration;

/// Bounded polling parameters.
///
/// Unlike a backoff policy the interval is fixed: every attempt waits the
/// same amount of time before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of status checks (including the first).
    pub max_attempts: u32,

    /// Wait between two consecutive checks.
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Model training: 60 checks, 5s apart.
    pub fn training() -> Self {
        Self::new(60, Duration::from_secs(5))
    }

    /// Image generation takes longer per step: 60 checks, 10s apart.
    pub fn images() -> Self {
        Self::new(60, Duration::from_secs(10))
    }

    /// Upper bound on wall time spent waiting (excluding the checks themselves).
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policies_match_reference_values() {
        assert_eq!(PollPolicy::training().max_attempts, 60);
        assert_eq!(PollPolicy::training().interval, Duration::from_secs(5));
        assert_eq!(PollPolicy::images().interval, Duration::from_secs(10));
    }

    #[test]
    fn max_wait_skips_the_trailing_interval() {
        let policy = PollPolicy::new(3, Duration::from_secs(2));
        assert_eq!(policy.max_wait(), Duration::from_secs(4));
        assert_eq!(PollPolicy::new(0, Duration::from_secs(2)).max_wait(), Duration::ZERO);
    }
}
