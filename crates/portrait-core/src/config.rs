//! Configuration for the lifecycle services.
//!
//! Defaults carry the reference values (1h TTL, 30s monitor ticks, batches of
//! 10, 60 × 5s training checks, 60 × 10s image checks). A JSON document or
//! `PORTRAIT_*` environment variables can override any of them.

use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::domain::PollPolicy;
use crate::domain::lifetime::DEFAULT_TTL_SECS;

/// Longest accepted TTL (100 years).
pub const MAX_TTL_SECS: u64 = 100 * 365 * 86_400;

/// Longest accepted timer period for ticks, sweeps and poll waits (7 days).
pub const MAX_INTERVAL_SECS: u64 = 7 * 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl PollSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.max_attempts, Duration::from_millis(self.interval_ms))
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub ttl_secs: u64,
    pub monitor_interval_secs: u64,
    pub cleanup_batch_size: usize,
    pub cleanup_interval_secs: u64,
    /// Upper bound (inclusive) for "expiring soon".
    pub expiring_soon_minutes: i64,
    pub training_poll: PollSettings,
    pub image_poll: PollSettings,
    /// Completed images needed before image polling stops early.
    pub min_completed_images: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS as u64,
            monitor_interval_secs: 30,
            cleanup_batch_size: 10,
            cleanup_interval_secs: 300,
            expiring_soon_minutes: 10,
            training_poll: PollSettings::default(),
            image_poll: PollSettings {
                max_attempts: 60,
                interval_ms: 10_000,
            },
            min_completed_images: 3,
        }
    }
}

impl LifecycleConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `PORTRAIT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`] but reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        override_with(&lookup, "PORTRAIT_TTL_SECS", &mut config.ttl_secs)?;
        override_with(
            &lookup,
            "PORTRAIT_MONITOR_INTERVAL_SECS",
            &mut config.monitor_interval_secs,
        )?;
        override_with(
            &lookup,
            "PORTRAIT_CLEANUP_BATCH_SIZE",
            &mut config.cleanup_batch_size,
        )?;
        override_with(
            &lookup,
            "PORTRAIT_CLEANUP_INTERVAL_SECS",
            &mut config.cleanup_interval_secs,
        )?;
        override_with(
            &lookup,
            "PORTRAIT_EXPIRING_SOON_MINUTES",
            &mut config.expiring_soon_minutes,
        )?;
        override_with(
            &lookup,
            "PORTRAIT_TRAINING_MAX_ATTEMPTS",
            &mut config.training_poll.max_attempts,
        )?;
        override_with(
            &lookup,
            "PORTRAIT_TRAINING_INTERVAL_MS",
            &mut config.training_poll.interval_ms,
        )?;
        override_with(
            &lookup,
            "PORTRAIT_IMAGE_MAX_ATTEMPTS",
            &mut config.image_poll.max_attempts,
        )?;
        override_with(
            &lookup,
            "PORTRAIT_IMAGE_INTERVAL_MS",
            &mut config.image_poll.interval_ms,
        )?;
        override_with(
            &lookup,
            "PORTRAIT_MIN_COMPLETED_IMAGES",
            &mut config.min_completed_images,
        )?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, u64); 8] = [
            ("ttl_secs", self.ttl_secs),
            ("monitor_interval_secs", self.monitor_interval_secs),
            ("cleanup_batch_size", self.cleanup_batch_size as u64),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("training_poll.max_attempts", self.training_poll.max_attempts as u64),
            ("training_poll.interval_ms", self.training_poll.interval_ms),
            ("image_poll.max_attempts", self.image_poll.max_attempts as u64),
            ("image_poll.interval_ms", self.image_poll.interval_ms),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        let limits: [(&str, u64, u64); 5] = [
            ("ttl_secs", self.ttl_secs, MAX_TTL_SECS),
            ("monitor_interval_secs", self.monitor_interval_secs, MAX_INTERVAL_SECS),
            ("cleanup_interval_secs", self.cleanup_interval_secs, MAX_INTERVAL_SECS),
            (
                "training_poll.interval_ms",
                self.training_poll.interval_ms,
                MAX_INTERVAL_SECS * 1_000,
            ),
            (
                "image_poll.interval_ms",
                self.image_poll.interval_ms,
                MAX_INTERVAL_SECS * 1_000,
            ),
        ];
        for (key, value, max) in limits {
            if value > max {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: format!("must be at most {max}"),
                });
            }
        }
        if !(0..=(MAX_TTL_SECS / 60) as i64).contains(&self.expiring_soon_minutes) {
            return Err(ConfigError::Invalid {
                key: "expiring_soon_minutes".to_string(),
                value: self.expiring_soon_minutes.to_string(),
                reason: format!("must be between 0 and {}", MAX_TTL_SECS / 60),
            });
        }
        Ok(())
    }

    /// Saturates at [`MAX_TTL_SECS`] for configs that skipped validation.
    pub fn ttl(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.ttl_secs.min(MAX_TTL_SECS) as i64).unwrap_or(TimeDelta::MAX)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn override_with<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_reference_values() {
        let config = LifecycleConfig::default();
        assert_eq!(config.ttl(), TimeDelta::hours(1));
        assert_eq!(config.monitor_interval(), Duration::from_secs(30));
        assert_eq!(config.cleanup_batch_size, 10);
        assert_eq!(config.training_poll.policy(), PollPolicy::training());
        assert_eq!(config.image_poll.policy(), PollPolicy::images());
        assert_eq!(config.min_completed_images, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = LifecycleConfig::from_lookup(lookup(&[
            ("PORTRAIT_TTL_SECS", "120"),
            ("PORTRAIT_IMAGE_INTERVAL_MS", " 250 "),
        ]))
        .unwrap();

        assert_eq!(config.ttl_secs, 120);
        assert_eq!(config.image_poll.interval_ms, 250);
        assert_eq!(config.monitor_interval_secs, 30);
    }

    #[test]
    fn malformed_env_value_is_reported() {
        let err =
            LifecycleConfig::from_lookup(lookup(&[("PORTRAIT_CLEANUP_BATCH_SIZE", "ten")]))
                .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "PORTRAIT_CLEANUP_BATCH_SIZE")
        );
    }

    #[rstest]
    #[case::ttl(r#"{ "ttl_secs": 0 }"#)]
    #[case::batch(r#"{ "cleanup_batch_size": 0 }"#)]
    #[case::attempts(r#"{ "image_poll": { "max_attempts": 0 } }"#)]
    #[case::window(r#"{ "expiring_soon_minutes": -1 }"#)]
    fn zero_or_negative_settings_are_rejected(#[case] json: &str) {
        assert!(matches!(
            LifecycleConfig::from_json(json),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[rstest]
    #[case::ttl(r#"{ "ttl_secs": 18446744073709551615 }"#)]
    #[case::ttl_just_over(r#"{ "ttl_secs": 3153600001 }"#)]
    #[case::window(r#"{ "expiring_soon_minutes": 9223372036854775807 }"#)]
    #[case::monitor(r#"{ "monitor_interval_secs": 18446744073709551615 }"#)]
    #[case::poll_wait(r#"{ "image_poll": { "interval_ms": 604800001 } }"#)]
    fn out_of_range_settings_are_rejected(#[case] json: &str) {
        assert!(matches!(
            LifecycleConfig::from_json(json),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn huge_env_ttl_is_rejected_not_panicking() {
        let err = LifecycleConfig::from_lookup(lookup(&[(
            "PORTRAIT_TTL_SECS",
            "10000000000000000",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "ttl_secs"));
    }

    #[test]
    fn ttl_saturates_without_validation() {
        let config = LifecycleConfig {
            ttl_secs: u64::MAX,
            ..LifecycleConfig::default()
        };
        assert_eq!(config.ttl(), TimeDelta::seconds(MAX_TTL_SECS as i64));
    }

    #[test]
    fn longest_accepted_ttl_is_valid() {
        let config = LifecycleConfig::from_json(r#"{ "ttl_secs": 3153600000 }"#).unwrap();
        assert_eq!(config.ttl_secs, MAX_TTL_SECS);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = LifecycleConfig::from_json(
            r#"{ "monitor_interval_secs": 5, "training_poll": { "interval_ms": 100 } }"#,
        )
        .unwrap();

        assert_eq!(config.monitor_interval_secs, 5);
        assert_eq!(config.training_poll.interval_ms, 100);
        assert_eq!(config.training_poll.max_attempts, 60);
        assert_eq!(config.ttl_secs, 3600);
    }
}
