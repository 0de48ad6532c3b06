//! Remaining-lifetime calculation for generated images.
//!
//! Pure functions of `(created_at, now, ttl)`. Nothing here is persisted; the
//! descriptor is recomputed on every query.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;

use super::errors::LifecycleError;

/// Default time-to-live of a completed image.
pub const DEFAULT_TTL_SECS: i64 = 3600;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60_000;

/// Derived view of how long an artifact has left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifetimeDescriptor {
    pub expires_at: DateTime<Utc>,
    pub milliseconds_remaining: i64,
    /// Floored, never negative.
    pub minutes_remaining: i64,
    pub expired: bool,
    pub label: String,
}

impl LifetimeDescriptor {
    pub fn tier(&self) -> StatusTier {
        StatusTier::from_minutes(self.minutes_remaining)
    }

    pub fn needs_urgency_indicator(&self) -> bool {
        needs_urgency_indicator(self.minutes_remaining)
    }
}

/// Colour tier consumers use to render the remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTier {
    Urgent,
    Warning,
    Caution,
    Safe,
}

impl StatusTier {
    pub fn from_minutes(minutes_remaining: i64) -> Self {
        match minutes_remaining {
            m if m <= 0 => StatusTier::Urgent,
            m if m <= 10 => StatusTier::Warning,
            m if m <= 30 => StatusTier::Caution,
            _ => StatusTier::Safe,
        }
    }
}

/// True iff `0 < minutes_remaining <= 10`.
pub fn needs_urgency_indicator(minutes_remaining: i64) -> bool {
    minutes_remaining > 0 && minutes_remaining <= 10
}

pub fn remaining_lifetime(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    ttl: TimeDelta,
) -> LifetimeDescriptor {
    let expires_at = created_at + ttl;
    let milliseconds_remaining = (expires_at - now).num_milliseconds();
    let minutes_remaining = milliseconds_remaining.div_euclid(MS_PER_MINUTE).max(0);
    let expired = milliseconds_remaining <= 0;

    LifetimeDescriptor {
        expires_at,
        milliseconds_remaining,
        minutes_remaining,
        expired,
        label: format_label(milliseconds_remaining, minutes_remaining, expired),
    }
}

/// Same as [`remaining_lifetime`], taking the creation time as an ISO-8601
/// string. Timestamps without an offset are read as UTC.
pub fn remaining_lifetime_from_str(
    created_at: &str,
    now: DateTime<Utc>,
    ttl: TimeDelta,
) -> Result<LifetimeDescriptor, LifecycleError> {
    let created_at = parse_timestamp(created_at)?;
    Ok(remaining_lifetime(created_at, now, ttl))
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, LifecycleError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| LifecycleError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn format_label(milliseconds_remaining: i64, minutes_remaining: i64, expired: bool) -> String {
    if expired {
        return "Expired".to_string();
    }
    if minutes_remaining < 1 {
        let seconds = milliseconds_remaining.div_euclid(MS_PER_SECOND).max(0);
        return format!("{seconds}s left");
    }
    if minutes_remaining < 60 {
        return format!("{minutes_remaining}m left");
    }
    let hours = minutes_remaining / 60;
    let minutes = minutes_remaining % 60;
    format!("{hours}h {minutes}m left")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
    }

    fn ttl() -> TimeDelta {
        TimeDelta::seconds(DEFAULT_TTL_SECS)
    }

    fn created_secs_ago(secs: i64) -> DateTime<Utc> {
        now() - TimeDelta::seconds(secs)
    }

    #[test]
    fn past_ttl_is_expired() {
        let d = remaining_lifetime(created_secs_ago(3661), now(), ttl());
        assert!(d.expired);
        assert_eq!(d.minutes_remaining, 0);
        assert_eq!(d.milliseconds_remaining, -61_000);
        assert_eq!(d.label, "Expired");
        assert_eq!(d.tier(), StatusTier::Urgent);
    }

    #[test]
    fn exactly_at_ttl_is_expired() {
        let d = remaining_lifetime(created_secs_ago(3600), now(), ttl());
        assert_eq!(d.milliseconds_remaining, 0);
        assert!(d.expired);
    }

    #[test]
    fn ten_minutes_left_needs_urgency() {
        let d = remaining_lifetime(created_secs_ago(3000), now(), ttl());
        assert!(!d.expired);
        assert_eq!(d.minutes_remaining, 10);
        assert_eq!(d.label, "10m left");
        assert!(d.needs_urgency_indicator());
        assert_eq!(d.tier(), StatusTier::Warning);
    }

    #[test]
    fn under_a_minute_shows_seconds() {
        let d = remaining_lifetime(created_secs_ago(3550), now(), ttl());
        assert_eq!(d.minutes_remaining, 0);
        assert_eq!(d.label, "50s left");
        assert!(!d.needs_urgency_indicator());
    }

    #[test]
    fn fresh_image_has_almost_the_full_hour() {
        let d = remaining_lifetime(created_secs_ago(10), now(), ttl());
        assert_eq!(d.minutes_remaining, 59);
        assert_eq!(d.label, "59m left");
        assert_eq!(d.tier(), StatusTier::Safe);
        assert_eq!(d.expires_at, created_secs_ago(10) + ttl());
    }

    #[test]
    fn sixty_minutes_is_rendered_in_hours() {
        let d = remaining_lifetime(now(), now(), ttl());
        assert_eq!(d.minutes_remaining, 60);
        assert_eq!(d.label, "1h 0m left");
    }

    #[test]
    fn future_creation_time_is_accepted() {
        let created = now() + TimeDelta::minutes(75);
        let d = remaining_lifetime(created, now(), ttl());
        assert_eq!(d.minutes_remaining, 135);
        assert_eq!(d.label, "2h 15m left");
    }

    #[rstest]
    #[case(-5, false)]
    #[case(0, false)]
    #[case(1, true)]
    #[case(10, true)]
    #[case(11, false)]
    fn urgency_indicator_window(#[case] minutes: i64, #[case] expected: bool) {
        assert_eq!(needs_urgency_indicator(minutes), expected);
    }

    #[rstest]
    #[case(0, StatusTier::Urgent)]
    #[case(1, StatusTier::Warning)]
    #[case(10, StatusTier::Warning)]
    #[case(11, StatusTier::Caution)]
    #[case(30, StatusTier::Caution)]
    #[case(31, StatusTier::Safe)]
    fn status_tier_thresholds(#[case] minutes: i64, #[case] expected: StatusTier) {
        assert_eq!(StatusTier::from_minutes(minutes), expected);
    }

    #[test]
    fn minutes_never_increase_as_time_passes() {
        let created = created_secs_ago(0);
        let mut previous = i64::MAX;
        for step in 0..=130 {
            let at = now() + TimeDelta::seconds(step * 30);
            let d = remaining_lifetime(created, at, ttl());
            assert!(d.minutes_remaining <= previous);
            assert_eq!(d.expired, at - created >= ttl());
            previous = d.minutes_remaining;
        }
    }

    #[rstest]
    #[case("2024-06-01T09:00:00Z")]
    #[case("2024-06-01T09:00:00.000+00:00")]
    #[case("2024-06-01T11:00:00+02:00")]
    #[case("2024-06-01T09:00:00")]
    #[case("2024-06-01 09:00:00.123456")]
    fn iso_timestamps_parse(#[case] raw: &str) {
        let d = remaining_lifetime_from_str(raw, now(), ttl()).unwrap();
        assert_eq!(d.minutes_remaining, 30);
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        let err = remaining_lifetime_from_str("yesterday", now(), ttl()).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTimestamp { .. }));
    }
}
