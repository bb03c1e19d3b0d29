//! Wall-clock boundary math for the aligned pollers.
//!
//! Periods are aligned to the Unix epoch, so a one-minute period fires on
//! every `:00` second and a five-minute period on `:00`, `:05`, `:10`, ...
//! Everything here takes `now` as an argument and never reads the clock.

use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

pub const MINUTE: Duration = Duration::from_secs(60);
pub const FIVE_MINUTES: Duration = Duration::from_secs(300);
pub const HOUR: Duration = Duration::from_secs(3600);

/// Time from `now` until the next boundary of `period`.
///
/// Exactly on a boundary, the next one is a whole period away.
#[must_use]
pub fn until_next_boundary(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = i64::try_from(period.as_millis()).unwrap_or(i64::MAX).max(1);
    let into_period = now.timestamp_millis().rem_euclid(period_ms);
    let remaining = period_ms - into_period;
    Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
}

/// The boundary instant [`until_next_boundary`] points at.
#[must_use]
pub fn next_boundary(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let wait = until_next_boundary(now, period);
    now + TimeDelta::from_std(wait).unwrap_or(TimeDelta::zero())
}

/// Top of the UTC hour containing `ts`.
#[must_use]
pub fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}
