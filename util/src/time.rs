//! General time utility functions

use chrono::{DateTime, Duration, Utc};

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Absolute time between two timestamps in seconds, or `None` if overflow
pub fn abs_diff_seconds(a: &DateTime<Utc>, b: &DateTime<Utc>) -> Option<f64> {
    duration_to_seconds(*a - *b).map(f64::abs)
}
