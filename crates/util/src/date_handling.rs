//! # Date Handling Utilities
//!
//! Formatting helpers for timestamps and durations shown in the run console.

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};

/// Formats a log timestamp as a 24-hour local wall-clock time with milliseconds.
///
/// # Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use testbench_util::date_handling::format_log_time_in;
///
/// let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 3, 7).unwrap() + chrono::Duration::milliseconds(42);
/// assert_eq!(format_log_time_in(&at, &Utc), "09:03:07.042");
/// ```
pub fn format_log_time(timestamp: &DateTime<Utc>) -> String {
    format_log_time_in(timestamp, &Local)
}

/// Same as [`format_log_time`] but in an explicit time zone.
pub fn format_log_time_in<Tz: TimeZone>(timestamp: &DateTime<Utc>, zone: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.with_timezone(zone).format("%H:%M:%S%.3f").to_string()
}

/// Formats an elapsed duration as seconds with two decimals (`12.34s`).
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}
