//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time, never earlier than `floor`
///
/// Keeps `updatedAt >= createdAt` even if the wall clock steps backwards.
pub fn now_at_least(floor: DateTime<Utc>) -> DateTime<Utc> {
    now().max(floor)
}

/// RFC 3339 rendering with millisecond precision and `Z` suffix
pub fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Human-facing date and time, e.g. `2026-10-19 14:05 UTC`
pub fn display(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}
