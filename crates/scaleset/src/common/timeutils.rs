use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Returns `start + duration`, saturating at the latest representable timestamp.
pub fn add_duration(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Returns `start - duration`, saturating at the earliest representable timestamp.
pub fn sub_duration(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| start.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}
