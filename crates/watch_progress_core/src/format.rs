//! crates/watch_progress_core/src/format.rs
//!
//! Human-readable labels for timestamps shown next to history rows.

use chrono::{DateTime, Utc};

/// Formats `then` relative to `now`: "just now", "5 minutes ago", "1 day ago",
/// falling back to a calendar date after a week.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);

    // Timestamps slightly in the future (clock skew) read as "just now".
    if elapsed.num_minutes() < 1 {
        return "just now".to_string();
    }
    if elapsed.num_hours() < 1 {
        return plural(elapsed.num_minutes(), "minute");
    }
    if elapsed.num_days() < 1 {
        return plural(elapsed.num_hours(), "hour");
    }
    if elapsed.num_days() < 7 {
        return plural(elapsed.num_days(), "day");
    }
    then.format("%Y-%m-%d").to_string()
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}
