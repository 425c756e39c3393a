//! crates/watch_progress_core/src/policy.rs
//!
//! The completion policy: a report at or past 90% of its duration is complete,
//! whatever the client claims.

use crate::domain::{ProgressReport, ResolvedProgress};
use crate::error::{CoreError, CoreResult};

/// Completion fires at `COMPLETION_NUMERATOR / COMPLETION_DENOMINATOR` of the duration.
pub const COMPLETION_NUMERATOR: i64 = 9;
pub const COMPLETION_DENOMINATOR: i64 = 10;

/// Returns true when `position_seconds` reaches the completion threshold.
/// Always false for an unknown (`<= 0`) duration.
pub fn is_past_threshold(position_seconds: i64, duration_seconds: i64) -> bool {
    if duration_seconds <= 0 {
        return false;
    }
    // Integer form of `position >= 0.9 * duration`.
    position_seconds.saturating_mul(COMPLETION_DENOMINATOR)
        >= duration_seconds.saturating_mul(COMPLETION_NUMERATOR)
}

pub fn validate_episode_id(episode_id: i64) -> CoreResult<()> {
    if episode_id <= 0 {
        return Err(CoreError::Validation(format!(
            "episode_id must be a positive integer, got {}",
            episode_id
        )));
    }
    Ok(())
}

/// Validates a report and applies clamping and the completion threshold.
pub fn resolve(report: &ProgressReport) -> CoreResult<ResolvedProgress> {
    validate_episode_id(report.episode_id)?;

    let mut position = report.position_seconds.max(0);
    let duration = report.duration_seconds;
    let mut is_completed = report.is_completed;

    if duration > 0 {
        position = position.min(duration);
        if is_past_threshold(position, duration) {
            is_completed = true;
        }
    }

    Ok(ResolvedProgress {
        episode_id: report.episode_id,
        position_seconds: position,
        duration_seconds: duration,
        is_completed,
    })
}
