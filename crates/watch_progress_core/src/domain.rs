//! crates/watch_progress_core/src/domain.rs
//!
//! Defines the pure, core data structures for watch-progress tracking.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Saved positions at or below this many seconds never trigger a resume prompt.
pub const RESUME_FLOOR_SECONDS: i64 = 30;

/// The persisted progress of one user on one episode.
///
/// Exactly one of these exists per `(user_id, episode_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchProgress {
    pub user_id: Uuid,
    pub episode_id: i64,
    pub position_seconds: i64,
    /// Advisory duration as reported by the client at write time.
    pub duration_seconds: i64,
    pub is_completed: bool,
    /// Server-assigned on every write.
    pub last_updated_at: DateTime<Utc>,
}

impl WatchProgress {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            position_seconds: self.position_seconds,
            is_completed: self.is_completed,
            last_updated_at: Some(self.last_updated_at),
        }
    }
}

/// A single client-submitted snapshot of playback position for one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub episode_id: i64,
    pub position_seconds: i64,
    pub duration_seconds: i64,
    pub is_completed: bool,
}

/// A report after the completion policy has been applied. This is what gets
/// written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedProgress {
    pub episode_id: i64,
    pub position_seconds: i64,
    pub duration_seconds: i64,
    pub is_completed: bool,
}

/// The last known progress for a (user, episode) pair, or the zero value when
/// nothing has been recorded yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub position_seconds: i64,
    pub is_completed: bool,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    /// Whether the viewer should be asked to resume from the saved position.
    pub fn should_offer_resume(&self) -> bool {
        self.exceeds_floor(RESUME_FLOOR_SECONDS)
    }

    pub fn exceeds_floor(&self, floor_seconds: i64) -> bool {
        self.position_seconds > floor_seconds
    }
}

/// Where an episode sits in the catalog hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeAncestry {
    pub episode_id: i64,
    pub episode_number: i32,
    pub season_id: i64,
    pub anime_id: i64,
    /// Catalog duration, if the catalog knows it.
    pub duration_seconds: Option<i64>,
}

/// Display facts about an anime, as supplied by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeOverview {
    pub anime_id: i64,
    pub title: String,
    pub cover: String,
    /// Number of episodes across all seasons of the anime.
    pub total_episodes: i64,
}

/// One row of the "continue watching" view.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinueWatchingEntry {
    pub anime_id: i64,
    pub anime_title: String,
    pub anime_cover: String,
    pub total_episodes: i64,
    pub watched_episodes: i64,
    /// `watched / total * 100`, rounded to one decimal.
    pub completion_percentage: f64,
    pub last_watched: DateTime<Utc>,
}

/// One row of a user's watch history, joined against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub episode_id: i64,
    pub episode_number: i32,
    pub season_id: i64,
    pub anime_id: i64,
    pub anime_title: String,
    pub position_seconds: i64,
    pub duration_seconds: i64,
    pub is_completed: bool,
    pub watched_at: DateTime<Utc>,
}
