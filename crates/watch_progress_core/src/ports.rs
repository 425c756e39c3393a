//! crates/watch_progress_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the watch-progress core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the database, the catalog and the identity provider.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AnimeOverview, EpisodeAncestry, ProgressReport, ProgressSnapshot, ResolvedProgress,
    WatchProgress,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable storage of `WatchProgress` rows keyed by (user, episode).
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Creates or updates the row for `(user_id, progress.episode_id)` in a single
    /// statement and returns the row as stored.
    ///
    /// Completion is sticky: a stored `true` survives a later `false`.
    async fn upsert_progress(
        &self,
        user_id: Uuid,
        progress: &ResolvedProgress,
    ) -> PortResult<WatchProgress>;

    async fn get_progress(&self, user_id: Uuid, episode_id: i64)
        -> PortResult<Option<WatchProgress>>;

    /// Every progress row of the user, in no particular order.
    async fn list_progress(&self, user_id: Uuid) -> PortResult<Vec<WatchProgress>>;

    /// Deletes every progress row of the user, returning how many were removed.
    async fn clear_progress(&self, user_id: Uuid) -> PortResult<u64>;
}

/// Read-only access to the anime/season/episode catalog.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Ancestry for each known episode id. Unknown ids are silently omitted.
    async fn episode_ancestry(&self, episode_ids: &[i64]) -> PortResult<Vec<EpisodeAncestry>>;

    /// Overview for each known anime id. Unknown ids are silently omitted.
    async fn anime_overviews(&self, anime_ids: &[i64]) -> PortResult<Vec<AnimeOverview>>;
}

/// Resolves a session token to the authenticated user.
#[async_trait]
pub trait IdentityGate: Send + Sync {
    /// Returns `PortError::Unauthorized` for unknown or expired sessions.
    async fn resolve_session(&self, session_id: &str) -> PortResult<Uuid>;
}

/// The viewer-side view of the progress endpoints, used by the playback tracker.
#[async_trait]
pub trait ProgressClient: Send + Sync {
    /// Sends a report and returns the server-resolved completion flag.
    async fn submit_progress(&self, report: &ProgressReport) -> PortResult<bool>;

    async fn fetch_progress(&self, episode_id: i64) -> PortResult<ProgressSnapshot>;
}
