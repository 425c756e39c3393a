//! crates/watch_progress_core/src/service.rs
//!
//! The progress service: ingest, query and the aggregated views, written
//! against the store and catalog ports. Every call takes the authenticated
//! user id explicitly; resolving it is the caller's job.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregation;
use crate::domain::{
    AnimeOverview, ContinueWatchingEntry, EpisodeAncestry, HistoryEntry, ProgressReport,
    ProgressSnapshot, WatchProgress,
};
use crate::error::{CoreError, CoreResult};
use crate::policy;
use crate::ports::{CatalogLookup, PortError, PortResult, ProgressClient, ProgressStore};

#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
    catalog: Arc<dyn CatalogLookup>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn ProgressStore>, catalog: Arc<dyn CatalogLookup>) -> Self {
        Self { store, catalog }
    }

    /// Applies the completion policy to `report` and upserts it.
    ///
    /// Returns the row as stored, whose `is_completed` is the value the client
    /// should reconcile against.
    pub async fn ingest(&self, user_id: Uuid, report: &ProgressReport) -> CoreResult<WatchProgress> {
        let resolved = policy::resolve(report)?;
        if resolved.is_completed && !report.is_completed {
            debug!(
                "Episode {} reached the completion threshold at {}s of {}s",
                resolved.episode_id, resolved.position_seconds, resolved.duration_seconds
            );
        }

        let stored = self.store.upsert_progress(user_id, &resolved).await?;
        debug!(
            "Saved progress for user {} episode {}: {}s (completed: {})",
            user_id, stored.episode_id, stored.position_seconds, stored.is_completed
        );
        Ok(stored)
    }

    /// The last known progress for the pair, or the zero value.
    pub async fn query(&self, user_id: Uuid, episode_id: i64) -> CoreResult<ProgressSnapshot> {
        policy::validate_episode_id(episode_id)?;
        let snapshot = self
            .store
            .get_progress(user_id, episode_id)
            .await?
            .map(|row| row.snapshot())
            .unwrap_or_default();
        Ok(snapshot)
    }

    pub async fn continue_watching(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> CoreResult<Vec<ContinueWatchingEntry>> {
        let progress = self.store.list_progress(user_id).await?;
        if !progress.iter().any(|row| row.is_completed) {
            return Ok(Vec::new());
        }
        let (ancestry, anime) = self.catalog_facts(&progress).await?;
        Ok(aggregation::continue_watching(&progress, &ancestry, &anime, limit))
    }

    pub async fn history(&self, user_id: Uuid, limit: usize) -> CoreResult<Vec<HistoryEntry>> {
        let progress = self.store.list_progress(user_id).await?;
        if progress.is_empty() {
            return Ok(Vec::new());
        }
        let (ancestry, anime) = self.catalog_facts(&progress).await?;
        Ok(aggregation::history(&progress, &ancestry, &anime, limit))
    }

    /// Removes every progress row of the user.
    pub async fn clear_history(&self, user_id: Uuid) -> CoreResult<u64> {
        let deleted = self.store.clear_progress(user_id).await?;
        info!("Cleared {} progress rows for user {}", deleted, user_id);
        Ok(deleted)
    }

    async fn catalog_facts(
        &self,
        progress: &[WatchProgress],
    ) -> PortResult<(Vec<EpisodeAncestry>, Vec<AnimeOverview>)> {
        let episode_ids: Vec<i64> = progress
            .iter()
            .map(|row| row.episode_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let ancestry = self.catalog.episode_ancestry(&episode_ids).await?;

        let anime_ids: Vec<i64> = ancestry
            .iter()
            .map(|a| a.anime_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let anime = self.catalog.anime_overviews(&anime_ids).await?;
        Ok((ancestry, anime))
    }
}

//=========================================================================================
// In-process ProgressClient
//=========================================================================================

/// A `ProgressClient` that calls the service directly for a fixed user.
/// Lets the playback tracker run against the real policy without HTTP.
#[derive(Clone)]
pub struct ServiceClient {
    service: ProgressService,
    user_id: Uuid,
}

impl ServiceClient {
    pub fn new(service: ProgressService, user_id: Uuid) -> Self {
        Self { service, user_id }
    }
}

#[async_trait]
impl ProgressClient for ServiceClient {
    async fn submit_progress(&self, report: &ProgressReport) -> PortResult<bool> {
        match self.service.ingest(self.user_id, report).await {
            Ok(stored) => Ok(stored.is_completed),
            Err(CoreError::Port(e)) => Err(e),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }

    async fn fetch_progress(&self, episode_id: i64) -> PortResult<ProgressSnapshot> {
        match self.service.query(self.user_id, episode_id).await {
            Ok(snapshot) => Ok(snapshot),
            Err(CoreError::Port(e)) => Err(e),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }
}
