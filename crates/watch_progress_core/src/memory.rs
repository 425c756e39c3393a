//! crates/watch_progress_core/src/memory.rs
//!
//! In-process implementations of the ports. They back the test suites of both
//! crates and mirror the semantics of the Postgres adapter: single-step upsert,
//! sticky completion, server-assigned timestamps.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{AnimeOverview, EpisodeAncestry, ResolvedProgress, WatchProgress};
use crate::ports::{CatalogLookup, IdentityGate, PortError, PortResult, ProgressStore};

//=========================================================================================
// Progress Store
//=========================================================================================

#[derive(Default)]
struct StoreInner {
    rows: HashMap<(Uuid, i64), WatchProgress>,
    last_stamp: Option<DateTime<Utc>>,
}

impl StoreInner {
    /// Hands out strictly increasing timestamps so recency ordering is total.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// A `ProgressStore` held in memory.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `PortError::Unexpected`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> PortResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("progress store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for InMemoryStore {
    async fn upsert_progress(
        &self,
        user_id: Uuid,
        progress: &ResolvedProgress,
    ) -> PortResult<WatchProgress> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let stamp = inner.next_stamp();

        let row = inner
            .rows
            .entry((user_id, progress.episode_id))
            .and_modify(|row| {
                row.position_seconds = progress.position_seconds;
                row.duration_seconds = progress.duration_seconds;
                row.is_completed = row.is_completed || progress.is_completed;
                row.last_updated_at = stamp;
            })
            .or_insert_with(|| WatchProgress {
                user_id,
                episode_id: progress.episode_id,
                position_seconds: progress.position_seconds,
                duration_seconds: progress.duration_seconds,
                is_completed: progress.is_completed,
                last_updated_at: stamp,
            });
        Ok(row.clone())
    }

    async fn get_progress(
        &self,
        user_id: Uuid,
        episode_id: i64,
    ) -> PortResult<Option<WatchProgress>> {
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(inner.rows.get(&(user_id, episode_id)).cloned())
    }

    async fn list_progress(&self, user_id: Uuid) -> PortResult<Vec<WatchProgress>> {
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn clear_progress(&self, user_id: Uuid) -> PortResult<u64> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let before = inner.rows.len();
        inner.rows.retain(|(owner, _), _| *owner != user_id);
        Ok((before - inner.rows.len()) as u64)
    }
}

//=========================================================================================
// Catalog
//=========================================================================================

#[derive(Default)]
struct CatalogInner {
    anime: BTreeMap<i64, (String, String)>,
    episodes: BTreeMap<i64, EpisodeAncestry>,
}

/// A `CatalogLookup` populated by hand.
#[derive(Default)]
pub struct InMemoryCatalog {
    inner: RwLock<CatalogInner>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_anime(&self, anime_id: i64, title: &str, cover: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .anime
            .insert(anime_id, (title.to_string(), cover.to_string()));
    }

    pub fn add_episode(
        &self,
        anime_id: i64,
        season_id: i64,
        episode_id: i64,
        episode_number: i32,
        duration_seconds: i64,
    ) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.episodes.insert(
            episode_id,
            EpisodeAncestry {
                episode_id,
                episode_number,
                season_id,
                anime_id,
                duration_seconds: Some(duration_seconds),
            },
        );
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn episode_ancestry(&self, episode_ids: &[i64]) -> PortResult<Vec<EpisodeAncestry>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(episode_ids
            .iter()
            .filter_map(|id| inner.episodes.get(id).cloned())
            .collect())
    }

    async fn anime_overviews(&self, anime_ids: &[i64]) -> PortResult<Vec<AnimeOverview>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(anime_ids
            .iter()
            .filter_map(|id| {
                let (title, cover) = inner.anime.get(id)?;
                let total_episodes = inner
                    .episodes
                    .values()
                    .filter(|e| e.anime_id == *id)
                    .count() as i64;
                Some(AnimeOverview {
                    anime_id: *id,
                    title: title.clone(),
                    cover: cover.clone(),
                    total_episodes,
                })
            })
            .collect())
    }
}

//=========================================================================================
// Identity Gate
//=========================================================================================

/// An `IdentityGate` over a fixed table of session ids.
#[derive(Default)]
pub struct InMemoryIdentityGate {
    sessions: RwLock<HashMap<String, Uuid>>,
}

impl InMemoryIdentityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session_id: &str, user_id: Uuid) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.to_string(), user_id);
    }
}

#[async_trait]
impl IdentityGate for InMemoryIdentityGate {
    async fn resolve_session(&self, session_id: &str) -> PortResult<Uuid> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .copied()
            .ok_or(PortError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(episode_id: i64, position: i64, is_completed: bool) -> ResolvedProgress {
        ResolvedProgress {
            episode_id,
            position_seconds: position,
            duration_seconds: 1000,
            is_completed,
        }
    }

    #[tokio::test]
    async fn timestamps_strictly_increase_across_writes() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let first = store.upsert_progress(user, &resolved(1, 10, false)).await.unwrap();
        let second = store.upsert_progress(user, &resolved(1, 20, false)).await.unwrap();
        assert!(second.last_updated_at > first.last_updated_at);
    }

    #[tokio::test]
    async fn catalog_counts_episodes_per_anime() {
        let catalog = InMemoryCatalog::new();
        catalog.add_anime(1, "A", "a.jpg");
        catalog.add_anime(2, "B", "b.jpg");
        catalog.add_episode(1, 10, 100, 1, 1400);
        catalog.add_episode(1, 11, 101, 1, 1400);

        let overviews = catalog.anime_overviews(&[1, 2, 3]).await.unwrap();
        assert_eq!(overviews.len(), 2);
        assert_eq!(overviews[0].total_episodes, 2);
        assert_eq!(overviews[1].total_episodes, 0);
    }

    #[tokio::test]
    async fn unknown_session_is_unauthorized() {
        let gate = InMemoryIdentityGate::new();
        let user = Uuid::new_v4();
        gate.insert_session("abc", user);
        assert_eq!(gate.resolve_session("abc").await.unwrap(), user);
        assert_eq!(gate.resolve_session("nope").await, Err(PortError::Unauthorized));
    }
}
