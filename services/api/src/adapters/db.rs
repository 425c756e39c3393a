//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ProgressStore`, `CatalogLookup` and `IdentityGate` ports from the `core`
//! crate. It handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use watch_progress_core::domain::{
    AnimeOverview, EpisodeAncestry, ResolvedProgress, WatchProgress,
};
use watch_progress_core::ports::{
    CatalogLookup, IdentityGate, PortError, PortResult, ProgressStore,
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage, catalog and identity ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProgressRecord {
    user_id: Uuid,
    episode_id: i64,
    position_seconds: i64,
    duration_seconds: i64,
    is_completed: bool,
    last_updated_at: DateTime<Utc>,
}
impl ProgressRecord {
    fn to_domain(self) -> WatchProgress {
        WatchProgress {
            user_id: self.user_id,
            episode_id: self.episode_id,
            position_seconds: self.position_seconds,
            duration_seconds: self.duration_seconds,
            is_completed: self.is_completed,
            last_updated_at: self.last_updated_at,
        }
    }
}

#[derive(FromRow)]
struct EpisodeAncestryRecord {
    episode_id: i64,
    episode_number: i32,
    season_id: i64,
    anime_id: i64,
    duration_seconds: Option<i64>,
}
impl EpisodeAncestryRecord {
    fn to_domain(self) -> EpisodeAncestry {
        EpisodeAncestry {
            episode_id: self.episode_id,
            episode_number: self.episode_number,
            season_id: self.season_id,
            anime_id: self.anime_id,
            duration_seconds: self.duration_seconds,
        }
    }
}

#[derive(FromRow)]
struct AnimeOverviewRecord {
    anime_id: i64,
    title: String,
    /// The catalog allows anime without artwork.
    cover: Option<String>,
    total_episodes: i64,
}
impl AnimeOverviewRecord {
    fn to_domain(self) -> AnimeOverview {
        AnimeOverview {
            anime_id: self.anime_id,
            title: self.title,
            cover: self.cover.unwrap_or_default(),
            total_episodes: self.total_episodes,
        }
    }
}

//=========================================================================================
// `ProgressStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn upsert_progress(
        &self,
        user_id: Uuid,
        progress: &ResolvedProgress,
    ) -> PortResult<WatchProgress> {
        // Single statement: no read-then-write window between concurrent reports.
        let record = sqlx::query_as::<_, ProgressRecord>(
            r#"
            INSERT INTO watch_progress (
                user_id, episode_id, position_seconds, duration_seconds, is_completed, last_updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (user_id, episode_id) DO UPDATE SET
                position_seconds = EXCLUDED.position_seconds,
                duration_seconds = EXCLUDED.duration_seconds,
                is_completed = watch_progress.is_completed OR EXCLUDED.is_completed,
                last_updated_at = EXCLUDED.last_updated_at
            RETURNING user_id, episode_id, position_seconds, duration_seconds, is_completed, last_updated_at
            "#,
        )
        .bind(user_id)
        .bind(progress.episode_id)
        .bind(progress.position_seconds)
        .bind(progress.duration_seconds)
        .bind(progress.is_completed)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn get_progress(
        &self,
        user_id: Uuid,
        episode_id: i64,
    ) -> PortResult<Option<WatchProgress>> {
        let record = sqlx::query_as::<_, ProgressRecord>(
            r#"
            SELECT user_id, episode_id, position_seconds, duration_seconds, is_completed, last_updated_at
            FROM watch_progress
            WHERE user_id = $1 AND episode_id = $2
            "#,
        )
        .bind(user_id)
        .bind(episode_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(ProgressRecord::to_domain))
    }

    async fn list_progress(&self, user_id: Uuid) -> PortResult<Vec<WatchProgress>> {
        let records = sqlx::query_as::<_, ProgressRecord>(
            r#"
            SELECT user_id, episode_id, position_seconds, duration_seconds, is_completed, last_updated_at
            FROM watch_progress
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn clear_progress(&self, user_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM watch_progress WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// `CatalogLookup` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogLookup for DbAdapter {
    async fn episode_ancestry(&self, episode_ids: &[i64]) -> PortResult<Vec<EpisodeAncestry>> {
        if episode_ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, EpisodeAncestryRecord>(
            r#"
            SELECT e.id AS episode_id, e.episode_number, e.season_id, s.anime_id, e.duration_seconds
            FROM episodes e
            JOIN seasons s ON s.id = e.season_id
            WHERE e.id = ANY($1)
            "#,
        )
        .bind(episode_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn anime_overviews(&self, anime_ids: &[i64]) -> PortResult<Vec<AnimeOverview>> {
        if anime_ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, AnimeOverviewRecord>(
            r#"
            SELECT a.id AS anime_id,
                   a.title,
                   COALESCE(a.cover_image, '') AS cover,
                   COUNT(e.id) AS total_episodes
            FROM anime a
            LEFT JOIN seasons s ON s.anime_id = a.id
            LEFT JOIN episodes e ON e.season_id = s.id
            WHERE a.id = ANY($1)
            GROUP BY a.id, a.title, a.cover_image
            "#,
        )
        .bind(anime_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `IdentityGate` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityGate for DbAdapter {
    async fn resolve_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }
}
