//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the watch-progress REST endpoints and the
//! master definition for the OpenAPI specification.

use crate::{error::ApiError, web::state::AppState};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;
use watch_progress_core::{
    format::relative_time, ContinueWatchingEntry, HistoryEntry, ProgressReport,
};

/// Upper bound for `limit` on the continue-watching list.
pub const MAX_CONTINUE_WATCHING_LIMIT: usize = 50;
/// Upper bound for `limit` on the history list.
pub const MAX_HISTORY_LIMIT: usize = 100;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        save_progress_handler,
        get_progress_handler,
        continue_watching_handler,
        history_handler,
        clear_history_handler,
        health_handler,
    ),
    components(
        schemas(
            SaveProgressRequest,
            SaveProgressResponse,
            ProgressData,
            ProgressResponse,
            ContinueWatchingItem,
            ContinueWatchingResponse,
            HistoryItem,
            HistoryResponse,
            ClearHistoryResponse,
        )
    ),
    tags(
        (name = "Watch Progress API", description = "Playback progress, resume and continue-watching endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Request and Response Structs
//=========================================================================================

/// A progress report sent by the player.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveProgressRequest {
    pub episode_id: Option<i64>,
    #[serde(default, deserialize_with = "whole_seconds")]
    pub position_seconds: i64,
    #[serde(default, deserialize_with = "whole_seconds")]
    pub duration_seconds: i64,
    #[serde(default)]
    pub is_completed: bool,
}

/// Players report fractional seconds; only whole seconds are stored.
fn whole_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = f64::deserialize(deserializer)?;
    if !seconds.is_finite() {
        return Err(serde::de::Error::custom("seconds must be a finite number"));
    }
    Ok(seconds.trunc() as i64)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaveProgressResponse {
    pub success: bool,
    pub message: String,
    /// Completion after the server-side threshold was applied.
    pub is_completed: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProgressQuery {
    pub episode_id: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    /// Non-positive or missing limits fall back to `default`; large ones are capped.
    fn resolve(&self, default: usize, max: usize) -> usize {
        match self.limit {
            Some(limit) if limit > 0 => (limit as usize).min(max),
            _ => default.min(max),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressData {
    pub position_seconds: i64,
    pub is_completed: bool,
    pub watched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressResponse {
    pub success: bool,
    pub data: ProgressData,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContinueWatchingItem {
    pub anime_id: i64,
    pub anime_title: String,
    pub anime_cover: String,
    pub total_episodes: i64,
    pub watched_episodes: i64,
    pub completion_percentage: f64,
    pub last_watched: DateTime<Utc>,
    pub last_watched_formatted: String,
}

impl ContinueWatchingItem {
    fn from_entry(entry: ContinueWatchingEntry, now: DateTime<Utc>) -> Self {
        Self {
            last_watched_formatted: relative_time(entry.last_watched, now),
            anime_id: entry.anime_id,
            anime_title: entry.anime_title,
            anime_cover: entry.anime_cover,
            total_episodes: entry.total_episodes,
            watched_episodes: entry.watched_episodes,
            completion_percentage: entry.completion_percentage,
            last_watched: entry.last_watched,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContinueWatchingResponse {
    pub success: bool,
    pub data: Vec<ContinueWatchingItem>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryItem {
    pub episode_id: i64,
    pub episode_number: i32,
    pub season_id: i64,
    pub anime_id: i64,
    pub anime_title: String,
    pub position_seconds: i64,
    pub duration_seconds: i64,
    pub is_completed: bool,
    pub watched_at: DateTime<Utc>,
    pub watched_at_formatted: String,
}

impl HistoryItem {
    fn from_entry(entry: HistoryEntry, now: DateTime<Utc>) -> Self {
        Self {
            watched_at_formatted: relative_time(entry.watched_at, now),
            episode_id: entry.episode_id,
            episode_number: entry.episode_number,
            season_id: entry.season_id,
            anime_id: entry.anime_id,
            anime_title: entry.anime_title,
            position_seconds: entry.position_seconds,
            duration_seconds: entry.duration_seconds,
            is_completed: entry.is_completed,
            watched_at: entry.watched_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub success: bool,
    pub data: Vec<HistoryItem>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: String,
    pub deleted: u64,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Save a progress report for the logged-in user.
///
/// A report at or past 90% of its duration marks the episode completed,
/// whatever `is_completed` says.
#[utoipa::path(
    post,
    path = "/api/progress",
    request_body = SaveProgressRequest,
    responses(
        (status = 200, description = "Progress saved", body = SaveProgressResponse),
        (status = 400, description = "Missing or invalid episode_id, or malformed body"),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Progress could not be stored")
    )
)]
pub async fn save_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    payload: Result<Json<SaveProgressRequest>, JsonRejection>,
) -> Result<Json<SaveProgressResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let episode_id = req
        .episode_id
        .ok_or_else(|| ApiError::Validation("episode_id is required".to_string()))?;

    let report = ProgressReport {
        episode_id,
        position_seconds: req.position_seconds,
        duration_seconds: req.duration_seconds,
        is_completed: req.is_completed,
    };
    let stored = app_state.progress.ingest(user_id, &report).await?;

    Ok(Json(SaveProgressResponse {
        success: true,
        message: "Progress saved".to_string(),
        is_completed: stored.is_completed,
    }))
}

/// Get the saved progress of one episode, or zero values if there is none.
#[utoipa::path(
    get,
    path = "/api/progress",
    params(ProgressQuery),
    responses(
        (status = 200, description = "Saved progress (zero values when none)", body = ProgressResponse),
        (status = 400, description = "Missing or invalid episode_id"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn get_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    query: Result<Query<ProgressQuery>, QueryRejection>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let episode_id = query
        .episode_id
        .ok_or_else(|| ApiError::Validation("episode_id is required".to_string()))?;

    let snapshot = app_state.progress.query(user_id, episode_id).await?;

    Ok(Json(ProgressResponse {
        success: true,
        data: ProgressData {
            position_seconds: snapshot.position_seconds,
            is_completed: snapshot.is_completed,
            watched_at: snapshot.last_updated_at,
        },
    }))
}

/// List partially watched anime, most recently watched first.
#[utoipa::path(
    get,
    path = "/api/continue-watching",
    params(LimitQuery),
    responses(
        (status = 200, description = "Partially watched anime", body = ContinueWatchingResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn continue_watching_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<ContinueWatchingResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let limit = query.resolve(
        app_state.config.continue_watching_limit,
        MAX_CONTINUE_WATCHING_LIMIT,
    );

    let entries = app_state.progress.continue_watching(user_id, limit).await?;
    let now = Utc::now();
    let data: Vec<ContinueWatchingItem> = entries
        .into_iter()
        .map(|entry| ContinueWatchingItem::from_entry(entry, now))
        .collect();

    Ok(Json(ContinueWatchingResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

/// List the user's watch history, most recent first.
#[utoipa::path(
    get,
    path = "/api/history",
    params(LimitQuery),
    responses(
        (status = 200, description = "Watch history", body = HistoryResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let limit = query.resolve(app_state.config.history_limit, MAX_HISTORY_LIMIT);

    let entries = app_state.progress.history(user_id, limit).await?;
    let now = Utc::now();
    let data: Vec<HistoryItem> = entries
        .into_iter()
        .map(|entry| HistoryItem::from_entry(entry, now))
        .collect();

    Ok(Json(HistoryResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

/// Delete every progress row of the logged-in user.
#[utoipa::path(
    delete,
    path = "/api/history",
    responses(
        (status = 200, description = "History cleared", body = ClearHistoryResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn clear_history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<ClearHistoryResponse>, ApiError> {
    let deleted = app_state.progress.clear_history(user_id).await?;
    info!("User {} cleared their watch history", user_id);

    Ok(Json(ClearHistoryResponse {
        success: true,
        message: "History cleared".to_string(),
        deleted,
    }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
