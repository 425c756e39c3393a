//! crates/watch_progress_core/src/aggregation.rs
//!
//! Derives the read-only views built on top of per-episode progress: the
//! per-anime "continue watching" summary and the flat watch history.
//!
//! Both functions are pure joins over rows already fetched from the store and
//! the catalog, so they tolerate rows written concurrently with the fetch.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::{
    AnimeOverview, ContinueWatchingEntry, EpisodeAncestry, HistoryEntry, WatchProgress,
};

#[derive(Default)]
struct AnimeActivity {
    completed_episodes: HashSet<i64>,
    last_watched: Option<DateTime<Utc>>,
}

/// Builds the "continue watching" list.
///
/// An anime is included when the user completed at least one of its episodes
/// but not all of them. Anime the catalog reports with zero episodes are skipped.
/// The result is ordered by most recent activity first and cut to `limit`.
pub fn continue_watching(
    progress: &[WatchProgress],
    ancestry: &[EpisodeAncestry],
    anime: &[AnimeOverview],
    limit: usize,
) -> Vec<ContinueWatchingEntry> {
    let anime_of_episode: HashMap<i64, i64> = ancestry
        .iter()
        .map(|a| (a.episode_id, a.anime_id))
        .collect();

    let mut activity: HashMap<i64, AnimeActivity> = HashMap::new();
    for row in progress {
        let Some(&anime_id) = anime_of_episode.get(&row.episode_id) else {
            continue;
        };
        let entry = activity.entry(anime_id).or_default();
        if row.is_completed {
            entry.completed_episodes.insert(row.episode_id);
        }
        entry.last_watched = entry.last_watched.max(Some(row.last_updated_at));
    }

    let mut entries: Vec<ContinueWatchingEntry> = anime
        .iter()
        .filter_map(|overview| {
            let act = activity.get(&overview.anime_id)?;
            let watched = act.completed_episodes.len() as i64;
            let total = overview.total_episodes;
            if watched == 0 || total <= 0 || watched >= total {
                return None;
            }
            Some(ContinueWatchingEntry {
                anime_id: overview.anime_id,
                anime_title: overview.title.clone(),
                anime_cover: overview.cover.clone(),
                total_episodes: total,
                watched_episodes: watched,
                completion_percentage: completion_percentage(watched, total),
                last_watched: act.last_watched?,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.last_watched
            .cmp(&a.last_watched)
            .then(a.anime_id.cmp(&b.anime_id))
    });
    entries.truncate(limit);
    entries
}

/// `watched / total * 100` rounded to one decimal. Callers guarantee `total > 0`.
pub fn completion_percentage(watched: i64, total: i64) -> f64 {
    (watched as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Joins the user's progress rows against the catalog, most recent first.
/// Rows whose episode or anime the catalog no longer knows are dropped.
pub fn history(
    progress: &[WatchProgress],
    ancestry: &[EpisodeAncestry],
    anime: &[AnimeOverview],
    limit: usize,
) -> Vec<HistoryEntry> {
    let ancestry_by_episode: HashMap<i64, &EpisodeAncestry> =
        ancestry.iter().map(|a| (a.episode_id, a)).collect();
    let title_by_anime: HashMap<i64, &str> = anime
        .iter()
        .map(|a| (a.anime_id, a.title.as_str()))
        .collect();

    let mut rows: Vec<&WatchProgress> = progress.iter().collect();
    rows.sort_by(|a, b| {
        b.last_updated_at
            .cmp(&a.last_updated_at)
            .then(a.episode_id.cmp(&b.episode_id))
    });

    rows.into_iter()
        .filter_map(|row| {
            let ancestry = ancestry_by_episode.get(&row.episode_id)?;
            let title = title_by_anime.get(&ancestry.anime_id)?;
            Some(HistoryEntry {
                episode_id: row.episode_id,
                episode_number: ancestry.episode_number,
                season_id: ancestry.season_id,
                anime_id: ancestry.anime_id,
                anime_title: title.to_string(),
                position_seconds: row.position_seconds,
                duration_seconds: row.duration_seconds,
                is_completed: row.is_completed,
                watched_at: row.last_updated_at,
            })
        })
        .take(limit)
        .collect()
}
