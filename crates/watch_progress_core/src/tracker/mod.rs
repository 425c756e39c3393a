//! crates/watch_progress_core/src/tracker/mod.rs
//!
//! The viewer-side playback tracker.
//!
//! `PlaybackTracker` is a synchronous state machine: every input (player event,
//! timer tick, finished network call) is a method call that returns the
//! `TrackerAction`s the host must carry out. It never performs I/O itself, so it
//! can be driven by the tokio loop in [`driver`] or stepped by hand in tests.
//!
//! ```text
//! Idle -> Loading -> ResumePending -> Playing <-> Paused
//!                 \-----------------^    |          |
//!                                        v          v
//!                                       Flushed (hidden / unload)
//!                                          |
//!                                          v
//!                           Idle (close)  or  Loading (next episode)
//! ```

pub mod buffer;
pub mod driver;

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::{ProgressReport, ProgressSnapshot, RESUME_FLOOR_SECONDS};
use buffer::PendingReports;

/// Timing and sizing knobs for the tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How often a report is sent while playing.
    pub report_interval: Duration,
    /// Saved positions at or below this never prompt for resume.
    pub resume_floor_seconds: i64,
    /// Maximum number of failed reports kept for retry.
    pub buffer_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(10),
            resume_floor_seconds: RESUME_FLOOR_SECONDS,
            buffer_capacity: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    /// Waiting for the saved progress of the loaded episode.
    Loading,
    /// The viewer is being asked whether to resume.
    ResumePending,
    Playing,
    Paused,
    /// The page was hidden or unloaded and the last report went out.
    Flushed,
}

/// Work the host must perform on behalf of the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerAction {
    FetchProgress { episode_id: i64 },
    OfferResume { episode_id: i64, position_seconds: i64 },
    SeekTo { position_seconds: i64 },
    /// Send a report. Fire-and-forget: the outcome comes back through
    /// `report_succeeded` or `report_failed`.
    Submit(ProgressReport),
}

/// What became of a report that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Kept for the next tick or flush.
    Buffered,
    /// Kept, pushing the oldest waiting report out of the buffer.
    Evicted(ProgressReport),
    /// A later report for the same episode already went out, so this one is dropped.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct PlaybackTracker {
    config: TrackerConfig,
    state: TrackerState,
    episode_id: Option<i64>,
    position_seconds: i64,
    duration_seconds: i64,
    completed: bool,
    saved_position: i64,
    pending: PendingReports,
    /// The most recent report emitted per episode that is not yet confirmed.
    last_emitted: HashMap<i64, ProgressReport>,
}

impl PlaybackTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let pending = PendingReports::new(config.buffer_capacity);
        Self {
            config,
            state: TrackerState::Idle,
            episode_id: None,
            position_seconds: 0,
            duration_seconds: 0,
            completed: false,
            saved_position: 0,
            pending,
            last_emitted: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn episode_id(&self) -> Option<i64> {
        self.episode_id
    }

    pub fn position_seconds(&self) -> i64 {
        self.position_seconds
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn pending_reports(&self) -> usize {
        self.pending.len()
    }

    //=====================================================================================
    // Inputs
    //=====================================================================================

    /// Starts tracking `episode_id`. A previously playing episode is flushed first.
    pub fn load_episode(&mut self, episode_id: i64, duration_seconds: i64) -> Vec<TrackerAction> {
        let mut actions = if self.has_live_position() {
            self.report_actions()
        } else {
            Vec::new()
        };

        self.episode_id = Some(episode_id);
        self.position_seconds = 0;
        self.duration_seconds = duration_seconds.max(0);
        self.completed = false;
        self.saved_position = 0;
        self.state = TrackerState::Loading;

        actions.push(TrackerAction::FetchProgress { episode_id });
        actions
    }

    /// Feeds the result of the initial progress query. `None` means the query
    /// failed, which is treated as "no saved progress".
    pub fn progress_loaded(
        &mut self,
        episode_id: i64,
        snapshot: Option<ProgressSnapshot>,
    ) -> Vec<TrackerAction> {
        if self.state != TrackerState::Loading || self.episode_id != Some(episode_id) {
            return Vec::new();
        }

        let snapshot = snapshot.unwrap_or_default();
        self.completed = snapshot.is_completed;

        if snapshot.exceeds_floor(self.config.resume_floor_seconds) {
            self.saved_position = snapshot.position_seconds;
            self.state = TrackerState::ResumePending;
            vec![TrackerAction::OfferResume {
                episode_id,
                position_seconds: snapshot.position_seconds,
            }]
        } else {
            self.state = TrackerState::Playing;
            Vec::new()
        }
    }

    /// The viewer accepted the resume prompt.
    pub fn resume(&mut self) -> Vec<TrackerAction> {
        if self.state != TrackerState::ResumePending {
            return Vec::new();
        }
        self.position_seconds = self.saved_position;
        self.state = TrackerState::Playing;
        vec![TrackerAction::SeekTo {
            position_seconds: self.position_seconds,
        }]
    }

    /// The viewer declined the resume prompt. The reset is reported at once so
    /// the stale resume point is not offered again.
    pub fn restart(&mut self) -> Vec<TrackerAction> {
        if self.state != TrackerState::ResumePending {
            return Vec::new();
        }
        self.position_seconds = 0;
        self.saved_position = 0;
        self.state = TrackerState::Playing;

        let mut actions = vec![TrackerAction::SeekTo { position_seconds: 0 }];
        actions.extend(self.report_actions());
        actions
    }

    /// Updates the local running clock from the player.
    pub fn time_update(&mut self, position_seconds: i64, duration_seconds: i64) {
        if !self.has_live_position() {
            return;
        }
        if duration_seconds > 0 {
            self.duration_seconds = duration_seconds;
        }
        let mut position = position_seconds.max(0);
        if self.duration_seconds > 0 {
            position = position.min(self.duration_seconds);
        }
        self.position_seconds = position;
    }

    pub fn play(&mut self) {
        if matches!(self.state, TrackerState::Paused | TrackerState::Flushed) {
            self.state = TrackerState::Playing;
        }
    }

    pub fn pause(&mut self) {
        if self.state == TrackerState::Playing {
            self.state = TrackerState::Paused;
        }
    }

    /// The periodic timer fired. Only a playing tracker reports; buffered
    /// reports ride along.
    pub fn tick(&mut self) -> Vec<TrackerAction> {
        if self.state != TrackerState::Playing {
            return Vec::new();
        }
        self.report_actions()
    }

    /// Forced flush on page hide or unload: the next tick may never come.
    pub fn flush(&mut self) -> Vec<TrackerAction> {
        if self.has_live_position() {
            let actions = self.report_actions();
            self.state = TrackerState::Flushed;
            actions
        } else {
            let buffered = self.pending.drain_except(None);
            self.emit(buffered)
        }
    }

    /// Playback is torn down: the tracker forgets the episode and returns to
    /// `Idle`. Call after the final `flush`; buffered reports are kept.
    pub fn close(&mut self) {
        self.state = TrackerState::Idle;
        self.episode_id = None;
        self.position_seconds = 0;
        self.duration_seconds = 0;
        self.completed = false;
        self.saved_position = 0;
    }

    /// Explicit "mark as watched": jumps to the end and reports completion now.
    pub fn mark_complete(&mut self) -> Vec<TrackerAction> {
        if self.episode_id.is_none()
            || matches!(self.state, TrackerState::Idle | TrackerState::Loading)
        {
            return Vec::new();
        }
        if self.duration_seconds > 0 {
            self.position_seconds = self.duration_seconds;
        }
        self.completed = true;
        if self.state == TrackerState::ResumePending {
            self.state = TrackerState::Playing;
        }
        self.report_actions()
    }

    /// The server accepted `report` and resolved its completion flag.
    ///
    /// When `report` is the latest one emitted for its episode, nothing older
    /// for that episode is worth retrying.
    pub fn report_succeeded(&mut self, report: &ProgressReport, is_completed: bool) {
        let episode_id = report.episode_id;
        if self.last_emitted.get(&episode_id) == Some(report) {
            self.last_emitted.remove(&episode_id);
            self.pending.discard(episode_id);
        }
        if self.episode_id == Some(episode_id) {
            self.completed |= is_completed;
        }
    }

    /// A report could not be delivered. Only the latest report emitted for an
    /// episode is kept for retry; older ones would overwrite newer progress.
    pub fn report_failed(&mut self, report: ProgressReport) -> RetryOutcome {
        if self.last_emitted.get(&report.episode_id) != Some(&report) {
            return RetryOutcome::Superseded;
        }
        match self.pending.push(report) {
            Some(evicted) => {
                if self.last_emitted.get(&evicted.episode_id) == Some(&evicted) {
                    self.last_emitted.remove(&evicted.episode_id);
                }
                RetryOutcome::Evicted(evicted)
            }
            None => RetryOutcome::Buffered,
        }
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    fn has_live_position(&self) -> bool {
        self.episode_id.is_some()
            && matches!(
                self.state,
                TrackerState::Playing | TrackerState::Paused | TrackerState::Flushed
            )
    }

    fn current_report(&self) -> Option<ProgressReport> {
        self.episode_id.map(|episode_id| ProgressReport {
            episode_id,
            position_seconds: self.position_seconds,
            duration_seconds: self.duration_seconds,
            is_completed: self.completed,
        })
    }

    fn report_actions(&mut self) -> Vec<TrackerAction> {
        let current = self.current_report();
        let mut reports = self
            .pending
            .drain_except(current.as_ref().map(|r| r.episode_id));
        reports.extend(current);
        self.emit(reports)
    }

    fn emit(&mut self, reports: Vec<ProgressReport>) -> Vec<TrackerAction> {
        reports
            .into_iter()
            .map(|report| {
                self.last_emitted.insert(report.episode_id, report.clone());
                TrackerAction::Submit(report)
            })
            .collect()
    }
}
