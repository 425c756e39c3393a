//! Bounded buffer of reports that failed to send and wait for the next tick.

use std::collections::VecDeque;

use crate::domain::ProgressReport;

/// Holds at most one pending report per episode, evicting the oldest episode
/// once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct PendingReports {
    capacity: usize,
    queue: VecDeque<ProgressReport>,
}

impl PendingReports {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: VecDeque::new(),
        }
    }

    /// Buffers `report`, replacing an older report for the same episode.
    /// Returns the evicted report when the buffer overflowed.
    pub fn push(&mut self, report: ProgressReport) -> Option<ProgressReport> {
        self.queue.retain(|r| r.episode_id != report.episode_id);
        self.queue.push_back(report);
        if self.queue.len() > self.capacity {
            return self.queue.pop_front();
        }
        None
    }

    /// Takes every buffered report except those for `superseded_episode`, which
    /// are dropped because a fresher report for that episode is about to go out.
    pub fn drain_except(&mut self, superseded_episode: Option<i64>) -> Vec<ProgressReport> {
        self.queue
            .drain(..)
            .filter(|r| Some(r.episode_id) != superseded_episode)
            .collect()
    }

    /// Drops the buffered report for `episode_id`, if any.
    pub fn discard(&mut self, episode_id: i64) {
        self.queue.retain(|r| r.episode_id != episode_id);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
