//! crates/watch_progress_core/src/tracker/driver.rs
//!
//! Runs a `PlaybackTracker` on a single tokio task: one `select!` loop over the
//! report interval, player events, finished network calls and the unload token.
//! Network calls are spawned and never awaited by the loop, so a slow or failing
//! server cannot stall playback.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PlaybackTracker, RetryOutcome, TrackerAction};
use crate::domain::{ProgressReport, ProgressSnapshot};
use crate::ports::{PortResult, ProgressClient};

/// Events raised by the video player and the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Load { episode_id: i64, duration_seconds: i64 },
    ResumeChosen,
    RestartChosen,
    Play,
    Pause,
    TimeUpdate { position_seconds: i64, duration_seconds: i64 },
    VisibilityHidden,
    MarkComplete,
}

/// Messages for the viewer UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerNotice {
    OfferResume { episode_id: i64, position_seconds: i64 },
    SeekTo { position_seconds: i64 },
    CompletionResolved { episode_id: i64, is_completed: bool },
    /// A report failed and was buffered for the next tick.
    ReportDeferred { episode_id: i64 },
}

/// Outcome of a spawned network call, fed back into the loop.
enum Completion {
    Fetched {
        episode_id: i64,
        snapshot: Option<ProgressSnapshot>,
    },
    Submitted {
        report: ProgressReport,
        result: PortResult<bool>,
    },
}

struct Dispatcher {
    client: Arc<dyn ProgressClient>,
    notices: mpsc::UnboundedSender<ViewerNotice>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Dispatcher {
    fn dispatch(&self, actions: Vec<TrackerAction>) {
        for action in actions {
            match action {
                TrackerAction::FetchProgress { episode_id } => {
                    let client = self.client.clone();
                    let completions = self.completions.clone();
                    tokio::spawn(async move {
                        let snapshot = match client.fetch_progress(episode_id).await {
                            Ok(snapshot) => Some(snapshot),
                            Err(e) => {
                                warn!("Failed to load progress for episode {}: {}", episode_id, e);
                                None
                            }
                        };
                        let _ = completions.send(Completion::Fetched {
                            episode_id,
                            snapshot,
                        });
                    });
                }
                TrackerAction::Submit(report) => {
                    let client = self.client.clone();
                    let completions = self.completions.clone();
                    tokio::spawn(async move {
                        let result = client.submit_progress(&report).await;
                        // The loop may already be gone after an unload.
                        let _ = completions.send(Completion::Submitted { report, result });
                    });
                }
                TrackerAction::OfferResume {
                    episode_id,
                    position_seconds,
                } => self.notify(ViewerNotice::OfferResume {
                    episode_id,
                    position_seconds,
                }),
                TrackerAction::SeekTo { position_seconds } => {
                    self.notify(ViewerNotice::SeekTo { position_seconds })
                }
            }
        }
    }

    fn notify(&self, notice: ViewerNotice) {
        if self.notices.send(notice).is_err() {
            debug!("Viewer is gone, dropping notice");
        }
    }
}

/// Drives `tracker` until `unload` is cancelled or the event stream ends, then
/// performs a final fire-and-forget flush and hands the tracker back `Idle`.
pub async fn run_tracker(
    mut tracker: PlaybackTracker,
    client: Arc<dyn ProgressClient>,
    mut events: mpsc::Receiver<PlayerEvent>,
    notices: mpsc::UnboundedSender<ViewerNotice>,
    unload: CancellationToken,
) -> PlaybackTracker {
    let (completions_tx, mut completions) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher {
        client,
        notices,
        completions: completions_tx,
    };

    let period = tracker.config().report_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Playback tracker started.");
    loop {
        tokio::select! {
            biased;

            _ = unload.cancelled() => {
                info!("Page unloading, flushing progress.");
                dispatcher.dispatch(tracker.flush());
                tracker.close();
                break;
            }

            Some(completion) = completions.recv() => {
                handle_completion(&mut tracker, completion, &dispatcher);
            }

            _ = ticker.tick() => {
                dispatcher.dispatch(tracker.tick());
            }

            event = events.recv() => match event {
                Some(event) => {
                    let actions = apply_event(&mut tracker, event);
                    dispatcher.dispatch(actions);
                }
                None => {
                    info!("Player closed, flushing progress.");
                    dispatcher.dispatch(tracker.flush());
                    tracker.close();
                    break;
                }
            },
        }
    }

    tracker
}

fn apply_event(tracker: &mut PlaybackTracker, event: PlayerEvent) -> Vec<TrackerAction> {
    match event {
        PlayerEvent::Load {
            episode_id,
            duration_seconds,
        } => tracker.load_episode(episode_id, duration_seconds),
        PlayerEvent::ResumeChosen => tracker.resume(),
        PlayerEvent::RestartChosen => tracker.restart(),
        PlayerEvent::Play => {
            tracker.play();
            Vec::new()
        }
        PlayerEvent::Pause => {
            tracker.pause();
            Vec::new()
        }
        PlayerEvent::TimeUpdate {
            position_seconds,
            duration_seconds,
        } => {
            tracker.time_update(position_seconds, duration_seconds);
            Vec::new()
        }
        PlayerEvent::VisibilityHidden => tracker.flush(),
        PlayerEvent::MarkComplete => tracker.mark_complete(),
    }
}

fn handle_completion(tracker: &mut PlaybackTracker, completion: Completion, dispatcher: &Dispatcher) {
    match completion {
        Completion::Fetched {
            episode_id,
            snapshot,
        } => {
            let actions = tracker.progress_loaded(episode_id, snapshot);
            dispatcher.dispatch(actions);
        }
        Completion::Submitted {
            report,
            result: Ok(is_completed),
        } => {
            tracker.report_succeeded(&report, is_completed);
            dispatcher.notify(ViewerNotice::CompletionResolved {
                episode_id: report.episode_id,
                is_completed,
            });
        }
        Completion::Submitted {
            report,
            result: Err(e),
        } => {
            let episode_id = report.episode_id;
            match tracker.report_failed(report) {
                RetryOutcome::Superseded => {
                    debug!(
                        "Progress report for episode {} failed but a newer one is out: {}",
                        episode_id, e
                    );
                    return;
                }
                RetryOutcome::Buffered => {
                    warn!(
                        "Progress report for episode {} failed, retrying next tick: {}",
                        episode_id, e
                    );
                }
                RetryOutcome::Evicted(dropped) => {
                    warn!(
                        "Progress report for episode {} failed, retry buffer full, dropped episode {}: {}",
                        episode_id, dropped.episode_id, e
                    );
                }
            }
            dispatcher.notify(ViewerNotice::ReportDeferred { episode_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCatalog, InMemoryStore};
    use crate::ports::PortError;
    use crate::service::{ProgressService, ServiceClient};
    use crate::tracker::{TrackerConfig, TrackerState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use uuid::Uuid;

    /// Records every report and fails the first `failures` submissions.
    #[derive(Default)]
    struct RecordingClient {
        saved_position: i64,
        failures: AtomicUsize,
        submitted: Mutex<Vec<ProgressReport>>,
    }

    impl RecordingClient {
        fn submitted(&self) -> Vec<ProgressReport> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressClient for RecordingClient {
        async fn submit_progress(&self, report: &ProgressReport) -> PortResult<bool> {
            self.submitted.lock().unwrap().push(report.clone());
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(PortError::Unexpected("connection reset".to_string()));
            }
            Ok(report.is_completed)
        }

        async fn fetch_progress(&self, _episode_id: i64) -> PortResult<ProgressSnapshot> {
            Ok(ProgressSnapshot {
                position_seconds: self.saved_position,
                ..Default::default()
            })
        }
    }

    struct Harness {
        events: mpsc::Sender<PlayerEvent>,
        notices: mpsc::UnboundedReceiver<ViewerNotice>,
        unload: CancellationToken,
        handle: JoinHandle<PlaybackTracker>,
    }

    fn start(client: Arc<dyn ProgressClient>) -> Harness {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let unload = CancellationToken::new();
        let handle = tokio::spawn(run_tracker(
            PlaybackTracker::new(TrackerConfig::default()),
            client,
            events_rx,
            notices_tx,
            unload.clone(),
        ));
        Harness {
            events: events_tx,
            notices: notices_rx,
            unload,
            handle,
        }
    }

    /// Lets spawned fire-and-forget tasks run to completion.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn load_and_play(harness: &Harness, episode_id: i64, position: i64) {
        harness
            .events
            .send(PlayerEvent::Load {
                episode_id,
                duration_seconds: 1400,
            })
            .await
            .unwrap();
        time::sleep(Duration::from_millis(100)).await;
        harness
            .events
            .send(PlayerEvent::TimeUpdate {
                position_seconds: position,
                duration_seconds: 1400,
            })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reports_on_every_interval_while_playing() {
        let client = Arc::new(RecordingClient::default());
        let harness = start(client.clone());

        load_and_play(&harness, 7, 300).await;
        time::sleep(Duration::from_secs(25)).await;
        settle().await;

        let reports = client.submitted();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.episode_id == 7 && r.position_seconds == 300));
    }

    #[tokio::test(start_paused = true)]
    async fn paused_playback_stops_periodic_reports() {
        let client = Arc::new(RecordingClient::default());
        let harness = start(client.clone());

        load_and_play(&harness, 7, 300).await;
        harness.events.send(PlayerEvent::Pause).await.unwrap();
        time::sleep(Duration::from_secs(35)).await;
        settle().await;

        assert!(client.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn saved_progress_prompts_viewer() {
        let client = Arc::new(RecordingClient {
            saved_position: 600,
            ..Default::default()
        });
        let mut harness = start(client.clone());

        harness
            .events
            .send(PlayerEvent::Load {
                episode_id: 7,
                duration_seconds: 1400,
            })
            .await
            .unwrap();
        let notice = harness.notices.recv().await.unwrap();
        assert_eq!(
            notice,
            ViewerNotice::OfferResume {
                episode_id: 7,
                position_seconds: 600
            }
        );

        harness.events.send(PlayerEvent::ResumeChosen).await.unwrap();
        let notice = harness.notices.recv().await.unwrap();
        assert_eq!(notice, ViewerNotice::SeekTo { position_seconds: 600 });

        // No report while the prompt was pending.
        assert!(client.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unload_flushes_last_position_before_stopping() {
        let client = Arc::new(RecordingClient::default());
        let harness = start(client.clone());

        load_and_play(&harness, 7, 845).await;
        time::sleep(Duration::from_secs(3)).await;
        harness.unload.cancel();
        let tracker = harness.handle.await.unwrap();
        settle().await;

        assert_eq!(tracker.state(), TrackerState::Idle);
        let reports = client.submitted();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].position_seconds, 845);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_page_flushes_once() {
        let client = Arc::new(RecordingClient::default());
        let harness = start(client.clone());

        load_and_play(&harness, 7, 120).await;
        harness.events.send(PlayerEvent::VisibilityHidden).await.unwrap();
        time::sleep(Duration::from_secs(25)).await;
        settle().await;

        assert_eq!(client.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_report_is_deferred_without_stopping_playback() {
        let client = Arc::new(RecordingClient {
            failures: AtomicUsize::new(1),
            ..Default::default()
        });
        let mut harness = start(client.clone());

        load_and_play(&harness, 7, 300).await;
        time::sleep(Duration::from_secs(11)).await;
        settle().await;

        let notice = harness.notices.recv().await.unwrap();
        assert_eq!(notice, ViewerNotice::ReportDeferred { episode_id: 7 });

        time::sleep(Duration::from_secs(10)).await;
        settle().await;
        let notice = harness.notices.recv().await.unwrap();
        assert_eq!(
            notice,
            ViewerNotice::CompletionResolved {
                episode_id: 7,
                is_completed: false
            }
        );

        harness.unload.cancel();
        let tracker = harness.handle.await.unwrap();
        assert_eq!(tracker.pending_reports(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tracker_against_service_marks_episode_complete() {
        let store = Arc::new(InMemoryStore::new());
        let catalog = InMemoryCatalog::new();
        catalog.add_anime(1, "Frieren", "/covers/frieren.jpg");
        catalog.add_episode(1, 11, 7, 7, 1400);
        let service = ProgressService::new(store, Arc::new(catalog));
        let user = Uuid::new_v4();
        let client = Arc::new(ServiceClient::new(service.clone(), user));
        let mut harness = start(client);

        load_and_play(&harness, 7, 1300).await;
        time::sleep(Duration::from_secs(10)).await;
        settle().await;

        let notice = harness.notices.recv().await.unwrap();
        assert_eq!(
            notice,
            ViewerNotice::CompletionResolved {
                episode_id: 7,
                is_completed: true
            }
        );
        let snapshot = service.query(user, 7).await.unwrap();
        assert!(snapshot.is_completed);
        assert_eq!(snapshot.position_seconds, 1300);

        harness.unload.cancel();
        let tracker = harness.handle.await.unwrap();
        assert_eq!(tracker.state(), TrackerState::Idle);
    }
}
