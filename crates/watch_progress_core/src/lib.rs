pub mod aggregation;
pub mod domain;
pub mod error;
pub mod format;
pub mod memory;
pub mod policy;
pub mod ports;
pub mod service;
pub mod tracker;

pub use domain::{
    AnimeOverview, ContinueWatchingEntry, EpisodeAncestry, HistoryEntry, ProgressReport,
    ProgressSnapshot, ResolvedProgress, WatchProgress, RESUME_FLOOR_SECONDS,
};
pub use error::{CoreError, CoreResult};
pub use ports::{CatalogLookup, IdentityGate, PortError, PortResult, ProgressClient, ProgressStore};
pub use service::{ProgressService, ServiceClient};
pub use tracker::{PlaybackTracker, RetryOutcome, TrackerAction, TrackerConfig, TrackerState};
