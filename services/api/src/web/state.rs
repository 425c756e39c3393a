//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use watch_progress_core::{IdentityGate, ProgressService};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub progress: ProgressService,
    pub identity: Arc<dyn IdentityGate>,
    pub config: Arc<Config>,
}
