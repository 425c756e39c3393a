//! crates/watch_progress_core/src/error.rs

use crate::ports::PortError;

/// Errors raised by the progress service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The request was rejected before any storage access.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A port (store, catalog) failed.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),
}

pub type CoreResult<T> = Result<T, CoreError>;
