//! Error types for defer-load.

use std::time::Duration;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Defer error: {0}")]
    Defer(#[from] DeferError),

    #[error("Work error: {0}")]
    Work(#[from] WorkError),
}

/// Construction-time errors, reported synchronously by `defer`.
///
/// Everything that goes wrong after `defer` returns is captured into the
/// worker's execution result instead — by then the caller has already
/// resumed and there is no one left to catch an error inline.
#[derive(Debug, thiserror::Error)]
pub enum DeferError {
    #[error("Startup delay {delay:?} outside allowed range 0..={max:?}")]
    InvalidDelay { delay: Duration, max: Duration },
}

/// Errors raised by a deferred unit of work.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("{0}")]
    Message(String),

    #[error("Name {name} not found in session namespace")]
    NameNotFound { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkError {
    /// Convenience constructor for ad-hoc work failures.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
