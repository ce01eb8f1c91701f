//! Error types for Scuttle

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backing store could not be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be interpreted
    #[error("corrupt backend data: {0}")]
    Corrupt(String),
}

/// Scuttle error types
#[derive(Debug, Error)]
pub enum Error {
    /// Backend read or write failed
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The sink already saw the end of its input
    #[error("gossip sink closed")]
    SinkClosed,
}

