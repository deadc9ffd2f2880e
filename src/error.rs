//! Error types for hypercorescale
//!
//! Every per-attempt failure is caught at the scheduler boundary and turned
//! into a failed result record; the variants here exist so the scheduler and
//! the lifecycle driver can tell the outcomes apart.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Hypercorescale error types
#[derive(Error, Debug)]
pub enum Error {
    /// `run_experiment()` was invoked twice on the same instance
    #[error("experiment already ran")]
    AlreadyRan,

    /// The attempt exceeded the configured wall-clock timeout
    #[error("experiment timeout after {seconds}s")]
    Timeout {
        /// Configured timeout, in seconds
        seconds: u64,
    },

    /// The process is closing; the attempt is discarded, never persisted
    #[error("shutting down")]
    Shutdown,

    /// Storage or network failed to open or close
    #[error("resource error: {0}")]
    Resource(String),

    /// An internal consistency check failed (bug in this code)
    #[error("sanity check failed: {0}")]
    Sanity(String),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
