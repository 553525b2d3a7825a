//! Error types for Trueno-Lab
//!
//! Two families live here:
//! - [`Error`]: failures of the engine itself (persistence, configuration,
//!   illegal lifecycle requests)
//! - [`ExperimentError`]: what user execution code reports back to the
//!   state machine (domain failure or observed interruption)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Lab error types
#[derive(Error, Debug)]
pub enum Error {
    /// Persisted experiment state is missing a key or has the wrong shape
    #[error("Persistence error: {0}\nThe record was not produced by a compatible save_state()")]
    Persistence(String),

    /// Persisted record was written by a newer format version
    #[error("Unsupported state version {found} (this build reads up to {supported})")]
    UnsupportedVersion {
        /// Version found in the record
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },

    /// Lifecycle operation requested in a state that does not allow it
    #[error("Experiment {id} is {status}; operation not allowed in this state")]
    InvalidState {
        /// Experiment ID
        id: u64,
        /// Status at the time of the request
        status: String,
    },

    /// Invalid input parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Cooperative interruption observed at a suspension point.
///
/// Produced by [`CancellationToken`](crate::experiment::CancellationToken)
/// checks once cancellation has been requested.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("interrupted")]
pub struct Interrupted;

/// Outcome reported by an experiment body when it cannot complete normally.
#[derive(Error, Debug)]
pub enum ExperimentError {
    /// Domain failure: the experiment logic cannot proceed
    #[error("experiment failed: {0}")]
    Failed(#[from] anyhow::Error),

    /// The body observed a cancellation request and stopped
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl ExperimentError {
    /// Build a domain failure from a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(anyhow::anyhow!(message.into()))
    }

    /// Whether this error is an interruption rather than a failure.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}
