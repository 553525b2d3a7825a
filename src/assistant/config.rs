//! Assistant configuration
//!
//! Configuration is plain data: it can be built in code or loaded from JSON.
//!
//! ```rust
//! use trueno_lab::assistant::{AssistantConfig, ExecutorConfig};
//!
//! let config = AssistantConfig::from_json(r#"{"executor": {"pooled_workers": 4}}"#)?;
//! assert_eq!(config.executor, ExecutorConfig::PooledWorkers(4));
//! assert_eq!(config.thread_name_prefix, "labrun-worker");
//! # Ok::<(), trueno_lab::Error>(())
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Default worker thread-name prefix
pub const DEFAULT_THREAD_PREFIX: &str = "labrun-worker";

/// Shape of the worker pool backing an assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorConfig {
    /// One worker: strict global serialization of experiments
    #[default]
    SingleWorker,
    /// `n` workers pulling from the shared queue
    PooledWorkers(usize),
}

impl ExecutorConfig {
    /// Pool as wide as the host's available parallelism (1 if unknown).
    #[must_use]
    pub fn available_parallelism() -> Self {
        std::thread::available_parallelism()
            .map_or(Self::SingleWorker, |n| Self::PooledWorkers(n.get()))
    }

    /// Number of workers
    #[must_use]
    pub const fn workers(self) -> usize {
        match self {
            Self::SingleWorker => 1,
            Self::PooledWorkers(n) => n,
        }
    }

    /// Check that the pool has at least one worker.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for `PooledWorkers(0)`.
    pub fn validate(self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.workers()).ok_or_else(|| {
            Error::InvalidInput("a worker pool needs at least one worker".to_string())
        })
    }
}

/// Assistant settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Worker pool shape
    pub executor: ExecutorConfig,
    /// Prefix of worker thread names
    pub thread_name_prefix: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }
}

impl AssistantConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] for malformed JSON, [`Error::InvalidInput`] for an
    /// invalid pool shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for an invalid pool shape or an empty thread
    /// prefix.
    pub fn validate(&self) -> Result<()> {
        self.executor.validate()?;
        if self.thread_name_prefix.is_empty() {
            return Err(Error::InvalidInput(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
