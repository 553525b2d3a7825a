//! Structured logging setup
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the embedding program. These helpers install the usual `fmt`
//! subscriber for binaries and tests.

use crate::error::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info";

/// Initialize logging with [`DEFAULT_FILTER`].
///
/// `RUST_LOG` overrides the default filter. Does nothing if a global
/// subscriber is already installed.
pub fn init() {
    // A subscriber installed by the host program takes precedence
    let _ = try_init(DEFAULT_FILTER);
}

/// Initialize logging with `filter` unless `RUST_LOG` is set.
///
/// # Errors
///
/// [`Error::Other`] if a global subscriber is already installed.
pub fn try_init(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| Error::Other(format!("logging already initialized: {e}")))
}
