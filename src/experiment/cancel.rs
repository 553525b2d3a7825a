//! Cooperative cancellation
//!
//! A [`CancellationToken`] is handed to every prerequisite and execution call.
//! Cancelling it never pre-empts the running code: the code observes the
//! request at a suspension point ([`CancellationToken::checkpoint`],
//! [`CancellationToken::sleep`]) and returns [`Interrupted`].

use crate::error::Interrupted;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Signal {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// Shared cancellation flag with an interruptible sleep.
///
/// Clones observe the same flag. Cancellation is one-way.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    signal: Arc<Signal>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeper.
    pub fn cancel(&self) {
        let mut cancelled = self.signal.cancelled.lock();
        *cancelled = true;
        self.signal.wakeup.notify_all();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.signal.cancelled.lock()
    }

    /// Explicit suspension point.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] once cancellation has been requested.
    pub fn checkpoint(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] if cancellation is requested before or during
    /// the sleep.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.signal.cancelled.lock();
        while !*cancelled {
            if self
                .signal
                .wakeup
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                return if *cancelled { Err(Interrupted) } else { Ok(()) };
            }
        }
        Err(Interrupted)
    }
}
