//! Per-experiment timeout supervision
//!
//! Each dispatched experiment gets a [`TimeoutSupervisor`] on its own
//! thread. The supervisor enforces the experiment's deadline without relying
//! on the experiment's code: when the deadline passes it concludes the
//! experiment as timed out, then cancels the attempt's token so the body
//! can stop at its next suspension point.

use crate::error::{Error, Result};
use crate::experiment::{CancellationToken, ExperimentRef};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, warn};

/// How a supervision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The attempt finished (in any way) before the deadline
    Finished,
    /// The deadline passed first
    TimedOut,
    /// The supervisor itself was interrupted before the deadline
    Interrupted,
}

#[derive(Debug, Default)]
struct WatchState {
    finished: bool,
    interrupted: bool,
}

#[derive(Debug, Default)]
struct Watch {
    state: Mutex<WatchState>,
    changed: Condvar,
}

/// Handle on the supervising thread of one in-flight experiment.
///
/// Dropping the handle counts as [`finish`](Self::finish).
#[derive(Debug)]
pub struct TimeoutSupervisor {
    watch: Arc<Watch>,
    thread: Option<JoinHandle<Verdict>>,
}

impl TimeoutSupervisor {
    /// Start supervising `experiment`.
    ///
    /// `on_conclude` runs on the supervisor thread after the supervisor has
    /// concluded the experiment itself (timeout or interruption).
    ///
    /// # Errors
    ///
    /// [`Error::ThreadPool`] if the supervisor thread cannot be spawned.
    pub fn spawn<F>(
        experiment: ExperimentRef,
        token: CancellationToken,
        on_conclude: F,
    ) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let watch = Arc::new(Watch::default());
        let shared = Arc::clone(&watch);
        let thread = thread::Builder::new()
            .name(format!("labrun-watch-{}", experiment.id()))
            .spawn(move || {
                let verdict = supervise(&shared, &experiment, &token);
                if verdict != Verdict::Finished {
                    on_conclude();
                }
                verdict
            })
            .map_err(|e| Error::ThreadPool(format!("cannot spawn supervisor: {e}")))?;

        Ok(Self {
            watch,
            thread: Some(thread),
        })
    }

    /// Tell the supervisor the attempt has finished.
    pub fn finish(&self) {
        let mut state = self.watch.state.lock();
        state.finished = true;
        self.watch.changed.notify_all();
    }

    /// Interrupt the supervisor itself: the attempt is cancelled and the
    /// experiment concluded as interrupted (not timed out).
    pub fn interrupt(&self) {
        let mut state = self.watch.state.lock();
        state.interrupted = true;
        self.watch.changed.notify_all();
    }

    /// Wait for the supervisor thread and return its verdict.
    ///
    /// Blocks until the attempt finishes, the deadline passes, or the
    /// supervisor is interrupted.
    #[must_use]
    pub fn join(mut self) -> Verdict {
        self.thread
            .take()
            .and_then(|t| t.join().ok())
            .unwrap_or(Verdict::Finished)
    }
}

impl Drop for TimeoutSupervisor {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.finish();
        }
    }
}

fn supervise(watch: &Watch, experiment: &ExperimentRef, token: &CancellationToken) -> Verdict {
    let timeout = experiment.timeout();
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut state = watch.state.lock();
    loop {
        if state.finished {
            return Verdict::Finished;
        }
        if state.interrupted {
            drop(state);
            if experiment.interrupt(false) {
                debug!(experiment = experiment.id(), "supervisor interrupted");
            }
            token.cancel();
            return Verdict::Interrupted;
        }
        match deadline {
            None => watch.changed.wait(&mut state),
            Some(deadline) => {
                let expired = watch.changed.wait_until(&mut state, deadline).timed_out();
                if expired && !state.finished && !state.interrupted {
                    drop(state);
                    if experiment.interrupt(true) {
                        let timeout_ms = timeout
                            .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
                        warn!(experiment = experiment.id(), timeout_ms, "experiment timed out");
                    }
                    token.cancel();
                    return Verdict::TimedOut;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExperimentError;
    use crate::experiment::{ExecutionContext, Experiment, Status};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn sleeper(ctx: &ExecutionContext<'_>) -> std::result::Result<(), ExperimentError> {
        ctx.sleep(Duration::from_millis(500))?;
        Ok(())
    }

    fn supervised(
        timeout: Duration,
    ) -> (ExperimentRef, CancellationToken, TimeoutSupervisor, Arc<AtomicBool>) {
        let experiment = Experiment::builder(sleeper).timeout(timeout).build_ref();
        let token = CancellationToken::new();
        let concluded = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&concluded);
        let supervisor = TimeoutSupervisor::spawn(Arc::clone(&experiment), token.clone(), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        (experiment, token, supervisor, concluded)
    }

    #[test]
    fn test_deadline_interrupts_and_marks_timeout() {
        let (experiment, token, supervisor, concluded) = supervised(Duration::from_millis(100));

        let result = experiment.run_with(&token);
        supervisor.finish();

        assert!(result.is_err());
        assert_eq!(supervisor.join(), Verdict::TimedOut);
        assert_eq!(experiment.status(), Status::Interrupted { timed_out: true });
        assert!(experiment.timed_out());
        assert!(experiment.end_time().is_some());
        assert!(concluded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_finish_before_deadline() {
        let (experiment, token, supervisor, concluded) = supervised(Duration::from_secs(5));

        experiment.run_with(&token).unwrap();
        supervisor.finish();

        assert_eq!(supervisor.join(), Verdict::Finished);
        assert_eq!(experiment.status(), Status::Done);
        assert!(!token.is_cancelled());
        assert!(!concluded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unlimited_timeout_waits_for_finish() {
        let (experiment, token, supervisor, _) = supervised(Duration::ZERO);
        assert_eq!(experiment.timeout(), None);

        experiment.run_with(&token).unwrap();
        supervisor.finish();

        assert_eq!(supervisor.join(), Verdict::Finished);
        assert_eq!(experiment.status(), Status::Done);
    }

    #[test]
    fn test_interrupted_supervisor_cancels_attempt() {
        let (experiment, token, supervisor, concluded) = supervised(Duration::ZERO);
        let worker = {
            let experiment = Arc::clone(&experiment);
            let token = token.clone();
            thread::spawn(move || experiment.run_with(&token))
        };

        thread::sleep(Duration::from_millis(50));
        supervisor.interrupt();

        assert!(worker.join().unwrap().is_err());
        assert_eq!(supervisor.join(), Verdict::Interrupted);
        assert_eq!(experiment.status(), Status::Interrupted { timed_out: false });
        assert!(token.is_cancelled());
        assert!(concluded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_terminal_status_is_not_overwritten() {
        let experiment = Experiment::builder(sleeper)
            .timeout(Duration::from_millis(20))
            .build_ref();
        assert!(experiment.cancel());
        let supervisor =
            TimeoutSupervisor::spawn(Arc::clone(&experiment), CancellationToken::new(), || {})
                .unwrap();

        assert_eq!(supervisor.join(), Verdict::TimedOut);
        assert_eq!(experiment.status(), Status::Cancelled);
    }
}
