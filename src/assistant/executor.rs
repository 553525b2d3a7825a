//! Bounded FIFO worker pool
//!
//! The pool owns one FIFO queue of tasks and a rayon thread pool of `n`
//! workers. Every submission pushes a task and spawns one FIFO dispatch job;
//! a job pops whatever task is at the head of the queue when it runs. The
//! queue therefore fixes the dispatch order, and tasks that are still queued
//! can be withdrawn (soft stop) without touching the thread pool.
//!
//! Toyota Way Principles:
//! - Heijunka: at most `n` experiments execute at once, whatever the number
//!   of runs feeding the queue
//! - Jidoka: a panicking experiment is caught at the worker boundary and
//!   concluded as failed; the worker survives

use crate::assistant::config::AssistantConfig;
use crate::assistant::run::RunTracker;
use crate::assistant::supervisor::TimeoutSupervisor;
use crate::error::{Error, Result};
use crate::experiment::{CancellationToken, ExperimentRef};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// One queued or in-flight execution of an experiment on behalf of a run.
pub(crate) struct Task {
    seq: u64,
    experiment: ExperimentRef,
    token: CancellationToken,
    run: Arc<RunTracker>,
    settled: AtomicBool,
}

impl Task {
    pub(crate) const fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) const fn experiment(&self) -> &ExperimentRef {
        &self.experiment
    }

    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn run_id(&self) -> u64 {
        self.run.id()
    }

    /// Count this task as finished for its run. Idempotent.
    pub(crate) fn settle(&self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.run.task_settled();
        }
    }

    fn execute(self: &Arc<Self>) {
        let id = self.experiment.id();
        debug!(experiment = id, run = self.run.id(), "experiment dispatched");

        let supervisor = {
            let task = Arc::clone(self);
            TimeoutSupervisor::spawn(Arc::clone(&self.experiment), self.token.clone(), move || {
                task.settle();
            })
        };
        let supervisor = match supervisor {
            Ok(supervisor) => Some(supervisor),
            Err(e) => {
                warn!(experiment = id, error = %e, "running without timeout supervision");
                None
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| self.experiment.run_with(&self.token))) {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                debug!(
                    experiment = id,
                    status = %self.experiment.status(),
                    "attempt ended on interruption"
                );
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(experiment = id, panic = %message, "experiment panicked");
                self.experiment.fail(format!("panicked: {message}"));
            }
        }

        if let Some(supervisor) = supervisor {
            supervisor.finish();
        }
        self.run.unregister(self.seq);
        self.settle();
        debug!(experiment = id, status = %self.experiment.status(), "experiment finished");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Shared FIFO queue drained by a fixed number of workers.
pub(crate) struct WorkerPool {
    workers: usize,
    pool: rayon::ThreadPool,
    queue: Arc<Mutex<VecDeque<Arc<Task>>>>,
    next_seq: AtomicU64,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Build a pool with the configured number of workers.
    pub(crate) fn new(config: &AssistantConfig) -> Result<Self> {
        let workers = config.executor.validate()?.get();
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .panic_handler(|payload| {
                warn!(panic = %panic_message(payload.as_ref()), "worker job panicked");
            })
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        debug!(workers, "worker pool started");
        Ok(Self {
            workers,
            pool,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            next_seq: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of workers
    pub(crate) const fn workers(&self) -> usize {
        self.workers
    }

    /// Number of experiments currently executing.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of tasks waiting for a worker.
    pub(crate) fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Observer of this pool that does not keep it alive.
    pub(crate) fn monitor(self: &Arc<Self>) -> PoolMonitor {
        PoolMonitor {
            pool: Arc::downgrade(self),
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Queue `experiments` in order on behalf of `run`.
    pub(crate) fn submit(&self, run: &Arc<RunTracker>, experiments: &[ExperimentRef]) {
        {
            let mut queue = self.queue.lock();
            for experiment in experiments {
                queue.push_back(Arc::new(Task {
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    experiment: Arc::clone(experiment),
                    token: CancellationToken::new(),
                    run: Arc::clone(run),
                    settled: AtomicBool::new(false),
                }));
            }
        }
        for _ in experiments {
            let queue = Arc::clone(&self.queue);
            let in_flight = Arc::clone(&self.in_flight);
            self.pool.spawn_fifo(move || dispatch_next(&queue, &in_flight));
        }
    }

    /// Remove the queued tasks of `run_id` and snapshot its in-flight tasks,
    /// atomically with respect to dispatch.
    pub(crate) fn withdraw(
        &self,
        run: &RunTracker,
        include_running: bool,
    ) -> (Vec<Arc<Task>>, Vec<Arc<Task>>) {
        let mut queue = self.queue.lock();
        let (withdrawn, kept): (VecDeque<_>, VecDeque<_>) =
            queue.drain(..).partition(|t| t.run_id() == run.id());
        *queue = kept;
        let running = if include_running {
            run.running_tasks()
        } else {
            Vec::new()
        };
        drop(queue);
        (withdrawn.into_iter().collect(), running)
    }
}

/// Watches a replaced pool until its last experiment has returned.
pub(crate) struct PoolMonitor {
    pool: Weak<WorkerPool>,
    in_flight: Arc<AtomicUsize>,
}

impl PoolMonitor {
    /// Number of experiments still executing on the pool's threads.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether the pool was dropped and none of its workers is busy.
    ///
    /// A dropped pool has no unsettled run left, so nothing can be
    /// dispatched on it anymore.
    pub(crate) fn is_retired(&self) -> bool {
        self.pool.strong_count() == 0 && self.in_flight() == 0
    }
}

/// Body of one dispatch job: pop the head of the queue and execute it.
fn dispatch_next(queue: &Mutex<VecDeque<Arc<Task>>>, in_flight: &AtomicUsize) {
    let task = {
        let mut queue = queue.lock();
        let Some(task) = queue.pop_front() else {
            return;
        };
        task.run.register(&task);
        task
    };
    in_flight.fetch_add(1, Ordering::SeqCst);
    task.execute();
    in_flight.fetch_sub(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::config::ExecutorConfig;

    #[test]
    fn test_pool_width_follows_config() {
        let config = AssistantConfig {
            executor: ExecutorConfig::PooledWorkers(3),
            ..AssistantConfig::default()
        };
        let pool = WorkerPool::new(&config).unwrap();
        assert_eq!(pool.workers(), 3);
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_zero_width_pool_rejected() {
        let config = AssistantConfig {
            executor: ExecutorConfig::PooledWorkers(0),
            ..AssistantConfig::default()
        };
        assert!(matches!(
            WorkerPool::new(&config),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_monitor_outlives_pool() {
        let pool = Arc::new(WorkerPool::new(&AssistantConfig::default()).unwrap());
        let monitor = pool.monitor();
        assert_eq!(monitor.in_flight(), 0);
        assert!(!monitor.is_retired());

        pool.in_flight.fetch_add(1, Ordering::SeqCst);
        drop(pool);
        assert!(!monitor.is_retired());
        monitor.in_flight.fetch_sub(1, Ordering::SeqCst);
        assert!(monitor.is_retired());
    }

    #[test]
    fn test_panic_message_extraction() {
        let from_str: Box<dyn Any + Send> = Box::new("boom");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(from_str.as_ref()), "boom");
        assert_eq!(panic_message(from_string.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
