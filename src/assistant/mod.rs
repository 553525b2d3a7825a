//! Assistant: dispatches experiments onto a bounded worker pool
//!
//! ## Architecture
//!
//! ```text
//! enqueue(batch) ──> AssistantRun ──> WorkerPool FIFO queue ──> n workers
//!                                                                  │
//!                                  TimeoutSupervisor (one per in-flight experiment)
//! ```
//!
//! Batches interleave at the granularity of single experiments: there is
//! no barrier between runs, but an experiment is never dispatched before
//! one queued ahead of it.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use trueno_lab::assistant::{Assistant, ExecutorConfig};
//! use trueno_lab::experiment::{ExecutionContext, Experiment, Status};
//! use trueno_lab::error::ExperimentError;
//!
//! fn nap(ctx: &ExecutionContext<'_>) -> Result<(), ExperimentError> {
//!     ctx.sleep(Duration::from_millis(10))?;
//!     Ok(())
//! }
//!
//! let assistant = Assistant::builder()
//!     .executor(ExecutorConfig::PooledWorkers(2))
//!     .build()?;
//! let a = Experiment::builder(nap).build_ref();
//! let b = Experiment::builder(nap).build_ref();
//!
//! let run = assistant.enqueue([a.clone(), b.clone()]);
//! run.join();
//!
//! assert_eq!(a.status(), Status::Done);
//! assert_eq!(run.status(), Status::Done);
//! # Ok::<(), trueno_lab::Error>(())
//! ```

mod config;
mod executor;
mod run;
mod supervisor;

pub use config::{AssistantConfig, ExecutorConfig, DEFAULT_THREAD_PREFIX};
pub use run::AssistantRun;
pub use supervisor::{TimeoutSupervisor, Verdict};

use crate::error::Result;
use crate::experiment::{ExperimentGroup, ExperimentRef};
use crate::ids::IdGenerator;
use crate::schedule::Scheduler;
use dashmap::DashMap;
use executor::{PoolMonitor, WorkerPool};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// ID of the group returned by [`Assistant::queue_group`]
pub const QUEUE_GROUP_ID: u64 = 999;

/// Scheduler owning a worker pool, its runs and a staging queue.
pub struct Assistant {
    config: RwLock<AssistantConfig>,
    pool: RwLock<Arc<WorkerPool>>,
    replaced: Mutex<Vec<PoolMonitor>>,
    runs: DashMap<u64, AssistantRun>,
    staging: Mutex<Vec<ExperimentRef>>,
}

impl Assistant {
    /// Assistant with a single worker.
    ///
    /// # Errors
    ///
    /// [`Error::ThreadPool`](crate::Error::ThreadPool) if the worker cannot
    /// be started.
    pub fn new() -> Result<Self> {
        Self::with_config(AssistantConfig::default())
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }

    /// Assistant from a full configuration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`](crate::Error::InvalidInput) for an invalid
    /// configuration, [`Error::ThreadPool`](crate::Error::ThreadPool) if the
    /// workers cannot be started.
    pub fn with_config(config: AssistantConfig) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(&config)?;
        info!(workers = pool.workers(), "assistant started");
        Ok(Self {
            config: RwLock::new(config),
            pool: RwLock::new(Arc::new(pool)),
            replaced: Mutex::new(Vec::new()),
            runs: DashMap::new(),
            staging: Mutex::new(Vec::new()),
        })
    }

    /// Current worker pool shape.
    #[must_use]
    pub fn executor(&self) -> ExecutorConfig {
        self.config.read().executor
    }

    /// Switch to a new worker pool for runs enqueued from now on.
    ///
    /// Runs already enqueued finish on the pool they were submitted to.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`](crate::Error::InvalidInput) for a zero-width
    /// pool, [`Error::ThreadPool`](crate::Error::ThreadPool) if the workers
    /// cannot be started.
    pub fn set_executor(&self, executor: ExecutorConfig) -> Result<()> {
        let mut config = self.config.write();
        let next = AssistantConfig {
            executor,
            ..config.clone()
        };
        let pool = WorkerPool::new(&next)?;
        let previous = std::mem::replace(&mut *self.pool.write(), Arc::new(pool));
        // Unsettled runs keep the previous pool alive until they settle
        self.replaced.lock().push(previous.monitor());
        *config = next;
        info!(workers = executor.workers(), "executor replaced");
        Ok(())
    }

    /// Experiments executing on the current pool right now.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pool.read().in_flight()
    }

    /// Experiments waiting for a worker of the current pool.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.pool.read().queued()
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Queue `experiments`, in order, as a new run; returns immediately.
    pub fn enqueue(&self, experiments: impl IntoIterator<Item = ExperimentRef>) -> AssistantRun {
        let pool = Arc::clone(&self.pool.read());
        let run = AssistantRun::start(
            IdGenerator::runs().next_id(),
            experiments.into_iter().collect(),
            pool,
        );
        self.runs.insert(run.id(), run.clone());
        run
    }

    /// Whether a worker is executing an experiment.
    ///
    /// Counts deleted runs and replaced pools too: a body that ignores its
    /// cancellation keeps its worker busy after a hard stop.
    #[must_use]
    pub fn is_running(&self) -> bool {
        if self.pool.read().in_flight() > 0 {
            return true;
        }
        let mut replaced = self.replaced.lock();
        replaced.retain(|monitor| !monitor.is_retired());
        replaced.iter().any(|monitor| monitor.in_flight() > 0)
            || self.runs.iter().any(|entry| entry.value().is_running())
    }

    /// All runs, oldest first.
    #[must_use]
    pub fn runs(&self) -> Vec<AssistantRun> {
        let mut runs: Vec<_> = self.runs.iter().map(|entry| entry.value().clone()).collect();
        runs.sort_by_key(AssistantRun::id);
        runs
    }

    /// Run with the given ID.
    #[must_use]
    pub fn run(&self, id: u64) -> Option<AssistantRun> {
        self.runs.get(&id).map(|entry| entry.value().clone())
    }

    /// Hard-stop a run and forget it; returns whether it existed.
    pub fn delete_run(&self, id: u64) -> bool {
        match self.runs.remove(&id) {
            Some((_, run)) => {
                run.stop(true);
                info!(run = id, "run deleted");
                true
            }
            None => false,
        }
    }

    /// Whether `experiment` waits in some run without having started.
    #[must_use]
    pub fn is_queued(&self, experiment: &ExperimentRef) -> bool {
        self.runs.iter().any(|entry| entry.value().is_queued(experiment))
    }

    /// Sum of the execution times of all runs.
    #[must_use]
    pub fn execution_time(&self) -> Duration {
        self.runs
            .iter()
            .map(|entry| entry.value().execution_time())
            .sum()
    }

    // ========================================================================
    // Staging queue
    // ========================================================================

    /// Stage experiments for a later run; returns how many were new.
    pub fn add_to_queue<'a>(
        &self,
        experiments: impl IntoIterator<Item = &'a ExperimentRef>,
    ) -> usize {
        let mut staging = self.staging.lock();
        let mut added = 0;
        for experiment in experiments {
            if !staging.iter().any(|e| e.id() == experiment.id()) {
                staging.push(Arc::clone(experiment));
                added += 1;
            }
        }
        added
    }

    /// Unstage experiments; returns how many were staged.
    pub fn remove_from_queue<'a>(
        &self,
        experiments: impl IntoIterator<Item = &'a ExperimentRef>,
    ) -> usize {
        let mut staging = self.staging.lock();
        let mut removed = 0;
        for experiment in experiments {
            if let Some(pos) = staging.iter().position(|e| e.id() == experiment.id()) {
                staging.remove(pos);
                removed += 1;
            }
        }
        removed
    }

    /// Snapshot of the staging queue.
    #[must_use]
    pub fn queue(&self) -> Vec<ExperimentRef> {
        self.staging.lock().clone()
    }

    /// Staging queue as a group with ID [`QUEUE_GROUP_ID`].
    #[must_use]
    pub fn queue_group(&self) -> ExperimentGroup {
        let mut group = ExperimentGroup::with_id("queue", QUEUE_GROUP_ID);
        group.extend(self.staging.lock().iter());
        group
    }

    /// Reorder (or subset) the staging queue with `scheduler`.
    pub fn apply<S>(&self, scheduler: &mut S) -> &Self
    where
        S: Scheduler<ExperimentRef> + ?Sized,
    {
        let mut staging = self.staging.lock();
        let scheduled = scheduler.schedule(&staging);
        *staging = scheduled;
        self
    }

    /// Commit the staging queue as a new run and clear it.
    pub fn enqueue_queued(&self) -> AssistantRun {
        let staged = std::mem::take(&mut *self.staging.lock());
        self.enqueue(staged)
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("executor", &self.executor())
            .field("runs", &self.runs.len())
            .field("staged", &self.staging.lock().len())
            .finish()
    }
}

/// Builder for [`Assistant`]
#[derive(Debug, Clone, Default)]
pub struct AssistantBuilder {
    config: AssistantConfig,
}

impl AssistantBuilder {
    /// Worker pool shape.
    #[must_use]
    pub const fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.config.executor = executor;
        self
    }

    /// Prefix of worker thread names.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Start the assistant.
    ///
    /// # Errors
    ///
    /// See [`Assistant::with_config`].
    pub fn build(self) -> Result<Assistant> {
        Assistant::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExperimentError;
    use crate::experiment::{ExecutionContext, Experiment, Status};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn noop(_: &ExecutionContext<'_>) -> std::result::Result<(), ExperimentError> {
        Ok(())
    }

    fn experiments(n: usize) -> Vec<ExperimentRef> {
        let ids = IdGenerator::new();
        (0..n)
            .map(|_| Experiment::builder(noop).ids(&ids).build_ref())
            .collect()
    }

    /// Waits until its gate opens.
    struct Gated(Arc<AtomicBool>);

    impl crate::experiment::Execution for Gated {
        fn execute(&self, _: &ExecutionContext<'_>) -> std::result::Result<(), ExperimentError> {
            while !self.0.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    /// Reverses its input.
    struct Reverse;

    impl Scheduler<ExperimentRef> for Reverse {
        fn schedule(&mut self, items: &[ExperimentRef]) -> Vec<ExperimentRef> {
            items.iter().rev().cloned().collect()
        }
    }

    #[test]
    fn test_staging_queue_without_duplicates() {
        let assistant = Assistant::new().unwrap();
        let exps = experiments(3);

        assert_eq!(assistant.add_to_queue(&exps), 3);
        assert_eq!(assistant.add_to_queue(&exps[..1]), 0);
        assert_eq!(assistant.remove_from_queue(&exps[1..2]), 1);
        assert_eq!(assistant.remove_from_queue(&exps[1..2]), 0);

        let queued: Vec<u64> = assistant.queue().iter().map(|e| e.id()).collect();
        assert_eq!(queued, vec![1, 3]);

        let group = assistant.queue_group();
        assert_eq!(crate::ids::Identifiable::id(&group), QUEUE_GROUP_ID);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_apply_and_enqueue_queued() {
        let assistant = Assistant::new().unwrap();
        let exps = experiments(3);
        assistant.add_to_queue(&exps);

        let order: Vec<u64> = assistant
            .apply(&mut Reverse)
            .queue()
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(order, vec![3, 2, 1]);

        let run = assistant.enqueue_queued();
        assert!(assistant.queue().is_empty());
        run.join();

        let run_order: Vec<u64> = run.experiments().iter().map(|e| e.id()).collect();
        assert_eq!(run_order, vec![3, 2, 1]);
        assert!(exps.iter().all(|e| e.status() == Status::Done));
    }

    #[test]
    fn test_run_registry() {
        let assistant = Assistant::new().unwrap();
        let first = assistant.enqueue(experiments(1));
        let second = assistant.enqueue(experiments(2));
        first.join();
        second.join();

        let ids: Vec<u64> = assistant.runs().iter().map(AssistantRun::id).collect();
        assert_eq!(ids, vec![first.id(), second.id()]);
        assert!(assistant.run(second.id()).is_some());

        assert!(assistant.delete_run(first.id()));
        assert!(!assistant.delete_run(first.id()));
        assert!(assistant.run(first.id()).is_none());
        assert_eq!(assistant.runs().len(), 1);
    }

    #[test]
    fn test_empty_run_is_settled() {
        let assistant = Assistant::new().unwrap();
        let run = assistant.enqueue(Vec::new());
        assert!(run.is_settled());
        run.join();
        assert_eq!(assistant.in_flight(), 0);
        assert_eq!(assistant.waiting(), 0);
        assert_eq!(run.status(), Status::Done);
        assert!(run.progression().abs() < f32::EPSILON);
    }

    #[test]
    fn test_set_executor() {
        let assistant = Assistant::builder()
            .thread_name_prefix("lab")
            .build()
            .unwrap();
        assert_eq!(assistant.executor(), ExecutorConfig::SingleWorker);

        assistant
            .set_executor(ExecutorConfig::PooledWorkers(2))
            .unwrap();
        assert_eq!(assistant.executor(), ExecutorConfig::PooledWorkers(2));

        assert!(assistant
            .set_executor(ExecutorConfig::PooledWorkers(0))
            .is_err());
        assert_eq!(assistant.executor(), ExecutorConfig::PooledWorkers(2));
    }

    #[test]
    fn test_settled_run_releases_replaced_pool() {
        let assistant = Assistant::new().unwrap();
        let run = assistant.enqueue(experiments(2));
        run.join();

        let previous = Arc::downgrade(&assistant.pool.read());
        assistant
            .set_executor(ExecutorConfig::PooledWorkers(2))
            .unwrap();

        // The registry still holds the run, but not its pool
        assert!(assistant.run(run.id()).is_some());
        assert_eq!(previous.strong_count(), 0);
    }

    #[test]
    fn test_unsettled_run_keeps_replaced_pool() {
        let assistant = Assistant::new().unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let held = Experiment::builder(Gated(Arc::clone(&gate)))
            .ids(&IdGenerator::new())
            .build_ref();
        let run = assistant.enqueue([held]);

        let previous = Arc::downgrade(&assistant.pool.read());
        assistant.set_executor(ExecutorConfig::SingleWorker).unwrap();
        assert!(previous.strong_count() > 0);

        gate.store(true, Ordering::SeqCst);
        run.join();
        assert_eq!(previous.strong_count(), 0);
    }
}
