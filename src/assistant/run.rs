//! Handle over one batch of experiments submitted together

use crate::assistant::executor::{Task, WorkerPool};
use crate::error::Result;
use crate::experiment::{ExperimentRef, Status};
use crate::ids::{Dependent, Identifiable};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug)]
struct Progress {
    pending: usize,
    finished_at: Option<Instant>,
}

/// Shared bookkeeping of a run, referenced by its tasks.
pub(crate) struct RunTracker {
    id: u64,
    experiments: Vec<ExperimentRef>,
    /// Pool the run was submitted to; released once the run has settled.
    pool: Mutex<Option<Arc<WorkerPool>>>,
    started_at: Instant,
    progress: Mutex<Progress>,
    settled: Condvar,
    running: Mutex<FxHashMap<u64, Arc<Task>>>,
}

impl RunTracker {
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    /// Record a task as dispatched. Called with the pool queue locked.
    pub(crate) fn register(&self, task: &Arc<Task>) {
        self.running.lock().insert(task.seq(), Arc::clone(task));
    }

    /// Forget a task whose worker has returned.
    pub(crate) fn unregister(&self, seq: u64) {
        self.running.lock().remove(&seq);
    }

    pub(crate) fn running_tasks(&self) -> Vec<Arc<Task>> {
        self.running.lock().values().cloned().collect()
    }

    pub(crate) fn task_settled(&self) {
        let released = {
            let mut progress = self.progress.lock();
            progress.pending = progress.pending.saturating_sub(1);
            if progress.pending > 0 {
                return;
            }
            progress.finished_at.get_or_insert_with(Instant::now);
            let pool = self.pool.lock().take();
            debug!(run = self.id, "run settled");
            self.settled.notify_all();
            pool
        };
        drop(released);
    }
}

/// Handle over one batch of experiments.
///
/// Cheap to clone; every clone observes the same run. [`join`](Self::join)
/// may be called from any number of threads.
#[derive(Clone)]
pub struct AssistantRun {
    inner: Arc<RunTracker>,
}

impl AssistantRun {
    /// Queue `experiments` on `pool` as a new run.
    pub(crate) fn start(id: u64, experiments: Vec<ExperimentRef>, pool: Arc<WorkerPool>) -> Self {
        let pending = experiments.len();
        let inner = Arc::new(RunTracker {
            id,
            experiments,
            pool: Mutex::new((pending > 0).then(|| Arc::clone(&pool))),
            started_at: Instant::now(),
            progress: Mutex::new(Progress {
                pending,
                finished_at: (pending == 0).then(Instant::now),
            }),
            settled: Condvar::new(),
            running: Mutex::new(FxHashMap::default()),
        });
        info!(
            run = id,
            experiments = pending,
            workers = pool.workers(),
            "run enqueued"
        );
        pool.submit(&inner, &inner.experiments);
        Self { inner }
    }

    /// Run ID
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Experiments of this run, in submission order.
    #[must_use]
    pub fn experiments(&self) -> &[ExperimentRef] {
        &self.inner.experiments
    }

    /// Block until every experiment of the run has been accounted for:
    /// finished by its worker, concluded by its supervisor, cancelled by a
    /// hard stop, or withdrawn by a stop.
    pub fn join(&self) {
        let mut progress = self.inner.progress.lock();
        while progress.pending > 0 {
            self.inner.settled.wait(&mut progress);
        }
    }

    /// [`join`](Self::join) with an upper bound; returns whether the run
    /// settled in time.
    #[must_use]
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.inner.progress.lock();
        while progress.pending > 0 {
            if self
                .inner
                .settled
                .wait_until(&mut progress, deadline)
                .timed_out()
            {
                return progress.pending == 0;
            }
        }
        true
    }

    /// Await the run from async code without blocking the runtime.
    ///
    /// # Errors
    ///
    /// [`Error::Other`](crate::Error::Other) if the blocking join task could
    /// not complete.
    #[cfg(feature = "tokio")]
    pub async fn join_async(&self) -> Result<()> {
        let run = self.clone();
        tokio::task::spawn_blocking(move || run.join())
            .await
            .map_err(|e| crate::Error::Other(format!("join task failed: {e}")))
    }

    /// Stop the run.
    ///
    /// Experiments still waiting in the queue are withdrawn and stay as
    /// they are. With `hard`, experiments already dispatched are concluded
    /// as `Cancelled` and their attempt is cancelled; without it they are
    /// left to finish.
    pub fn stop(&self, hard: bool) {
        let pool = self.inner.pool.lock().clone();
        let (withdrawn, running) = match pool {
            Some(pool) => pool.withdraw(&self.inner, hard),
            // Settled: nothing is queued, only stragglers may remain
            None if hard => (Vec::new(), self.inner.running_tasks()),
            None => (Vec::new(), Vec::new()),
        };
        info!(
            run = self.inner.id,
            hard,
            withdrawn = withdrawn.len(),
            cancelled = running.len(),
            "run stop requested"
        );
        for task in withdrawn {
            task.settle();
        }
        for task in running {
            if task.experiment().cancel() {
                debug!(
                    experiment = task.experiment().id(),
                    run = self.inner.id,
                    "experiment cancelled"
                );
            }
            task.token().cancel();
            task.settle();
        }
    }

    /// Whether an experiment of this run is being executed right now.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.running.lock().is_empty()
    }

    /// Whether every experiment has been accounted for (see [`join`](Self::join)).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.progress.lock().pending == 0
    }

    /// Experiments currently dispatched to a worker.
    #[must_use]
    pub fn running_experiments(&self) -> Vec<ExperimentRef> {
        let mut running: Vec<_> = self
            .inner
            .running_tasks()
            .iter()
            .map(|t| Arc::clone(t.experiment()))
            .collect();
        running.sort_by_key(|e| e.id());
        running.dedup_by_key(|e| e.id());
        running
    }

    /// Whether `experiment` belongs to this run and has not started yet.
    #[must_use]
    pub fn is_queued(&self, experiment: &ExperimentRef) -> bool {
        self.inner.experiments.iter().any(|e| e.id() == experiment.id())
            && experiment.status().is_pending()
    }

    /// Mean progression of the run's experiments; 0 for an empty run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progression(&self) -> f32 {
        let experiments = &self.inner.experiments;
        if experiments.is_empty() {
            return 0.0;
        }
        let total: f32 = experiments.iter().map(|e| e.progression()).sum();
        total / experiments.len() as f32
    }

    /// Lowest status among the run's experiments.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::lowest(self.inner.experiments.iter().map(|e| e.status()))
    }

    /// Time since the run was enqueued, frozen once it has settled.
    #[must_use]
    pub fn execution_time(&self) -> Duration {
        let finished_at = self.inner.progress.lock().finished_at;
        finished_at
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.inner.started_at)
    }

    /// Reset every experiment of the run that is not executing.
    ///
    /// # Errors
    ///
    /// The first [`Error::InvalidState`](crate::Error::InvalidState) met;
    /// remaining experiments are still reset.
    pub fn reset(&self) -> Result<()> {
        let mut first_error = None;
        for experiment in &self.inner.experiments {
            if let Err(e) = experiment.reset() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Identifiable for AssistantRun {
    fn id(&self) -> u64 {
        self.inner.id
    }
}

impl Dependent<ExperimentRef> for AssistantRun {
    fn depends_on(&self) -> &[ExperimentRef] {
        &self.inner.experiments
    }
}

impl std::fmt::Debug for AssistantRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantRun")
            .field("id", &self.inner.id)
            .field("experiments", &self.inner.experiments.len())
            .field("pending", &self.inner.progress.lock().pending)
            .finish()
    }
}
