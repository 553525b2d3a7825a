//! Experiment state machine
//!
//! An [`Experiment`] owns the lifecycle bookkeeping (status, timestamps,
//! progression, parameters) and delegates the actual work to a
//! user-supplied [`Execution`] strategy.
//!
//! Toyota Way Principles:
//! - Jidoka: every terminal transition is a compare-and-set, so the first
//!   terminal write wins and later writers become no-ops
//! - Poka-Yoke: an interruption carries its cause in the status itself;
//!   no separate flag can disagree with it

use crate::error::{Error, ExperimentError, Interrupted, Result};
use crate::experiment::cancel::CancellationToken;
use crate::experiment::params::{ParameterMap, ParameterStore, Value};
use crate::experiment::state::ExperimentState;
use crate::experiment::status::Status;
use crate::ids::{Dependent, IdGenerator, Identifiable};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared handle on an experiment, as held by runs, groups and schedulers.
pub type ExperimentRef = Arc<Experiment>;

/// The work an experiment performs.
///
/// Only [`execute`](Self::execute) is required. Implementations that need
/// one-time setup override [`prerequisites_fulfilled`](Self::prerequisites_fulfilled)
/// and [`fulfill_prerequisites`](Self::fulfill_prerequisites); both take
/// `&self`, so fulfilment state lives behind interior mutability.
///
/// Long-running code should call [`ExecutionContext::checkpoint`] or
/// [`ExecutionContext::sleep`] regularly and propagate the resulting
/// [`Interrupted`] with `?`.
pub trait Execution: Send + Sync {
    /// Run the experiment body.
    ///
    /// # Errors
    ///
    /// [`ExperimentError::Failed`] for a domain failure,
    /// [`ExperimentError::Interrupted`] when cancellation was observed.
    fn execute(&self, ctx: &ExecutionContext<'_>) -> std::result::Result<(), ExperimentError>;

    /// Whether the experiment can run without a setup step.
    fn prerequisites_fulfilled(&self) -> bool {
        true
    }

    /// Perform the one-time setup step.
    ///
    /// # Errors
    ///
    /// Same contract as [`execute`](Self::execute).
    fn fulfill_prerequisites(
        &self,
        _ctx: &ExecutionContext<'_>,
    ) -> std::result::Result<(), ExperimentError> {
        Ok(())
    }

    /// Undo whatever [`fulfill_prerequisites`](Self::fulfill_prerequisites) produced.
    fn clean_prerequisites(&self) {}

    /// Clear body-specific state when the experiment is reset.
    fn on_reset(&self) {}

    /// Default human-readable description.
    fn description(&self) -> Option<String> {
        None
    }

    /// Body-specific keys to persist alongside the base record.
    fn save_extension(&self) -> Option<serde_json::Value> {
        None
    }

    /// Restore body-specific keys from a persisted record.
    ///
    /// # Errors
    ///
    /// [`Error::Persistence`] if the extension is absent or ill-shaped.
    fn load_extension(&mut self, _extension: Option<&serde_json::Value>) -> Result<()> {
        Ok(())
    }
}

impl<F> Execution for F
where
    F: Fn(&ExecutionContext<'_>) -> std::result::Result<(), ExperimentError> + Send + Sync,
{
    fn execute(&self, ctx: &ExecutionContext<'_>) -> std::result::Result<(), ExperimentError> {
        self(ctx)
    }
}

/// What the body sees while it runs: parameters, progression and the
/// cancellation token of the current attempt.
pub struct ExecutionContext<'a> {
    experiment: &'a Experiment,
    token: &'a CancellationToken,
}

impl<'a> ExecutionContext<'a> {
    const fn new(experiment: &'a Experiment, token: &'a CancellationToken) -> Self {
        Self { experiment, token }
    }

    /// ID of the running experiment.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.experiment.id
    }

    /// The running experiment.
    #[must_use]
    pub const fn experiment(&self) -> &'a Experiment {
        self.experiment
    }

    /// Read a parameter (inputs first, then outputs).
    #[must_use]
    pub fn read(&self, key: &str) -> Option<Value> {
        self.experiment.read(key)
    }

    /// Write an output parameter.
    pub fn write(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.experiment.params.write_output(key, value);
    }

    /// Report progression; clamped to `[0, 1]`.
    pub fn set_progression(&self, progression: f32) {
        self.experiment.set_progression(progression);
    }

    /// Explicit suspension point.
    ///
    /// # Errors
    ///
    /// [`Interrupted`] once cancellation has been requested.
    pub fn checkpoint(&self) -> std::result::Result<(), Interrupted> {
        self.token.checkpoint()
    }

    /// Interruptible sleep.
    ///
    /// # Errors
    ///
    /// [`Interrupted`] if cancellation arrives before the duration elapses.
    pub fn sleep(&self, duration: Duration) -> std::result::Result<(), Interrupted> {
        self.token.sleep(duration)
    }

    /// Cancellation token of the current attempt.
    #[must_use]
    pub const fn token(&self) -> &'a CancellationToken {
        self.token
    }
}

#[derive(Debug, Clone)]
struct Lifecycle {
    status: Status,
    start: Option<DateTime<Utc>>,
    prerequisites: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    progression: f32,
    error: Option<String>,
}

impl Lifecycle {
    const fn initial(prerequisites_fulfilled: bool) -> Self {
        Self {
            status: if prerequisites_fulfilled {
                Status::Ready
            } else {
                Status::Uninitialized
            },
            start: None,
            prerequisites: None,
            end: None,
            progression: 0.0,
            error: None,
        }
    }

    /// Move to a terminal status unless one was already reached.
    fn conclude(&mut self, status: Status, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        let end = *self.end.get_or_insert(now);
        if self.prerequisites.is_none() && self.start.is_some() {
            self.prerequisites = Some(end);
        }
        self.status = status;
        self.error = error;
        true
    }
}

enum Preparation {
    Fulfilled,
    Stopped,
}

/// One schedulable unit of work.
pub struct Experiment {
    id: u64,
    body: Box<dyn Execution>,
    params: ParameterStore,
    lifecycle: Mutex<Lifecycle>,
    timeout: RwLock<Option<Duration>>,
    time_ratio: f32,
    description: String,
    dependencies: Vec<ExperimentRef>,
}

impl Experiment {
    /// Start building an experiment around `body`.
    pub fn builder(body: impl Execution + 'static) -> ExperimentBuilder {
        ExperimentBuilder::new(Box::new(body))
    }

    /// Experiment with default settings and an ID from the process-wide generator.
    pub fn new(body: impl Execution + 'static) -> Self {
        Self::builder(body).build()
    }

    // ========================================================================
    // Identity and configuration
    // ========================================================================

    /// Experiment ID
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Wall-clock limit; `None` means unlimited.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.read()
    }

    /// Change the wall-clock limit for future runs; zero means unlimited.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = (!timeout.is_zero()).then_some(timeout);
    }

    /// Relative expected cost of this experiment.
    #[must_use]
    pub const fn time_ratio(&self) -> f32 {
        self.time_ratio
    }

    /// Experiments this one depends on, sorted by ID.
    #[must_use]
    pub fn dependencies(&self) -> &[ExperimentRef] {
        &self.dependencies
    }

    // ========================================================================
    // Lifecycle observation
    // ========================================================================

    /// Current status.
    ///
    /// An `Uninitialized` experiment whose prerequisites have become
    /// fulfilled in the meantime is reported (and recorded) as `Ready`.
    #[must_use]
    pub fn status(&self) -> Status {
        let status = self.lifecycle.lock().status;
        if status != Status::Uninitialized || !self.body.prerequisites_fulfilled() {
            return status;
        }
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.status == Status::Uninitialized {
            lifecycle.status = Status::Ready;
        }
        lifecycle.status
    }

    /// Whether the experiment ended because its deadline passed.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.lifecycle.lock().status.timed_out()
    }

    /// Whether the experiment reached a terminal status.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lifecycle.lock().status.is_terminal()
    }

    /// When the last run started.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.lock().start
    }

    /// When prerequisites were fulfilled during the last run.
    #[must_use]
    pub fn prerequisites_time(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.lock().prerequisites
    }

    /// When the last run ended.
    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.lock().end
    }

    /// Reported progression in `[0, 1]`.
    #[must_use]
    pub fn progression(&self) -> f32 {
        self.lifecycle.lock().progression
    }

    /// Message of the failure that made the experiment `Failed`.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lifecycle.lock().error.clone()
    }

    /// Time spent so far: end minus start once finished, now minus start
    /// while running, zero if never started.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        let lifecycle = self.lifecycle.lock();
        let Some(start) = lifecycle.start else {
            return Duration::ZERO;
        };
        let end = lifecycle.end.unwrap_or_else(Utc::now);
        (end - start).to_std().unwrap_or_default()
    }

    fn set_progression(&self, progression: f32) {
        if progression.is_nan() {
            return;
        }
        self.lifecycle.lock().progression = progression.clamp(0.0, 1.0);
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Read a parameter (inputs first, then outputs).
    #[must_use]
    pub fn read(&self, key: &str) -> Option<Value> {
        self.params.read(key)
    }

    /// Read a text parameter.
    #[must_use]
    pub fn read_string(&self, key: &str) -> Option<String> {
        self.read(key).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Read a numeric parameter; 0 if absent or not numeric.
    #[must_use]
    pub fn read_float(&self, key: &str) -> f64 {
        self.read(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    /// Read an integer parameter; 0 if absent or not numeric.
    #[must_use]
    pub fn read_int(&self, key: &str) -> i64 {
        self.read(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    /// Set an input parameter.
    pub fn write_input(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.write_input(key, value);
    }

    /// Set an output parameter from outside the body.
    pub fn write_output(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.write_output(key, value);
    }

    /// Snapshot of the inputs.
    #[must_use]
    pub fn inputs(&self) -> ParameterMap {
        self.params.inputs()
    }

    /// Snapshot of the outputs.
    #[must_use]
    pub fn outputs(&self) -> ParameterMap {
        self.params.outputs()
    }

    /// Attach a description to a parameter.
    pub fn describe(&self, key: impl Into<String>, description: impl Into<String>) {
        self.params.describe(key, description);
    }

    /// Description of a parameter, empty if none.
    #[must_use]
    pub fn parameter_description(&self, key: &str) -> String {
        self.params.description(key)
    }

    /// Number of data points produced: one per output parameter.
    #[must_use]
    pub fn count_data_points(&self) -> usize {
        self.params.output_count()
    }

    // ========================================================================
    // Running
    // ========================================================================

    /// Whether the body can run without its setup step.
    #[must_use]
    pub fn prerequisites_fulfilled(&self) -> bool {
        self.body.prerequisites_fulfilled()
    }

    /// Run the experiment with a private cancellation token.
    ///
    /// # Errors
    ///
    /// See [`run_with`](Self::run_with).
    pub fn run(&self) -> std::result::Result<(), Interrupted> {
        self.run_with(&CancellationToken::new())
    }

    /// Run the experiment, observing `token` for cancellation.
    ///
    /// Does nothing unless the experiment is `Ready` or `Uninitialized`.
    /// Domain failures and interruptions of the setup step end in a terminal
    /// status. An interruption returned by the body is not converted: the
    /// status is left to whoever requested the cancellation, and stays
    /// `Running` if nobody concludes it.
    ///
    /// # Errors
    ///
    /// [`Interrupted`] when the body returned an interruption.
    pub fn run_with(&self, token: &CancellationToken) -> std::result::Result<(), Interrupted> {
        let needs_prerequisites = !self.body.prerequisites_fulfilled();
        let prepare = {
            let mut lifecycle = self.lifecycle.lock();
            let now = Utc::now();
            match lifecycle.status {
                Status::Uninitialized if needs_prerequisites => {
                    lifecycle.start = Some(now);
                    lifecycle.status = Status::Running;
                    true
                }
                Status::Uninitialized | Status::Ready => {
                    lifecycle.start = Some(now);
                    lifecycle.prerequisites = Some(now);
                    lifecycle.status = Status::Running;
                    false
                }
                _ => return Ok(()),
            }
        };
        debug!(experiment = self.id, "experiment started");

        if prepare {
            if let Preparation::Stopped = self.prepare(token) {
                return Ok(());
            }
        }

        let ctx = ExecutionContext::new(self, token);
        match self.body.execute(&ctx) {
            Ok(()) => {
                let mut lifecycle = self.lifecycle.lock();
                if lifecycle.status == Status::Running {
                    lifecycle.status = Status::Done;
                    lifecycle.end = Some(Utc::now());
                    lifecycle.progression = 1.0;
                }
                debug!(experiment = self.id, status = %lifecycle.status, "experiment finished");
            }
            Err(ExperimentError::Failed(e)) => {
                if self
                    .lifecycle
                    .lock()
                    .conclude(Status::Failed, Some(format!("{e:#}")))
                {
                    debug!(experiment = self.id, error = %e, "experiment failed");
                }
            }
            Err(ExperimentError::Interrupted(interrupted)) => {
                debug!(experiment = self.id, "execution interrupted");
                return Err(interrupted);
            }
        }
        Ok(())
    }

    /// Run the setup step outside of [`run`](Self::run).
    ///
    /// Applies the same outcomes as a run: success makes the experiment
    /// `Ready`, a failure makes it `Failed`, an interruption makes it
    /// `Interrupted`. Returns the resulting status.
    pub fn fulfill_prerequisites(&self) -> Status {
        if self.body.prerequisites_fulfilled() {
            return self.status();
        }
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.status != Status::Uninitialized {
                return lifecycle.status;
            }
            lifecycle.start = Some(Utc::now());
            lifecycle.status = Status::Running;
        }
        if let Preparation::Fulfilled = self.prepare(&CancellationToken::new()) {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.status == Status::Running {
                *lifecycle = Lifecycle::initial(true);
            }
        }
        self.status()
    }

    /// Undo the setup step; the experiment needs it again on its next run.
    pub fn clean_prerequisites(&self) {
        self.body.clean_prerequisites();
        if self.body.prerequisites_fulfilled() {
            return;
        }
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.status == Status::Ready {
            lifecycle.status = Status::Uninitialized;
        }
    }

    fn prepare(&self, token: &CancellationToken) -> Preparation {
        let ctx = ExecutionContext::new(self, token);
        let outcome = self.body.fulfill_prerequisites(&ctx);
        let mut lifecycle = self.lifecycle.lock();
        let now = Utc::now();
        match outcome {
            Ok(()) if lifecycle.status == Status::Running => {
                lifecycle.prerequisites = Some(now);
                Preparation::Fulfilled
            }
            Ok(()) => Preparation::Stopped,
            Err(ExperimentError::Failed(e)) => {
                if lifecycle.conclude(Status::Failed, Some(format!("{e:#}"))) {
                    debug!(experiment = self.id, error = %e, "prerequisites failed");
                }
                Preparation::Stopped
            }
            Err(ExperimentError::Interrupted(_)) => {
                if lifecycle.conclude(Status::Interrupted { timed_out: false }, None) {
                    debug!(experiment = self.id, "prerequisites interrupted");
                }
                Preparation::Stopped
            }
        }
    }

    /// Conclude as interrupted unless already terminal.
    pub(crate) fn interrupt(&self, timed_out: bool) -> bool {
        self.lifecycle
            .lock()
            .conclude(Status::Interrupted { timed_out }, None)
    }

    /// Conclude as cancelled unless already terminal.
    pub(crate) fn cancel(&self) -> bool {
        self.lifecycle.lock().conclude(Status::Cancelled, None)
    }

    /// Conclude as failed unless already terminal.
    pub(crate) fn fail(&self, message: impl Into<String>) -> bool {
        self.lifecycle
            .lock()
            .conclude(Status::Failed, Some(message.into()))
    }

    /// Return to the initial status, keeping inputs and discarding outputs.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the experiment is running.
    pub fn reset(&self) -> Result<()> {
        let fulfilled = self.body.prerequisites_fulfilled();
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.status == Status::Running {
                return Err(Error::InvalidState {
                    id: self.id,
                    status: lifecycle.status.to_string(),
                });
            }
            *lifecycle = Lifecycle::initial(fulfilled);
        }
        self.params.clear_outputs();
        self.body.on_reset();
        debug!(experiment = self.id, "experiment reset");
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Capture the experiment as a versioned record.
    #[must_use]
    pub fn save_state(&self) -> ExperimentState {
        let lifecycle = self.lifecycle.lock().clone();
        ExperimentState {
            version: ExperimentState::VERSION,
            id: self.id,
            status: lifecycle.status,
            start: lifecycle.start,
            prerequisites: lifecycle.prerequisites,
            end: lifecycle.end,
            progression: lifecycle.progression,
            timeout_ms: self
                .timeout()
                .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            time_ratio: self.time_ratio,
            error: lifecycle.error,
            input: self.params.inputs(),
            output: self.params.outputs(),
            extension: self.body.save_extension(),
        }
    }

    /// Overwrite this experiment with a previously saved record.
    ///
    /// Meant for a freshly built instance whose body matches the one that
    /// produced the record.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedVersion`] for a record from a newer format, or
    /// whatever the body's extension loader reports.
    pub fn load_state(&mut self, state: ExperimentState) -> Result<()> {
        if state.version > ExperimentState::VERSION {
            return Err(Error::UnsupportedVersion {
                found: state.version,
                supported: ExperimentState::VERSION,
            });
        }
        self.body.load_extension(state.extension.as_ref())?;
        self.id = state.id;
        self.time_ratio = state.time_ratio;
        *self.timeout.get_mut() =
            (state.timeout_ms > 0).then(|| Duration::from_millis(state.timeout_ms));
        *self.lifecycle.get_mut() = Lifecycle {
            status: state.status,
            start: state.start,
            prerequisites: state.prerequisites,
            end: state.end,
            progression: state.progression,
            error: state.error,
        };
        self.params.replace(state.input, state.output);
        Ok(())
    }

    /// Save as a JSON record.
    ///
    /// # Errors
    ///
    /// [`Error::Persistence`] if a parameter holds a NaN or infinite float,
    /// which a record could not restore.
    pub fn save_record(&self) -> Result<serde_json::Value> {
        self.save_state().to_record()
    }

    /// Load from a JSON record.
    ///
    /// # Errors
    ///
    /// [`Error::Persistence`] if a key is missing or ill-shaped, plus the
    /// errors of [`load_state`](Self::load_state).
    pub fn load_record(&mut self, record: &serde_json::Value) -> Result<()> {
        match ExperimentState::from_record(record) {
            Ok(state) => self.load_state(state),
            Err(e) => {
                warn!(experiment = self.id, error = %e, "rejected persisted state");
                Err(e)
            }
        }
    }
}

impl Identifiable for Experiment {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Dependent<ExperimentRef> for Experiment {
    fn depends_on(&self) -> &[ExperimentRef] {
        &self.dependencies
    }
}

impl PartialEq for Experiment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Experiment {}

impl Hash for Experiment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Experiment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Experiment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("id", &self.id)
            .field("status", &self.lifecycle.lock().status)
            .field("timeout", &self.timeout())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.id)
    }
}

/// Builder for [`Experiment`]
pub struct ExperimentBuilder {
    body: Box<dyn Execution>,
    id: Option<u64>,
    timeout: Option<Duration>,
    time_ratio: f32,
    description: Option<String>,
    inputs: Vec<(String, Value)>,
    descriptions: Vec<(String, String)>,
    dependencies: Vec<ExperimentRef>,
}

impl ExperimentBuilder {
    fn new(body: Box<dyn Execution>) -> Self {
        Self {
            body,
            id: None,
            timeout: None,
            time_ratio: 1.0,
            description: None,
            inputs: Vec::new(),
            descriptions: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Draw the ID from `ids` instead of the process-wide generator.
    #[must_use]
    pub fn ids(mut self, ids: &IdGenerator) -> Self {
        self.id = Some(ids.next_id());
        self
    }

    /// Wall-clock limit; zero means unlimited.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Relative expected cost.
    #[must_use]
    pub const fn time_ratio(mut self, ratio: f32) -> Self {
        self.time_ratio = ratio;
        self
    }

    /// Human-readable description (overrides the body's).
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set an input parameter.
    #[must_use]
    pub fn input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.push((key.into(), value.into()));
        self
    }

    /// Describe a parameter.
    #[must_use]
    pub fn describe(mut self, key: impl Into<String>, description: impl Into<String>) -> Self {
        self.descriptions.push((key.into(), description.into()));
        self
    }

    /// Declare a dependency on another experiment.
    #[must_use]
    pub fn depends_on(mut self, other: &ExperimentRef) -> Self {
        if !self.dependencies.iter().any(|e| e.id == other.id) {
            self.dependencies.push(Arc::clone(other));
        }
        self
    }

    /// Build the experiment.
    #[must_use]
    pub fn build(self) -> Experiment {
        let Self {
            body,
            id,
            timeout,
            time_ratio,
            description,
            inputs,
            descriptions,
            mut dependencies,
        } = self;

        let params = ParameterStore::new();
        for (key, value) in inputs {
            params.write_input(key, value);
        }
        for (key, text) in descriptions {
            params.describe(key, text);
        }
        dependencies.sort_by_key(|e| e.id);

        let description = description
            .or_else(|| body.description())
            .unwrap_or_default();
        let lifecycle = Lifecycle::initial(body.prerequisites_fulfilled());

        Experiment {
            id: id.unwrap_or_else(|| IdGenerator::experiments().next_id()),
            body,
            params,
            lifecycle: Mutex::new(lifecycle),
            timeout: RwLock::new(timeout),
            time_ratio,
            description,
            dependencies,
        }
    }

    /// Build the experiment behind a shared handle.
    #[must_use]
    pub fn build_ref(self) -> ExperimentRef {
        Arc::new(self.build())
    }
}
