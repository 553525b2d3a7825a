//! Lifecycle tests driven through the public API, with a body that owns a
//! setup step (generating a data set) and reports progression.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use trueno_lab::error::ExperimentError;
use trueno_lab::experiment::{
    CancellationToken, Execution, ExecutionContext, Experiment, ExperimentGroup, Status, Value,
};
use trueno_lab::ids::{Dependent, IdGenerator, Identifiable};

/// Sums a generated data set; generating it is the setup step.
#[derive(Default)]
struct SumOfSquares {
    data: Mutex<Option<Vec<i64>>>,
}

impl Execution for SumOfSquares {
    #[allow(clippy::cast_precision_loss)]
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<(), ExperimentError> {
        let data = self
            .data
            .lock()
            .clone()
            .ok_or_else(|| ExperimentError::failed("data set missing"))?;
        let mut total = 0;
        for (i, x) in data.iter().enumerate() {
            ctx.checkpoint()?;
            total += x * x;
            ctx.set_progression((i + 1) as f32 / data.len() as f32);
        }
        ctx.write("sum", total);
        Ok(())
    }

    fn prerequisites_fulfilled(&self) -> bool {
        self.data.lock().is_some()
    }

    fn fulfill_prerequisites(&self, ctx: &ExecutionContext<'_>) -> Result<(), ExperimentError> {
        let n = ctx.experiment().read_int("n");
        *self.data.lock() = Some((1..=n).collect());
        Ok(())
    }

    fn clean_prerequisites(&self) {
        *self.data.lock() = None;
    }

    fn description(&self) -> Option<String> {
        Some("Sum of the squares of 1..=n".to_string())
    }
}

fn diverge(_: &ExecutionContext<'_>) -> Result<(), ExperimentError> {
    Err(ExperimentError::failed("diverged"))
}

/// Waits on its token until someone cancels it.
fn wait_for_cancel(ctx: &ExecutionContext<'_>) -> Result<(), ExperimentError> {
    ctx.sleep(Duration::from_secs(30))?;
    Ok(())
}

#[test]
fn test_setup_step_then_execution() {
    let ids = IdGenerator::new();
    let e = Experiment::builder(SumOfSquares::default())
        .ids(&ids)
        .input("n", 4)
        .describe("n", "Size of the data set")
        .build();

    assert_eq!(e.status(), Status::Uninitialized);
    assert!(!e.prerequisites_fulfilled());
    assert_eq!(e.description(), "Sum of the squares of 1..=n");
    assert_eq!(e.parameter_description("n"), "Size of the data set");

    e.run().unwrap();
    assert_eq!(e.status(), Status::Done);
    assert_eq!(e.read_int("sum"), 1 + 4 + 9 + 16);
    assert_eq!(e.count_data_points(), 1);

    let start = e.start_time().unwrap();
    let prereq = e.prerequisites_time().unwrap();
    let end = e.end_time().unwrap();
    assert!(start <= prereq && prereq <= end);
}

#[test]
fn test_setup_step_outside_a_run() {
    let e = Experiment::builder(SumOfSquares::default()).input("n", 3).build();

    assert_eq!(e.fulfill_prerequisites(), Status::Ready);
    assert!(e.start_time().is_none());
    assert_eq!(e.status(), Status::Ready);

    e.clean_prerequisites();
    assert_eq!(e.status(), Status::Uninitialized);

    e.run().unwrap();
    assert_eq!(e.read("sum"), Some(Value::Int(14)));
}

#[test]
fn test_cancelled_attempt_from_another_thread() {
    let e = Arc::new(Experiment::new(wait_for_cancel));
    let token = CancellationToken::new();

    let worker = {
        let e = Arc::clone(&e);
        let token = token.clone();
        thread::spawn(move || e.run_with(&token))
    };
    while e.status() != Status::Running {
        thread::sleep(Duration::from_millis(1));
    }
    token.cancel();

    // Nobody concluded the experiment: the interruption is handed back and
    // the status is left as it was
    assert!(worker.join().unwrap().is_err());
    assert_eq!(e.status(), Status::Running);
    assert!(e.reset().is_err());
}

#[test]
fn test_reset_after_failure() {
    let e = Experiment::new(diverge);
    e.run().unwrap();
    assert_eq!(e.status(), Status::Failed);
    assert_eq!(e.error().as_deref(), Some("diverged"));

    e.reset().unwrap();
    assert_eq!(e.status(), Status::Ready);
    assert_eq!(e.error(), None);
    assert!(e.start_time().is_none());
    assert_eq!(e.total_duration(), Duration::ZERO);
}

#[test]
fn test_rerun_after_reset() {
    let e = Experiment::builder(SumOfSquares::default()).input("n", 2).build();
    e.run().unwrap();
    let first_end = e.end_time();

    e.reset().unwrap();
    assert_eq!(e.read("sum"), None);
    assert_eq!(e.read_int("n"), 2);
    // The data set survives a reset: no setup step needed
    assert_eq!(e.status(), Status::Ready);

    thread::sleep(Duration::from_millis(2));
    e.run().unwrap();
    assert_eq!(e.read_int("sum"), 5);
    assert!(e.end_time() > first_end);
}

#[test]
fn test_dependencies_are_exposed() {
    let ids = IdGenerator::new();
    let data = Experiment::builder(SumOfSquares::default())
        .ids(&ids)
        .input("n", 10)
        .build_ref();
    let report = Experiment::builder(SumOfSquares::default())
        .ids(&ids)
        .depends_on(&data)
        .depends_on(&data)
        .build_ref();

    assert_eq!(report.depends_on().len(), 1);
    assert_eq!(report.dependencies()[0].id(), data.id());
    assert!(data.depends_on().is_empty());
}

#[test]
fn test_group_aggregates_members() {
    let ids = IdGenerator::new();
    let members: Vec<_> = (1..=3)
        .map(|n| {
            Experiment::builder(SumOfSquares::default())
                .ids(&ids)
                .input("n", n)
                .build_ref()
        })
        .collect();
    let group = ExperimentGroup::of("sums", &members);

    assert_eq!(group.status(), Status::Uninitialized);
    members[0].run().unwrap();
    assert_eq!(group.status(), Status::Uninitialized);
    for e in &members[1..] {
        e.run().unwrap();
    }
    assert_eq!(group.status(), Status::Done);
    assert!((group.progression() - 1.0).abs() < f32::EPSILON);
}

#[test]
fn test_timeout_is_mutable() {
    let e = Experiment::builder(wait_for_cancel)
        .timeout(Duration::from_secs(2))
        .time_ratio(2.5)
        .build();
    assert_eq!(e.timeout(), Some(Duration::from_secs(2)));
    e.set_timeout(Duration::ZERO);
    assert_eq!(e.timeout(), None);
    assert!((e.time_ratio() - 2.5).abs() < f32::EPSILON);
}
