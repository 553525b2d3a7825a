//! # Trueno-Lab: Experiment Execution Engine
//!
//! **Version**: 0.1.0
//!
//! Trueno-Lab runs computational experiments: units of work with a
//! lifecycle, parameters and an optional setup step. Experiments are
//! dispatched in FIFO order onto a bounded worker pool, each one watched by
//! a timeout supervisor, and batches can be reordered or subsampled by
//! dependency-aware schedulers before they are queued.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: terminal states are compare-and-set; a timeout, a hard stop
//!   and a worker can race without corrupting the lifecycle
//! - **Heijunka**: `BalanceObjects` levels the load across dependency groups
//! - **Poka-Yoke**: cancellation is cooperative and observed through
//!   [`experiment::CancellationToken`] checkpoints, never by killing threads
//! - **Genchi Genbutsu**: every lifecycle transition is logged through
//!   `tracing`
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Duration;
//! use trueno_lab::assistant::Assistant;
//! use trueno_lab::error::ExperimentError;
//! use trueno_lab::experiment::{ExecutionContext, Experiment, ExperimentGroup, Status};
//! use trueno_lab::schedule::BalanceObjects;
//!
//! fn work(ctx: &ExecutionContext<'_>) -> Result<(), ExperimentError> {
//!     ctx.sleep(Duration::from_millis(5))?;
//!     ctx.write("answer", 42);
//!     Ok(())
//! }
//!
//! let experiments: Vec<_> = (0..4).map(|_| Experiment::builder(work).build_ref()).collect();
//! let groups = [
//!     ExperimentGroup::of("even", [&experiments[0], &experiments[1]]),
//!     ExperimentGroup::of("odd", [&experiments[2], &experiments[3]]),
//! ];
//!
//! let assistant = Assistant::new()?;
//! assistant.add_to_queue(&experiments);
//! assistant.apply(&mut BalanceObjects::new(&groups));
//!
//! let run = assistant.enqueue_queued();
//! run.join();
//! assert_eq!(run.status(), Status::Done);
//! assert_eq!(experiments[3].read_int("answer"), 42);
//! # Ok::<(), trueno_lab::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod assistant;
pub mod error;
pub mod experiment;
pub mod ids;
pub mod logging;
pub mod schedule;

pub use error::{Error, Result};
