//! Experiments: the schedulable unit of work
//!
//! ## Overview
//!
//! ```text
//! Experiment ──owns──> ParameterStore (inputs survive reset, outputs do not)
//!     │
//!     ├──delegates──> Execution (user strategy: execute / prerequisites)
//!     └──observes───> CancellationToken (one per attempt)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use trueno_lab::experiment::{ExecutionContext, Experiment, Status};
//! use trueno_lab::error::ExperimentError;
//!
//! fn square(ctx: &ExecutionContext<'_>) -> Result<(), ExperimentError> {
//!     let n = ctx.experiment().read_int("n");
//!     ctx.sleep(Duration::from_millis(1))?;
//!     ctx.write("square", n * n);
//!     Ok(())
//! }
//!
//! let experiment = Experiment::builder(square).input("n", 12).build();
//! experiment.run()?;
//!
//! assert_eq!(experiment.status(), Status::Done);
//! assert_eq!(experiment.read_int("square"), 144);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cancel;
mod group;
mod instance;
mod params;
mod state;
mod status;

pub use cancel::CancellationToken;
pub use group::ExperimentGroup;
pub use instance::{Execution, ExecutionContext, Experiment, ExperimentBuilder, ExperimentRef};
pub use params::{ParameterMap, ParameterStore, Value};
pub use state::ExperimentState;
pub use status::Status;
