//! Step execution: the user compute contract, step context, intermediate values, and
//! the executor that runs one step under an error boundary.

mod compute;
mod context;
mod intermediates;
#[cfg(test)]
mod intermediates_test;
mod json_io;
mod step_executor;

pub use compute::{
  ComputeError, ComputeEvent, ComputeFn, ComputeStream, DEFAULT_OUTPUT, compute_fn, lambda,
};
pub use context::{Resources, StepContext};
pub use intermediates::Intermediates;
pub use json_io::{load_json_value, write_json_value};
pub use step_executor::execute_step;
