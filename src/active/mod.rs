//! Active execution: the single-owner state machine that schedules one run's steps.

mod active_execution;
mod retry_state;
mod step_state;

pub use active_execution::{ActiveExecution, SortKeyFn, priority_sort_key};
pub use retry_state::RetryState;
pub use step_state::StepState;
