//! Plan builder and execution plan: the flattened, ordered step graph of one run.

mod builder;
mod execution_plan;
mod step;
mod subset;

pub use execution_plan::{ExecutionPlan, StepLevels};
pub use step::{
  EXPECTATION_VALUE, ExecutionStep, INPUT_THUNK_OUTPUT, JOIN_OUTPUT, MATERIALIZATION_VALUE,
  PRIORITY_TAG, StepInput, StepInputSource, StepKind, StepOutput, expectation_key,
  input_thunk_key, join_key, materialization_key, transform_key,
};
