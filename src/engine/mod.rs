//! Execution driver: the coordinating loop, executors, step delegation, interrupts,
//! and the event sink / instance boundary.

mod coordinator;
mod executor;
mod instance;
mod interrupt;
mod resources;
mod run_context;
mod step_delegating;

pub use coordinator::{execute_plan_in_context, execute_plan_with};
pub use executor::{Executor, InProcessExecutor, MultithreadExecutor, StepLaunch};
pub use instance::{EventSink, InMemoryInstance, Instance};
pub use interrupt::{InterruptHandle, install_ctrl_c_handler};
pub use run_context::RunContext;
pub use step_delegating::{
  ExecuteStepArgs, InProcessStepWorker, KnownOutput, KnownState, StepDelegatingExecutor, StepWorker,
};
