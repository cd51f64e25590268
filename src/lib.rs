//! # streamweave-plan
//!
//! Execution plans and a retry-aware scheduler for typed computation graphs.
//!
//! ## Architecture
//!
//! - [definition]: solids, composites, and their dependencies form an acyclic graph,
//!   wrapped in a [PipelineDefinition] with named modes and resources.
//! - [plan]: the graph plus a [RunConfig] compiles into a flat [ExecutionPlan] of
//!   steps (transforms, input thunks, expectations, joins, materializations).
//! - [active]: [ActiveExecution] decides which steps are ready, skipped, abandoned, or
//!   waiting to retry.
//! - [execution]: the step executor runs one step's compute under an error boundary.
//! - [engine]: the coordinating loop dispatches ready steps in process, on tokio tasks,
//!   or through a step worker, and brackets the run with plan events.
//! - [event_log_io]: JSON event logs and re-execution of failed runs.

pub mod active;
pub mod api;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod event_log_io;
pub mod execution;
pub mod plan;
#[cfg(test)]
mod test_support;
pub mod types;

pub use active::{ActiveExecution, RetryState, StepState};
pub use api::{
  PipelineExecutionResult, create_execution_plan, create_execution_plan_with_known,
  create_reexecution_plan, execute_pipeline, execute_plan, execute_run,
};
pub use config::RunConfig;
pub use definition::{
  CompositeDefinition, GraphBuilder, GraphDefinition, PipelineDefinition, Repository, SolidDefinition,
};
pub use engine::{
  InMemoryInstance, InProcessExecutor, InterruptHandle, MultithreadExecutor, RunContext,
  StepDelegatingExecutor,
};
pub use error::{ActiveExecutionError, ConfigError, DefinitionError, EngineError, PlanError};
pub use event_log_io::{EventLog, JsonFileEventSink, ReexecutionState};
pub use execution::{ComputeError, ComputeEvent, StepContext};
pub use plan::{ExecutionPlan, ExecutionStep};
pub use types::{Event, EventKind, EventType, RetryMode, RuntimeType};
