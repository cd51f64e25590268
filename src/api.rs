//! Top-level entry points: build a plan, execute a plan, execute a pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::definition::PipelineDefinition;
use crate::engine::{EventSink, Instance, RunContext, execute_plan_in_context};
use crate::error::{EngineError, PlanError};
use crate::event_log_io::ReexecutionState;
use crate::plan::ExecutionPlan;
use crate::types::{ErrorInfo, Event, EventKind, EventType, Run, StepOutputHandle};

/// Builds the plan for `pipeline`, restricted to `step_keys_to_execute` when given.
///
/// A subset keeps config literals of inputs whose producer it excludes and turns them
/// into input thunks.
#[instrument(level = "trace", skip(pipeline, run_config), fields(pipeline = %pipeline.name))]
pub fn create_execution_plan(
  pipeline: Arc<PipelineDefinition>,
  run_config: RunConfig,
  mode: Option<&str>,
  step_keys_to_execute: Option<&[String]>,
) -> Result<ExecutionPlan, PlanError> {
  create_execution_plan_with_known(pipeline, run_config, mode, step_keys_to_execute, &HashMap::new())
}

/// Like [create_execution_plan], satisfying excluded producers from `known_outputs` first.
pub fn create_execution_plan_with_known(
  pipeline: Arc<PipelineDefinition>,
  run_config: RunConfig,
  mode: Option<&str>,
  step_keys_to_execute: Option<&[String]>,
  known_outputs: &HashMap<StepOutputHandle, Value>,
) -> Result<ExecutionPlan, PlanError> {
  let run_config = Arc::new(run_config);
  match step_keys_to_execute {
    None => ExecutionPlan::build(pipeline, run_config, mode),
    Some(keys) => {
      ExecutionPlan::build_with(pipeline, run_config, mode, true)?.build_subset(keys, known_outputs)
    }
  }
}

/// Plan that re-runs the steps of `state` on top of the outputs it already has.
pub fn create_reexecution_plan(
  pipeline: Arc<PipelineDefinition>,
  run_config: RunConfig,
  mode: Option<&str>,
  state: &ReexecutionState,
) -> Result<ExecutionPlan, PlanError> {
  create_execution_plan_with_known(
    pipeline,
    run_config,
    mode,
    Some(&state.step_keys_to_execute),
    &state.known_outputs,
  )
}

/// Executes `plan`, yielding every event of the run.
pub fn execute_plan(plan: Arc<ExecutionPlan>, run_context: RunContext) -> BoxStream<'static, Event> {
  execute_plan_in_context(plan, run_context)
}

/// Events of one finished pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineExecutionResult {
  pub run_id: Uuid,
  pub pipeline_name: String,
  pub events: Vec<Event>,
}

impl PipelineExecutionResult {
  /// True if the run closed with `PlanSuccess`.
  pub fn success(&self) -> bool {
    self
      .events
      .last()
      .is_some_and(|e| e.event_type() == EventType::PlanSuccess)
  }

  /// Error carried by the closing `PlanFailure`, if any.
  pub fn failure(&self) -> Option<&ErrorInfo> {
    self.events.iter().rev().find_map(|e| match &e.kind {
      EventKind::PlanFailure { error } => error.as_ref(),
      _ => None,
    })
  }

  pub fn events_for_step<'a>(&'a self, step_key: &'a str) -> impl DoubleEndedIterator<Item = &'a Event> + 'a {
    self
      .events
      .iter()
      .filter(move |e| e.step_key.as_deref() == Some(step_key))
  }

  pub fn step_event_types(&self, step_key: &str) -> Vec<EventType> {
    self.events_for_step(step_key).map(Event::event_type).collect()
  }

  pub fn step_succeeded(&self, step_key: &str) -> bool {
    self
      .events_for_step(step_key)
      .any(|e| e.event_type() == EventType::StepSuccess)
  }

  /// Last value emitted on `output` by `step_key`.
  pub fn output_value<'a>(&'a self, step_key: &'a str, output: &str) -> Option<&'a Value> {
    self.events_for_step(step_key).rev().find_map(|e| match &e.kind {
      EventKind::StepOutput { output_name, value } if output_name == output => Some(value),
      _ => None,
    })
  }
}

/// Builds and executes the full plan of `pipeline`, collecting its events.
#[instrument(level = "trace", skip_all, fields(pipeline = %pipeline.name))]
pub async fn execute_pipeline(
  pipeline: Arc<PipelineDefinition>,
  run_config: RunConfig,
  mode: Option<&str>,
  run_context: RunContext,
) -> Result<PipelineExecutionResult, EngineError> {
  let pipeline_name = pipeline.name.clone();
  let plan = create_execution_plan(pipeline, run_config, mode, None)?;
  let run_id = run_context.run_id;
  let events: Vec<Event> = execute_plan(Arc::new(plan), run_context).collect().await;
  let result = PipelineExecutionResult {
    run_id,
    pipeline_name,
    events,
  };
  info!(run_id = %run_id, success = result.success(), "pipeline execution finished");
  Ok(result)
}

/// Records a run in `instance`, then executes it with the instance as an event sink.
///
/// The instance sees an engine event announcing the launch ahead of the plan events.
pub async fn execute_run<I>(
  pipeline: Arc<PipelineDefinition>,
  run_config: RunConfig,
  mode: Option<&str>,
  instance: Arc<I>,
  run_context: RunContext,
) -> Result<PipelineExecutionResult, EngineError>
where
  I: Instance + 'static,
{
  let plan = create_execution_plan(pipeline.clone(), run_config.clone(), mode, None)?;
  let mut run = Run::new(pipeline.name.clone(), plan.mode(), run_config.to_value())
    .with_run_id(run_context.run_id);
  run.tags = run_context.tags.clone();
  let run = instance.create_run(run).await;
  instance
    .report_engine_event(
      run.run_id,
      &format!("Launching run of pipeline \"{}\" in mode \"{}\".", run.pipeline_name, plan.mode()),
    )
    .await;
  let sink: Arc<dyn EventSink> = instance;
  let run_context = run_context.with_event_sink(sink);
  let events: Vec<Event> = execute_plan(Arc::new(plan), run_context).collect().await;
  Ok(PipelineExecutionResult {
    run_id: run.run_id,
    pipeline_name: run.pipeline_name,
    events,
  })
}
