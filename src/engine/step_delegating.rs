//! Step delegation: each step is shipped through a serializable wire contract to a
//! [StepWorker], which rebuilds just enough of the plan to run that one step and
//! streams its events back.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::coordinator::execute_plan_with;
use super::executor::{instrumented, step_span};
use super::{Executor, InProcessExecutor, RunContext, StepLaunch};
use crate::active::RetryState;
use crate::config::RunConfig;
use crate::definition::Repository;
use crate::error::EngineError;
use crate::execution::execute_step;
use crate::plan::{ExecutionPlan, StepKind};
use crate::types::{ErrorInfo, Event, EventKind, RetryMode, StepOutputHandle};

/// An upstream value shipped to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownOutput {
  pub handle: StepOutputHandle,
  pub value: Value,
}

/// Run state a worker needs but cannot derive on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownState {
  pub retry_state: RetryState,
  pub known_outputs: Vec<KnownOutput>,
}

impl KnownState {
  pub fn output_map(&self) -> HashMap<StepOutputHandle, Value> {
    self
      .known_outputs
      .iter()
      .map(|o| (o.handle.clone(), o.value.clone()))
      .collect()
  }
}

/// Identifies one step execution for an out-of-process worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteStepArgs {
  pub pipeline_name: String,
  pub run_id: Uuid,
  pub mode: String,
  pub step_keys_to_execute: Vec<String>,
  pub run_config: Value,
  pub retry_mode: RetryMode,
  pub known_state: KnownState,
}

impl ExecuteStepArgs {
  pub fn for_launch(launch: &StepLaunch) -> Self {
    let mut known_outputs: Vec<KnownOutput> = launch
      .known_outputs
      .iter()
      .map(|(handle, value)| KnownOutput {
        handle: handle.clone(),
        value: value.clone(),
      })
      .collect();
    known_outputs.sort_by(|a, b| a.handle.cmp(&b.handle));
    Self {
      pipeline_name: launch.plan.pipeline_name().to_string(),
      run_id: launch.context.run_id,
      mode: launch.plan.mode().to_string(),
      step_keys_to_execute: vec![launch.step.key.clone()],
      run_config: launch.plan.run_config().to_value(),
      retry_mode: launch.retry_mode,
      known_state: KnownState {
        retry_state: launch.retry_state.clone(),
        known_outputs,
      },
    }
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }

  pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(text)
  }
}

/// Executes the steps named by [ExecuteStepArgs] and streams back their events.
#[async_trait]
pub trait StepWorker: Send + Sync + fmt::Debug {
  async fn execute_step(&self, args: ExecuteStepArgs) -> Result<BoxStream<'static, Event>, EngineError>;
}

/// Worker that rebuilds plans from a [Repository] in this process.
#[derive(Debug, Clone)]
pub struct InProcessStepWorker {
  repository: Arc<Repository>,
}

impl InProcessStepWorker {
  pub fn new(repository: Arc<Repository>) -> Self {
    Self { repository }
  }
}

#[async_trait]
impl StepWorker for InProcessStepWorker {
  #[instrument(level = "trace", skip_all, fields(pipeline = %args.pipeline_name, steps = ?args.step_keys_to_execute))]
  async fn execute_step(&self, args: ExecuteStepArgs) -> Result<BoxStream<'static, Event>, EngineError> {
    let pipeline = self
      .repository
      .pipeline(&args.pipeline_name)
      .ok_or_else(|| EngineError::PipelineNotFound {
        name: args.pipeline_name.clone(),
      })?;
    // Retries are re-queued by the delegating coordinator, not inside the worker's run.
    let worker_retry_mode = match args.retry_mode {
      RetryMode::Enabled => RetryMode::Deferred,
      other => other,
    };
    let run_config = RunConfig::from_value(args.run_config.clone())?.with_retry_mode(worker_retry_mode);
    let full = ExecutionPlan::build_with(pipeline, Arc::new(run_config), Some(&args.mode), true)?;
    let plan = full.build_subset(&args.step_keys_to_execute, &args.known_state.output_map())?;
    debug!(steps = plan.len(), "worker plan built");

    let run_context = RunContext::new()
      .with_run_id(args.run_id)
      .with_retry_state(args.known_state.retry_state.clone());
    let requested: HashSet<String> = args.step_keys_to_execute.into_iter().collect();
    let events = execute_plan_with(Arc::new(plan), Arc::new(InProcessExecutor::new()), run_context)
      .filter(move |event| {
        future::ready(
          event
            .step_key
            .as_ref()
            .is_some_and(|key| requested.contains(key)),
        )
      });
    Ok(events.boxed())
  }
}

/// Sends every step with user compute to a [StepWorker].
///
/// Value steps (input thunks and injected known outputs) carry no user compute and
/// run inline.
#[derive(Debug, Clone)]
pub struct StepDelegatingExecutor {
  worker: Arc<dyn StepWorker>,
  max_concurrent: usize,
}

impl StepDelegatingExecutor {
  pub fn new(worker: Arc<dyn StepWorker>, max_concurrent: usize) -> Self {
    Self {
      worker,
      max_concurrent: max_concurrent.max(1),
    }
  }
}

impl Executor for StepDelegatingExecutor {
  fn name(&self) -> &'static str {
    "step_delegating"
  }

  fn max_concurrent(&self) -> usize {
    self.max_concurrent
  }

  fn launch(&self, launch: StepLaunch) -> BoxStream<'static, Event> {
    let span = step_span(&launch);
    if matches!(launch.step.kind, StepKind::InputThunk { .. }) {
      let events = execute_step(launch.step, launch.context, launch.inputs, launch.retry_mode);
      return instrumented(events, span);
    }

    let args = ExecuteStepArgs::for_launch(&launch);
    let worker = self.worker.clone();
    let StepLaunch { step, context, .. } = launch;
    let events = Box::pin(stream! {
      match worker.execute_step(args).await {
        Ok(mut events) => {
          while let Some(event) = events.next().await {
            yield event;
          }
        }
        Err(e) => {
          error!(step_key = %step.key, error = %e, "step worker could not run step");
          yield Event::step_event(
            context.run_id,
            context.pipeline_name.clone(),
            step.key.clone(),
            step.solid_handle.clone(),
            EventKind::StepFailure {
              error: ErrorInfo::from_error("WorkerError", &e),
            },
            format!("Step worker could not run step \"{}\".", step.key),
          );
        }
      }
    });
    instrumented(events, span)
  }
}
