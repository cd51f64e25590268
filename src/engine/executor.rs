//! Executors: how a launched step's event stream is produced.
//!
//! The coordinator owns all scheduling; an executor only decides where a step runs
//! and how many may run at once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, Span, info_span};

use crate::active::RetryState;
use crate::execution::{StepContext, execute_step};
use crate::plan::{ExecutionPlan, ExecutionStep};
use crate::types::{Event, InputValues, RetryMode, StepOutputHandle};

/// Everything needed to run one step attempt.
#[derive(Debug, Clone)]
pub struct StepLaunch {
  pub plan: Arc<ExecutionPlan>,
  pub step: Arc<ExecutionStep>,
  pub context: StepContext,
  pub inputs: InputValues,
  /// Upstream values the step reads, keyed by handle.
  pub known_outputs: HashMap<StepOutputHandle, Value>,
  pub retry_mode: RetryMode,
  pub retry_state: RetryState,
}

/// Runs launched steps.
pub trait Executor: Send + Sync + fmt::Debug {
  fn name(&self) -> &'static str;

  /// Steps that may be in flight at once.
  fn max_concurrent(&self) -> usize;

  /// Starts one step; the stream ends after the step's terminal event.
  fn launch(&self, launch: StepLaunch) -> BoxStream<'static, Event>;
}

pub(crate) fn step_span(launch: &StepLaunch) -> Span {
  info_span!(
    "step",
    run_id = %launch.context.run_id,
    step_key = %launch.step.key,
    attempt = launch.context.retry_attempt
  )
}

/// Polls `events` inside `span`.
pub(crate) fn instrumented(events: BoxStream<'static, Event>, span: Span) -> BoxStream<'static, Event> {
  stream::unfold(events, move |mut events| {
    let span = span.clone();
    async move { events.next().await.map(|event| (event, events)) }.instrument(span)
  })
  .boxed()
}

/// Runs one step at a time on the coordinating task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessExecutor;

impl InProcessExecutor {
  pub fn new() -> Self {
    Self
  }
}

impl Executor for InProcessExecutor {
  fn name(&self) -> &'static str {
    "in_process"
  }

  fn max_concurrent(&self) -> usize {
    1
  }

  fn launch(&self, launch: StepLaunch) -> BoxStream<'static, Event> {
    let span = step_span(&launch);
    let events = execute_step(launch.step, launch.context, launch.inputs, launch.retry_mode);
    instrumented(events, span)
  }
}

/// Runs each step on its own tokio task, at most `max_concurrent` at a time.
#[derive(Debug, Clone, Copy)]
pub struct MultithreadExecutor {
  max_concurrent: usize,
}

impl MultithreadExecutor {
  pub fn new(max_concurrent: usize) -> Self {
    Self {
      max_concurrent: max_concurrent.max(1),
    }
  }
}

impl Executor for MultithreadExecutor {
  fn name(&self) -> &'static str {
    "multithread"
  }

  fn max_concurrent(&self) -> usize {
    self.max_concurrent
  }

  fn launch(&self, launch: StepLaunch) -> BoxStream<'static, Event> {
    let span = step_span(&launch);
    let (tx, rx) = tokio::sync::mpsc::channel(16);
    tokio::spawn(
      async move {
        let mut events = execute_step(launch.step, launch.context, launch.inputs, launch.retry_mode);
        while let Some(event) = events.next().await {
          if tx.send(event).await.is_err() {
            break;
          }
        }
      }
      .instrument(span),
    );
    Box::pin(ReceiverStream::new(rx))
  }
}
