//! Per-run context handed to the coordinator: identity, interrupt flag, sinks, and
//! overrides of the configured executor and ordering.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::{EventSink, Executor, InProcessExecutor, InterruptHandle, MultithreadExecutor};
use crate::active::{RetryState, SortKeyFn};
use crate::config::{ExecutionConfig, RunConfig};
use crate::types::Run;

#[derive(Clone)]
pub struct RunContext {
  pub run_id: Uuid,
  pub tags: BTreeMap<String, String>,
  pub interrupt: InterruptHandle,
  /// Attempt counts carried over from earlier attempts of this run's steps.
  pub retry_state: RetryState,
  pub(crate) executor: Option<Arc<dyn Executor>>,
  pub(crate) sinks: Vec<Arc<dyn EventSink>>,
  pub(crate) sort_key: Option<SortKeyFn>,
}

impl RunContext {
  pub fn new() -> Self {
    Self {
      run_id: Uuid::new_v4(),
      tags: BTreeMap::new(),
      interrupt: InterruptHandle::new(),
      retry_state: RetryState::new(),
      executor: None,
      sinks: vec![],
      sort_key: None,
    }
  }

  /// Context for an existing run record.
  pub fn for_run(run: &Run) -> Self {
    Self {
      run_id: run.run_id,
      tags: run.tags.clone(),
      ..Self::new()
    }
  }

  pub fn with_run_id(mut self, run_id: Uuid) -> Self {
    self.run_id = run_id;
    self
  }

  pub fn with_interrupt(mut self, interrupt: InterruptHandle) -> Self {
    self.interrupt = interrupt;
    self
  }

  pub fn with_retry_state(mut self, retry_state: RetryState) -> Self {
    self.retry_state = retry_state;
    self
  }

  /// Overrides the executor chosen from the run config.
  pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
    self.executor = Some(executor);
    self
  }

  pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
    self.sinks.push(sink);
    self
  }

  pub fn with_sort_key(mut self, sort_key: SortKeyFn) -> Self {
    self.sort_key = Some(sort_key);
    self
  }

  /// The override executor, or the one `run_config.execution` selects.
  pub fn executor_for(&self, run_config: &RunConfig) -> Arc<dyn Executor> {
    if let Some(executor) = &self.executor {
      return executor.clone();
    }
    match run_config.execution {
      ExecutionConfig::InProcess {} => Arc::new(InProcessExecutor::new()),
      ExecutionConfig::Multithread { max_concurrent } => {
        Arc::new(MultithreadExecutor::new(max_concurrent))
      }
    }
  }
}

impl Default for RunContext {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for RunContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RunContext")
      .field("run_id", &self.run_id)
      .field("tags", &self.tags)
      .field("interrupted", &self.interrupt.is_interrupted())
      .field("executor", &self.executor)
      .field("sinks", &self.sinks.len())
      .finish_non_exhaustive()
  }
}
