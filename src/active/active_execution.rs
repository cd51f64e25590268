//! Run-scoped state machine deciding which steps are ready, skipped, or abandoned.
//!
//! Every step key sits in exactly one bucket. Steps leave `pending` during the update
//! pass that runs before each retrieval call, and reach a terminal bucket only via the
//! explicit `mark_*` calls. The owner must finish with [ActiveExecution::close], which
//! fails if any step was left incomplete or never reported a terminal outcome.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use super::{RetryState, StepState};
use crate::error::ActiveExecutionError;
use crate::plan::{ExecutionPlan, ExecutionStep, StepInputSource};
use crate::types::{Event, EventKind, RetryMode, StepOutputHandle};

/// Ordering key for executable steps; smaller keys are dispatched first.
pub type SortKeyFn = Arc<dyn Fn(&ExecutionStep) -> i128 + Send + Sync>;

/// Default ordering: higher `priority` tag first.
pub fn priority_sort_key() -> SortKeyFn {
  Arc::new(|step: &ExecutionStep| -i128::from(step.priority()))
}

/// Readiness of one step input during an update pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputReadiness {
  Waiting,
  Available,
  /// Every producer finished without producing a value.
  Unmet,
  /// A producer failed and nothing else can supply the input.
  Broken,
}

pub struct ActiveExecution {
  plan: Arc<ExecutionPlan>,
  retry_mode: RetryMode,
  retry_state: RetryState,
  sort_key: SortKeyFn,

  pending: BTreeMap<String, BTreeSet<String>>,
  executable: Vec<String>,
  pending_skip: Vec<String>,
  pending_abandon: Vec<String>,
  waiting_to_retry: HashMap<String, Instant>,
  in_flight: HashSet<String>,

  succeeded: BTreeSet<String>,
  failed: BTreeSet<String>,
  skipped: BTreeSet<String>,
  abandoned: BTreeSet<String>,
  unknown_state: BTreeSet<String>,

  interrupted: HashSet<String>,
  successful_step_outputs: HashSet<StepOutputHandle>,
  closed: bool,
}

impl ActiveExecution {
  pub fn new(plan: Arc<ExecutionPlan>, retry_mode: RetryMode) -> Self {
    let pending = plan.execution_deps().clone();
    Self {
      plan,
      retry_mode,
      retry_state: RetryState::new(),
      sort_key: priority_sort_key(),
      pending,
      executable: vec![],
      pending_skip: vec![],
      pending_abandon: vec![],
      waiting_to_retry: HashMap::new(),
      in_flight: HashSet::new(),
      succeeded: BTreeSet::new(),
      failed: BTreeSet::new(),
      skipped: BTreeSet::new(),
      abandoned: BTreeSet::new(),
      unknown_state: BTreeSet::new(),
      interrupted: HashSet::new(),
      successful_step_outputs: HashSet::new(),
      closed: false,
    }
  }

  /// Replaces the executable ordering; ties still fall back to plan order.
  pub fn with_sort_key(mut self, sort_key: SortKeyFn) -> Self {
    self.sort_key = sort_key;
    self
  }

  /// Seeds attempt counts, e.g. from a step worker's known state.
  pub fn with_retry_state(mut self, retry_state: RetryState) -> Self {
    self.retry_state = retry_state;
    self
  }

  pub fn plan(&self) -> &Arc<ExecutionPlan> {
    &self.plan
  }

  pub fn retry_mode(&self) -> RetryMode {
    self.retry_mode
  }

  pub fn retry_state(&self) -> &RetryState {
    &self.retry_state
  }

  fn is_terminal(&self, key: &str) -> bool {
    self.succeeded.contains(key)
      || self.failed.contains(key)
      || self.skipped.contains(key)
      || self.abandoned.contains(key)
      || self.unknown_state.contains(key)
  }

  fn is_broken(&self, key: &str) -> bool {
    self.failed.contains(key) || self.abandoned.contains(key) || self.unknown_state.contains(key)
  }

  fn input_readiness(&self, source: &StepInputSource) -> InputReadiness {
    match source {
      StepInputSource::Single(handle) => {
        let producer = handle.step_key.as_str();
        if self.is_broken(producer) {
          InputReadiness::Broken
        } else if !self.is_terminal(producer) {
          InputReadiness::Waiting
        } else if self.successful_step_outputs.contains(handle) {
          InputReadiness::Available
        } else {
          InputReadiness::Unmet
        }
      }
      StepInputSource::FanIn(handles) => {
        if handles.iter().any(|h| !self.is_terminal(&h.step_key)) {
          InputReadiness::Waiting
        } else if handles.iter().any(|h| self.successful_step_outputs.contains(h)) {
          InputReadiness::Available
        } else if handles.iter().any(|h| self.is_broken(&h.step_key)) {
          InputReadiness::Broken
        } else {
          InputReadiness::Unmet
        }
      }
    }
  }

  /// Moves retry-eligible steps to executable and resolves pending steps whose inputs settled.
  #[instrument(level = "trace", skip(self))]
  fn update(&mut self) {
    let now = Instant::now();
    let ready: Vec<String> = self
      .waiting_to_retry
      .iter()
      .filter(|(_, at)| **at <= now)
      .map(|(k, _)| k.clone())
      .collect();
    for key in ready {
      self.waiting_to_retry.remove(&key);
      debug!(step_key = %key, "retry delay elapsed");
      self.executable.push(key);
    }

    let mut resolved = vec![];
    for key in self.pending.keys() {
      let Ok(step) = self.plan.get_step_by_key(key) else {
        continue;
      };
      let readiness: Vec<InputReadiness> = step
        .inputs()
        .iter()
        .map(|input| self.input_readiness(&input.source))
        .collect();
      let state = if readiness.contains(&InputReadiness::Broken) {
        StepState::PendingAbandon
      } else if readiness.contains(&InputReadiness::Waiting) {
        continue;
      } else if readiness.contains(&InputReadiness::Unmet) {
        StepState::PendingSkip
      } else {
        StepState::Executable
      };
      resolved.push((key.clone(), state));
    }

    for (key, state) in resolved {
      self.pending.remove(&key);
      match state {
        StepState::PendingAbandon => {
          warn!(step_key = %key, "upstream failure, step will be abandoned");
          self.pending_abandon.push(key);
        }
        StepState::PendingSkip => {
          debug!(step_key = %key, "inputs not produced, step will be skipped");
          self.pending_skip.push(key);
        }
        _ => {
          debug!(step_key = %key, "step executable");
          self.executable.push(key);
        }
      }
    }
  }

  /// Up to `limit` ready steps, ordered by sort key then plan order; they become in flight.
  #[instrument(level = "trace", skip(self))]
  pub fn get_steps_to_execute(&mut self, limit: Option<usize>) -> Vec<Arc<ExecutionStep>> {
    self.update();
    let plan = self.plan.clone();
    let sort_key = self.sort_key.clone();
    let mut ready: Vec<(i128, usize, Arc<ExecutionStep>)> = self
      .executable
      .iter()
      .filter_map(|key| {
        let position = plan.step_position(key)?;
        let step = plan.steps()[position].clone();
        Some((sort_key(&step), position, step))
      })
      .collect();
    ready.sort_by_key(|(k, position, _)| (*k, *position));

    let take = limit.unwrap_or(ready.len()).min(ready.len());
    let chosen: Vec<Arc<ExecutionStep>> = ready.into_iter().take(take).map(|(_, _, s)| s).collect();
    for step in &chosen {
      self.executable.retain(|k| *k != step.key);
      self.in_flight.insert(step.key.clone());
    }
    chosen
  }

  /// Steps to be marked skipped; they become in flight until [ActiveExecution::mark_skipped].
  pub fn get_steps_to_skip(&mut self) -> Vec<Arc<ExecutionStep>> {
    self.update();
    let keys = std::mem::take(&mut self.pending_skip);
    self.take_in_flight(keys)
  }

  /// Steps to be marked abandoned; they become in flight until [ActiveExecution::mark_abandoned].
  pub fn get_steps_to_abandon(&mut self) -> Vec<Arc<ExecutionStep>> {
    self.update();
    let keys = std::mem::take(&mut self.pending_abandon);
    self.take_in_flight(keys)
  }

  fn take_in_flight(&mut self, keys: Vec<String>) -> Vec<Arc<ExecutionStep>> {
    let mut steps = vec![];
    for key in keys {
      if let Ok(step) = self.plan.get_step_by_key(&key) {
        steps.push(step.clone());
      }
      self.in_flight.insert(key);
    }
    steps
  }

  fn leave_in_flight(&mut self, key: &str, transition: &str) -> Result<(), ActiveExecutionError> {
    if !self.plan.has_step(key) {
      return Err(ActiveExecutionError::UnknownStep {
        key: key.to_string(),
      });
    }
    if !self.in_flight.remove(key) {
      return Err(ActiveExecutionError::NotInFlight {
        key: key.to_string(),
        transition: transition.to_string(),
      });
    }
    Ok(())
  }

  pub fn mark_success(&mut self, key: &str) -> Result<(), ActiveExecutionError> {
    self.leave_in_flight(key, "succeeded")?;
    debug!(step_key = %key, "step succeeded");
    self.succeeded.insert(key.to_string());
    Ok(())
  }

  /// Downstream steps with no other source for their inputs are abandoned on the next update.
  pub fn mark_failed(&mut self, key: &str) -> Result<(), ActiveExecutionError> {
    self.leave_in_flight(key, "failed")?;
    debug!(step_key = %key, "step failed");
    self.failed.insert(key.to_string());
    Ok(())
  }

  pub fn mark_skipped(&mut self, key: &str) -> Result<(), ActiveExecutionError> {
    self.leave_in_flight(key, "skipped")?;
    debug!(step_key = %key, "step skipped");
    self.skipped.insert(key.to_string());
    Ok(())
  }

  pub fn mark_abandoned(&mut self, key: &str) -> Result<(), ActiveExecutionError> {
    self.leave_in_flight(key, "abandoned")?;
    warn!(step_key = %key, "step abandoned");
    self.abandoned.insert(key.to_string());
    Ok(())
  }

  /// Re-queues `key`: parked until `at_time` if given, otherwise pending again.
  /// Outputs the failed attempt produced are forgotten.
  ///
  /// Deferred retries abandon the step in this run; disabled retries are an error.
  pub fn mark_up_for_retry(
    &mut self,
    key: &str,
    at_time: Option<Instant>,
  ) -> Result<(), ActiveExecutionError> {
    if self.retry_mode.disabled() {
      return Err(ActiveExecutionError::RetriesDisabled {
        key: key.to_string(),
      });
    }
    self.leave_in_flight(key, "up for retry")?;
    self.successful_step_outputs.retain(|h| h.step_key != key);
    if self.retry_mode.deferred() {
      debug!(step_key = %key, "retry deferred, step abandoned in this run");
      self.abandoned.insert(key.to_string());
      return Ok(());
    }
    self.retry_state.mark_attempt(key);
    match at_time {
      Some(at) => {
        debug!(step_key = %key, "step waiting to retry");
        self.waiting_to_retry.insert(key.to_string(), at);
      }
      None => {
        let deps = self
          .plan
          .execution_deps()
          .get(key)
          .cloned()
          .unwrap_or_default();
        debug!(step_key = %key, "step re-queued for retry");
        self.pending.insert(key.to_string(), deps);
      }
    }
    Ok(())
  }

  /// Records that an in-flight step was told to stop.
  pub fn mark_interrupted(&mut self, key: &str) {
    self.interrupted.insert(key.to_string());
  }

  pub fn mark_step_produced_output(&mut self, handle: StepOutputHandle) {
    self.successful_step_outputs.insert(handle);
  }

  /// Called when a step's event stream ends.
  ///
  /// A step still in flight at that point never reported a terminal outcome: it is
  /// abandoned if it was interrupted, otherwise it lands in `unknown_state`.
  pub fn verify_complete(&mut self, key: &str) {
    if !self.in_flight.remove(key) {
      return;
    }
    if self.interrupted.contains(key) {
      warn!(step_key = %key, "interrupted step abandoned");
      self.abandoned.insert(key.to_string());
    } else {
      error!(step_key = %key, "step finished without a terminal event");
      self.unknown_state.insert(key.to_string());
    }
  }

  /// Feeds a step event back into the state machine.
  pub fn handle_event(&mut self, event: &Event) -> Result<(), ActiveExecutionError> {
    let Some(key) = event.step_key.as_deref() else {
      return Ok(());
    };
    match &event.kind {
      EventKind::StepSuccess { .. } => self.mark_success(key),
      EventKind::StepFailure { .. } => self.mark_failed(key),
      EventKind::StepSkipped => self.mark_skipped(key),
      EventKind::StepUpForRetry {
        seconds_to_wait, ..
      } => {
        let at = seconds_to_wait
          .filter(|s| s.is_finite() && *s > 0.0)
          .map(|s| Instant::now() + Duration::from_secs_f64(s));
        self.mark_up_for_retry(key, at)
      }
      EventKind::StepOutput { .. } => {
        if let Some(handle) = event.output_handle() {
          self.mark_step_produced_output(handle);
        }
        Ok(())
      }
      _ => Ok(()),
    }
  }

  /// Sleeps until the earliest waiting retry is due, unless something is already executable.
  pub async fn sleep_til_ready(&self) {
    if !self.executable.is_empty() {
      return;
    }
    if let Some(at) = self.waiting_to_retry.values().min() {
      tokio::time::sleep_until(*at).await;
    }
  }

  pub fn has_in_flight_steps(&self) -> bool {
    !self.in_flight.is_empty()
  }

  pub fn has_waiting_to_retry(&self) -> bool {
    !self.waiting_to_retry.is_empty()
  }

  pub fn in_flight_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.in_flight.iter().cloned().collect();
    keys.sort();
    keys
  }

  pub fn is_complete(&self) -> bool {
    self.pending.is_empty()
      && self.executable.is_empty()
      && self.pending_skip.is_empty()
      && self.pending_abandon.is_empty()
      && self.waiting_to_retry.is_empty()
      && self.in_flight.is_empty()
  }

  pub fn step_state(&self, key: &str) -> Option<StepState> {
    let state = if self.pending.contains_key(key) {
      StepState::Pending
    } else if self.executable.iter().any(|k| k == key) {
      StepState::Executable
    } else if self.pending_skip.iter().any(|k| k == key) {
      StepState::PendingSkip
    } else if self.pending_abandon.iter().any(|k| k == key) {
      StepState::PendingAbandon
    } else if self.waiting_to_retry.contains_key(key) {
      StepState::WaitingToRetry
    } else if self.in_flight.contains(key) {
      StepState::InFlight
    } else if self.succeeded.contains(key) {
      StepState::Succeeded
    } else if self.failed.contains(key) {
      StepState::Failed
    } else if self.skipped.contains(key) {
      StepState::Skipped
    } else if self.abandoned.contains(key) {
      StepState::Abandoned
    } else if self.unknown_state.contains(key) {
      StepState::UnknownState
    } else {
      return None;
    };
    Some(state)
  }

  pub fn succeeded(&self) -> &BTreeSet<String> {
    &self.succeeded
  }

  pub fn failed(&self) -> &BTreeSet<String> {
    &self.failed
  }

  pub fn skipped(&self) -> &BTreeSet<String> {
    &self.skipped
  }

  pub fn abandoned(&self) -> &BTreeSet<String> {
    &self.abandoned
  }

  pub fn unknown_state(&self) -> &BTreeSet<String> {
    &self.unknown_state
  }

  pub fn was_interrupted(&self) -> bool {
    !self.interrupted.is_empty()
  }

  /// Keys not yet in a terminal bucket, sorted.
  fn incomplete_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self
      .plan
      .step_keys()
      .into_iter()
      .filter(|k| !self.is_terminal(k))
      .map(str::to_string)
      .collect();
    keys.sort();
    keys
  }

  /// Ends the session.
  ///
  /// Fails with `UnknownStepState` if any step never reported a terminal outcome, and
  /// with `IncompleteExecutionPlan` if steps remain unfinished without an interrupt.
  #[instrument(level = "trace", skip(self))]
  pub fn close(mut self) -> Result<(), ActiveExecutionError> {
    self.closed = true;
    if !self.unknown_state.is_empty() {
      return Err(ActiveExecutionError::UnknownStepState {
        steps: self.unknown_state.iter().cloned().collect(),
      });
    }
    if !self.is_complete() && !self.was_interrupted() {
      return Err(ActiveExecutionError::IncompleteExecutionPlan {
        steps: self.incomplete_keys(),
      });
    }
    Ok(())
  }
}

impl Drop for ActiveExecution {
  fn drop(&mut self) {
    if !self.closed {
      error!(
        pipeline = %self.plan.pipeline_name(),
        incomplete = ?self.incomplete_keys(),
        "active execution dropped without close"
      );
    }
  }
}

impl fmt::Debug for ActiveExecution {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ActiveExecution")
      .field("pipeline", &self.plan.pipeline_name())
      .field("retry_mode", &self.retry_mode)
      .field("pending", &self.pending.keys().collect::<Vec<_>>())
      .field("executable", &self.executable)
      .field("in_flight", &self.in_flight_keys())
      .field("succeeded", &self.succeeded)
      .field("failed", &self.failed)
      .field("skipped", &self.skipped)
      .field("abandoned", &self.abandoned)
      .field("unknown_state", &self.unknown_state)
      .finish_non_exhaustive()
  }
}
