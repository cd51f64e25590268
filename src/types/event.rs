//! Engine events emitted for every plan- and step-level transition.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ErrorInfo, SolidHandle, StepOutcome, StepOutputHandle};

/// Fieldless event type, used for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
  PlanStart,
  PlanSuccess,
  PlanFailure,
  StepStart,
  StepRestarted,
  StepOutput,
  StepSuccess,
  StepFailure,
  StepSkipped,
  StepUpForRetry,
  ExpectationResult,
  Materialization,
  EngineEvent,
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      EventType::PlanStart => "plan_start",
      EventType::PlanSuccess => "plan_success",
      EventType::PlanFailure => "plan_failure",
      EventType::StepStart => "step_start",
      EventType::StepRestarted => "step_restarted",
      EventType::StepOutput => "step_output",
      EventType::StepSuccess => "step_success",
      EventType::StepFailure => "step_failure",
      EventType::StepSkipped => "step_skipped",
      EventType::StepUpForRetry => "step_up_for_retry",
      EventType::ExpectationResult => "expectation_result",
      EventType::Materialization => "materialization",
      EventType::EngineEvent => "engine_event",
    };
    f.write_str(s)
  }
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
  PlanStart,
  PlanSuccess,
  PlanFailure {
    error: Option<ErrorInfo>,
  },
  StepStart,
  StepRestarted {
    attempt: u32,
  },
  /// Carries the value so out-of-process workers can stream it back.
  StepOutput {
    output_name: String,
    value: Value,
  },
  StepSuccess {
    duration_ms: u64,
  },
  StepFailure {
    error: ErrorInfo,
  },
  StepSkipped,
  StepUpForRetry {
    error: ErrorInfo,
    seconds_to_wait: Option<f64>,
    attempt: u32,
  },
  ExpectationResult {
    label: String,
    success: bool,
    description: Option<String>,
  },
  Materialization {
    label: String,
    path: String,
  },
  EngineEvent,
}

impl EventKind {
  pub fn event_type(&self) -> EventType {
    match self {
      EventKind::PlanStart => EventType::PlanStart,
      EventKind::PlanSuccess => EventType::PlanSuccess,
      EventKind::PlanFailure { .. } => EventType::PlanFailure,
      EventKind::StepStart => EventType::StepStart,
      EventKind::StepRestarted { .. } => EventType::StepRestarted,
      EventKind::StepOutput { .. } => EventType::StepOutput,
      EventKind::StepSuccess { .. } => EventType::StepSuccess,
      EventKind::StepFailure { .. } => EventType::StepFailure,
      EventKind::StepSkipped => EventType::StepSkipped,
      EventKind::StepUpForRetry { .. } => EventType::StepUpForRetry,
      EventKind::ExpectationResult { .. } => EventType::ExpectationResult,
      EventKind::Materialization { .. } => EventType::Materialization,
      EventKind::EngineEvent => EventType::EngineEvent,
    }
  }
}

/// One engine event, addressed to a run and optionally a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub run_id: Uuid,
  pub pipeline_name: String,
  pub timestamp: DateTime<Utc>,
  pub step_key: Option<String>,
  pub solid_handle: Option<SolidHandle>,
  pub message: String,
  #[serde(flatten)]
  pub kind: EventKind,
}

impl Event {
  pub fn plan_event(
    run_id: Uuid,
    pipeline_name: impl Into<String>,
    kind: EventKind,
    message: impl Into<String>,
  ) -> Self {
    Self {
      run_id,
      pipeline_name: pipeline_name.into(),
      timestamp: Utc::now(),
      step_key: None,
      solid_handle: None,
      message: message.into(),
      kind,
    }
  }

  pub fn step_event(
    run_id: Uuid,
    pipeline_name: impl Into<String>,
    step_key: impl Into<String>,
    solid_handle: SolidHandle,
    kind: EventKind,
    message: impl Into<String>,
  ) -> Self {
    Self {
      run_id,
      pipeline_name: pipeline_name.into(),
      timestamp: Utc::now(),
      step_key: Some(step_key.into()),
      solid_handle: Some(solid_handle),
      message: message.into(),
      kind,
    }
  }

  pub fn event_type(&self) -> EventType {
    self.kind.event_type()
  }

  pub fn is_step_event(&self) -> bool {
    self.step_key.is_some()
  }

  pub fn is_failure(&self) -> bool {
    matches!(
      self.kind,
      EventKind::StepFailure { .. } | EventKind::PlanFailure { .. }
    )
  }

  /// Output handle produced by a `StepOutput` event.
  pub fn output_handle(&self) -> Option<StepOutputHandle> {
    match (&self.kind, &self.step_key) {
      (EventKind::StepOutput { output_name, .. }, Some(key)) => {
        Some(StepOutputHandle::new(key.clone(), output_name.clone()))
      }
      _ => None,
    }
  }

  /// Terminal outcome carried by this event, if it is a terminal step event.
  pub fn step_outcome(&self) -> Option<StepOutcome> {
    match &self.kind {
      EventKind::StepSuccess { .. } => Some(StepOutcome::Success),
      EventKind::StepFailure { error } => Some(StepOutcome::Failure(error.clone())),
      EventKind::StepSkipped => Some(StepOutcome::Skip),
      EventKind::StepUpForRetry {
        seconds_to_wait, ..
      } => Some(StepOutcome::Retry {
        seconds_to_wait: *seconds_to_wait,
      }),
      _ => None,
    }
  }
}
