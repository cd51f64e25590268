//! Event log save/load (JSON) and the re-execution state derived from it.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::active::RetryState;
use crate::engine::EventSink;
use crate::plan::ExecutionPlan;
use crate::types::{Event, EventKind, RunStatus, StepOutputHandle};

/// Default filename for the event log under a run directory.
pub const EVENT_LOG_FILENAME: &str = "events.json";

/// Current event log format version.
pub const EVENT_LOG_VERSION: u32 = 1;

/// Root structure of an event log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
  pub version: u32,
  pub run_id: Uuid,
  pub pipeline_name: String,
  pub started_at: DateTime<Utc>,
  /// Set once the plan-level closing event is recorded.
  pub finished_at: Option<DateTime<Utc>>,
  pub events: Vec<Event>,
}

impl EventLog {
  pub fn new(run_id: Uuid, pipeline_name: impl Into<String>) -> Self {
    Self {
      version: EVENT_LOG_VERSION,
      run_id,
      pipeline_name: pipeline_name.into(),
      started_at: Utc::now(),
      finished_at: None,
      events: vec![],
    }
  }

  pub fn push(&mut self, event: Event) {
    if matches!(event.kind, EventKind::PlanSuccess | EventKind::PlanFailure { .. }) {
      self.finished_at = Some(event.timestamp);
    }
    self.events.push(event);
  }

  /// Run status implied by the recorded plan events.
  pub fn status(&self) -> RunStatus {
    self
      .events
      .iter()
      .rev()
      .find_map(|e| match e.kind {
        EventKind::PlanSuccess => Some(RunStatus::Success),
        EventKind::PlanFailure { .. } => Some(RunStatus::Failure),
        EventKind::PlanStart => Some(RunStatus::Started),
        _ => None,
      })
      .unwrap_or(RunStatus::NotStarted)
  }
}

/// Saves an event log to `path` as JSON, creating the parent directory if needed.
#[instrument(level = "trace", skip(path, log))]
pub fn save_event_log(path: &Path, log: &EventLog) -> Result<(), std::io::Error> {
  let json = serde_json::to_string_pretty(log)
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, json)
}

/// Loads an event log from `path`. Returns error if file is missing or invalid JSON.
#[instrument(level = "trace", skip(path))]
pub fn load_event_log(path: &Path) -> Result<EventLog, std::io::Error> {
  let bytes = std::fs::read(path)?;
  serde_json::from_slice(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// What a follow-up run needs to resume an earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct ReexecutionState {
  /// True if the logged run already finished successfully.
  pub already_completed: bool,
  /// Steps of the plan that did not succeed, in plan order.
  pub step_keys_to_execute: Vec<String>,
  /// Outputs produced by steps that succeeded.
  pub known_outputs: HashMap<StepOutputHandle, Value>,
  /// Attempt counts observed in the log.
  pub retry_state: RetryState,
}

impl ReexecutionState {
  /// Derives re-execution state for `plan` from a logged run of the same pipeline.
  pub fn from_event_log(log: &EventLog, plan: &ExecutionPlan) -> Self {
    let succeeded: BTreeSet<&str> = log
      .events
      .iter()
      .filter(|e| matches!(e.kind, EventKind::StepSuccess { .. }))
      .filter_map(|e| e.step_key.as_deref())
      .collect();

    let mut known_outputs = HashMap::new();
    let mut attempts = std::collections::BTreeMap::new();
    for event in &log.events {
      match (&event.kind, event.step_key.as_deref()) {
        (EventKind::StepOutput { value, .. }, Some(key)) if succeeded.contains(key) => {
          if let Some(handle) = event.output_handle() {
            known_outputs.insert(handle, value.clone());
          }
        }
        (EventKind::StepUpForRetry { attempt, .. }, Some(key)) if !succeeded.contains(key) => {
          attempts.insert(key.to_string(), *attempt);
        }
        _ => {}
      }
    }

    let step_keys_to_execute = plan
      .steps()
      .iter()
      .filter(|s| !succeeded.contains(s.key.as_str()))
      .map(|s| s.key.clone())
      .collect();

    Self {
      already_completed: log.status() == RunStatus::Success,
      step_keys_to_execute,
      known_outputs,
      retry_state: RetryState::from_attempts(attempts),
    }
  }
}

/// Event sink that rewrites the event log file after every event.
#[derive(Debug)]
pub struct JsonFileEventSink {
  path: PathBuf,
  log: Mutex<EventLog>,
}

impl JsonFileEventSink {
  pub fn new(path: impl Into<PathBuf>, run_id: Uuid, pipeline_name: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      log: Mutex::new(EventLog::new(run_id, pipeline_name)),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub async fn snapshot(&self) -> EventLog {
    self.log.lock().await.clone()
  }
}

#[async_trait]
impl EventSink for JsonFileEventSink {
  async fn handle_event(&self, event: &Event) {
    let mut log = self.log.lock().await;
    log.push(event.clone());
    if let Err(e) = save_event_log(&self.path, &log) {
      error!(path = %self.path.display(), error = %e, "could not write event log");
    }
  }
}
