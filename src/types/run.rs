//! Persisted record of one execution attempt.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  #[default]
  NotStarted,
  Started,
  Success,
  Failure,
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunStatus::NotStarted => write!(f, "not_started"),
      RunStatus::Started => write!(f, "started"),
      RunStatus::Success => write!(f, "success"),
      RunStatus::Failure => write!(f, "failure"),
    }
  }
}

/// One execution attempt of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
  pub run_id: Uuid,
  pub pipeline_name: String,
  pub mode: String,
  pub status: RunStatus,
  pub tags: BTreeMap<String, String>,
  /// Resolved run configuration as JSON.
  pub run_config: Value,
  pub step_keys_to_execute: Option<Vec<String>>,
}

impl Run {
  pub fn new(pipeline_name: impl Into<String>, mode: impl Into<String>, run_config: Value) -> Self {
    Self {
      run_id: Uuid::new_v4(),
      pipeline_name: pipeline_name.into(),
      mode: mode.into(),
      status: RunStatus::NotStarted,
      tags: BTreeMap::new(),
      run_config,
      step_keys_to_execute: None,
    }
  }

  pub fn with_run_id(mut self, run_id: Uuid) -> Self {
    self.run_id = run_id;
    self
  }

  pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.tags.insert(key.into(), value.into());
    self
  }

  pub fn with_step_keys(mut self, step_keys: Option<Vec<String>>) -> Self {
    self.step_keys_to_execute = step_keys;
    self
  }

  pub fn is_finished(&self) -> bool {
    matches!(self.status, RunStatus::Success | RunStatus::Failure)
  }
}
