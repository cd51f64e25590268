//! Context handed to user compute for one step invocation.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::plan::ExecutionStep;
use crate::types::SolidHandle;

/// Resource instances acquired for a run, keyed by resource name.
#[derive(Clone, Default)]
pub struct Resources {
  map: Arc<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Resources {
  pub fn new(map: HashMap<String, Arc<dyn Any + Send + Sync>>) -> Self {
    Self { map: Arc::new(map) }
  }

  /// Returns the resource `name` if it exists and has type `T`.
  pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
    self
      .map
      .get(name)
      .cloned()
      .and_then(|r| r.downcast::<T>().ok())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.map.contains_key(name)
  }

  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

impl std::fmt::Debug for Resources {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Resources")
      .field("names", &self.names())
      .finish()
  }
}

/// Context for one step invocation.
#[derive(Debug, Clone)]
pub struct StepContext {
  pub run_id: Uuid,
  pub pipeline_name: String,
  pub step_key: String,
  pub solid_handle: SolidHandle,
  /// The solid's `config` value from the run config (`null` if absent).
  pub solid_config: Value,
  pub tags: BTreeMap<String, String>,
  /// Number of earlier attempts of this step in this run.
  pub retry_attempt: u32,
  pub resources: Resources,
}

impl StepContext {
  pub fn new(
    run_id: Uuid,
    pipeline_name: impl Into<String>,
    step: &ExecutionStep,
    retry_attempt: u32,
    resources: Resources,
  ) -> Self {
    Self {
      run_id,
      pipeline_name: pipeline_name.into(),
      step_key: step.key.clone(),
      solid_handle: step.solid_handle.clone(),
      solid_config: step.solid_config.clone(),
      tags: step.tags.clone(),
      retry_attempt,
      resources,
    }
  }

  pub fn resource<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
    self.resources.get(name)
  }

  pub fn is_retry(&self) -> bool {
    self.retry_attempt > 0
  }
}
