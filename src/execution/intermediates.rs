//! Values produced by step outputs during a run, addressed by [StepOutputHandle].

use std::collections::HashMap;

use serde_json::Value;

use crate::plan::{ExecutionStep, StepInputSource};
use crate::types::{InputValues, StepOutputHandle};

/// In-memory intermediate store. Values are dropped only when their producer is retried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intermediates {
  values: HashMap<StepOutputHandle, Value>,
}

impl Intermediates {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_values(values: HashMap<StepOutputHandle, Value>) -> Self {
    Self { values }
  }

  pub fn insert(&mut self, handle: StepOutputHandle, value: Value) {
    self.values.insert(handle, value);
  }

  /// Drops every value produced by `step_key`.
  pub fn remove_step(&mut self, step_key: &str) {
    self.values.retain(|h, _| h.step_key != step_key);
  }

  pub fn get(&self, handle: &StepOutputHandle) -> Option<&Value> {
    self.values.get(handle)
  }

  pub fn contains(&self, handle: &StepOutputHandle) -> bool {
    self.values.contains_key(handle)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn values(&self) -> &HashMap<StepOutputHandle, Value> {
    &self.values
  }

  /// Values for `step`'s inputs. Fan-in inputs hold only the members that were produced,
  /// in member order; a single-source input whose value is missing is left out.
  pub fn gather_inputs(&self, step: &ExecutionStep) -> InputValues {
    let mut inputs = InputValues::new();
    for input in step.inputs() {
      match &input.source {
        StepInputSource::Single(handle) => {
          if let Some(value) = self.values.get(handle) {
            inputs.insert(input.name.clone(), value.clone());
          }
        }
        StepInputSource::FanIn(handles) => {
          let values = handles
            .iter()
            .filter_map(|h| self.values.get(h).cloned())
            .collect();
          inputs.insert(input.name.clone(), Value::Array(values));
        }
      }
    }
    inputs
  }

  /// Values `step` reads, keyed by handle (used to ship known state to a step worker).
  pub fn values_for(&self, step: &ExecutionStep) -> HashMap<StepOutputHandle, Value> {
    step
      .inputs()
      .iter()
      .flat_map(|i| i.source.handles())
      .filter_map(|h| self.values.get(h).map(|v| (h.clone(), v.clone())))
      .collect()
  }
}
