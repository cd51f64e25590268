//! Runtime expectations: predicates checked against an input or output value.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::execution::StepContext;

/// Result of evaluating one expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationResult {
  pub success: bool,
  pub description: Option<String>,
}

impl ExpectationResult {
  pub fn passed() -> Self {
    Self {
      success: true,
      description: None,
    }
  }

  pub fn failed(description: impl Into<String>) -> Self {
    Self {
      success: false,
      description: Some(description.into()),
    }
  }
}

type ExpectationFn = dyn Fn(&StepContext, &Value) -> ExpectationResult + Send + Sync;

/// A named predicate compiled into its own expectation step.
#[derive(Clone)]
pub struct ExpectationDefinition {
  pub name: String,
  pub description: Option<String>,
  predicate: Arc<ExpectationFn>,
}

impl ExpectationDefinition {
  pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
  where
    F: Fn(&StepContext, &Value) -> ExpectationResult + Send + Sync + 'static,
  {
    Self {
      name: name.into(),
      description: None,
      predicate: Arc::new(predicate),
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn evaluate(&self, context: &StepContext, value: &Value) -> ExpectationResult {
    (self.predicate)(context, value)
  }
}

impl fmt::Debug for ExpectationDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExpectationDefinition")
      .field("name", &self.name)
      .field("description", &self.description)
      .finish_non_exhaustive()
  }
}
