//! User compute contract: a compute function turns resolved inputs into a finite,
//! one-pass stream of [ComputeEvent]s.
//!
//! The stream is consumed by the step executor. Dropping it before it is exhausted
//! is how the executor closes a compute early (e.g. after a contract violation).

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use thiserror::Error;

use super::StepContext;
use crate::types::InputValues;

/// Name of the single output used by [lambda] computes.
pub const DEFAULT_OUTPUT: &str = "result";

/// Event yielded by user compute.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeEvent {
  Output {
    name: String,
    value: Value,
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
}

impl ComputeEvent {
  pub fn output(name: impl Into<String>, value: Value) -> Self {
    ComputeEvent::Output {
      name: name.into(),
      value,
    }
  }
}

/// Error raised by user compute.
#[derive(Error, Debug)]
pub enum ComputeError {
  /// Arbitrary user error; the source chain is preserved in the failure event.
  #[error("{message}")]
  UserCode {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
  },
  /// Explicit, expected failure.
  #[error("{description}")]
  Failure { description: String },
  /// Ask the engine to re-run the step.
  #[error("retry requested (max_retries={max_retries})")]
  RetryRequested {
    max_retries: u32,
    seconds_to_wait: Option<f64>,
    cause: Option<String>,
  },
}

impl ComputeError {
  pub fn user(message: impl Into<String>) -> Self {
    ComputeError::UserCode {
      message: message.into(),
      source: None,
    }
  }

  pub fn from_source(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
    ComputeError::UserCode {
      message: message.into(),
      source: Some(Box::new(source)),
    }
  }

  pub fn failure(description: impl Into<String>) -> Self {
    ComputeError::Failure {
      description: description.into(),
    }
  }

  pub fn retry(max_retries: u32, seconds_to_wait: Option<f64>) -> Self {
    ComputeError::RetryRequested {
      max_retries,
      seconds_to_wait,
      cause: None,
    }
  }

  pub fn class_name(&self) -> &'static str {
    match self {
      ComputeError::UserCode { .. } => "UserCodeError",
      ComputeError::Failure { .. } => "Failure",
      ComputeError::RetryRequested { .. } => "RetryRequested",
    }
  }
}

/// Stream of compute events produced by one invocation.
pub type ComputeStream = BoxStream<'static, Result<ComputeEvent, ComputeError>>;

/// A user compute function.
pub trait ComputeFn: Send + Sync {
  fn compute(&self, context: StepContext, inputs: InputValues) -> ComputeStream;
}

impl<F> ComputeFn for F
where
  F: Fn(StepContext, InputValues) -> ComputeStream + Send + Sync,
{
  fn compute(&self, context: StepContext, inputs: InputValues) -> ComputeStream {
    self(context, inputs)
  }
}

/// Wraps a closure returning a [ComputeStream].
pub fn compute_fn<F>(f: F) -> Arc<dyn ComputeFn>
where
  F: Fn(StepContext, InputValues) -> ComputeStream + Send + Sync + 'static,
{
  Arc::new(f)
}

/// Wraps an async closure producing one value on the [DEFAULT_OUTPUT] output.
pub fn lambda<F, Fut>(f: F) -> Arc<dyn ComputeFn>
where
  F: Fn(StepContext, InputValues) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Value, ComputeError>> + Send + 'static,
{
  Arc::new(move |context: StepContext, inputs: InputValues| -> ComputeStream {
    stream::once(f(context, inputs))
      .map(|r| r.map(|value| ComputeEvent::output(DEFAULT_OUTPUT, value)))
      .boxed()
  })
}
