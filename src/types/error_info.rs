//! Serializable error information carried by failure events.
//!
//! User errors are flattened here at the step error boundary: the message, the
//! `source()` chain, and the error class survive re-raising in user-facing
//! contexts without any engine frames attached.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Serializable snapshot of an error and its cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
  /// Short error class (e.g. "UserCodeError", "TypeCheckFailure").
  pub class_name: String,
  pub message: String,
  /// Messages of `source()` errors, outermost first.
  pub causes: Vec<String>,
}

impl ErrorInfo {
  pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      class_name: class_name.into(),
      message: message.into(),
      causes: vec![],
    }
  }

  /// Captures `err` and walks its `source()` chain.
  pub fn from_error(class_name: impl Into<String>, err: &(dyn Error + 'static)) -> Self {
    let mut causes = vec![];
    let mut source = err.source();
    while let Some(cause) = source {
      causes.push(cause.to_string());
      source = cause.source();
    }
    Self {
      class_name: class_name.into(),
      message: err.to_string(),
      causes,
    }
  }

  pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
    self.causes.push(cause.into());
    self
  }
}

impl fmt::Display for ErrorInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.class_name, self.message)?;
    for cause in &self.causes {
      write!(f, "\n  caused by: {}", cause)?;
    }
    Ok(())
  }
}
