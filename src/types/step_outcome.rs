//! Terminal outcome of one step attempt.

use std::fmt;

use super::ErrorInfo;

/// Terminal outcome of one step attempt, fed back into the active execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
  Success,
  Failure(ErrorInfo),
  Skip,
  Retry { seconds_to_wait: Option<f64> },
}

impl StepOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, StepOutcome::Success)
  }
}

impl fmt::Display for StepOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepOutcome::Success => write!(f, "success"),
      StepOutcome::Failure(_) => write!(f, "failure"),
      StepOutcome::Skip => write!(f, "skip"),
      StepOutcome::Retry { .. } => write!(f, "retry"),
    }
  }
}
