//! Bucket a step currently occupies in an active execution.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepState {
  Pending,
  Executable,
  PendingSkip,
  PendingAbandon,
  WaitingToRetry,
  InFlight,
  Succeeded,
  Failed,
  Skipped,
  Abandoned,
  UnknownState,
}

impl StepState {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      StepState::Succeeded
        | StepState::Failed
        | StepState::Skipped
        | StepState::Abandoned
        | StepState::UnknownState
    )
  }
}

impl fmt::Display for StepState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      StepState::Pending => "pending",
      StepState::Executable => "executable",
      StepState::PendingSkip => "pending_skip",
      StepState::PendingAbandon => "pending_abandon",
      StepState::WaitingToRetry => "waiting_to_retry",
      StepState::InFlight => "in_flight",
      StepState::Succeeded => "succeeded",
      StepState::Failed => "failed",
      StepState::Skipped => "skipped",
      StepState::Abandoned => "abandoned",
      StepState::UnknownState => "unknown_state",
    };
    f.write_str(s)
  }
}
