//! Retry policy of a run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How retry requests raised by user compute are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
  /// Retry requests re-queue the step in this run.
  #[default]
  Enabled,
  /// Retry requests become step failures.
  Disabled,
  /// Retry requests are acknowledged but re-attempted elsewhere; the step is abandoned here.
  Deferred,
}

impl RetryMode {
  pub fn enabled(&self) -> bool {
    matches!(self, RetryMode::Enabled)
  }

  pub fn disabled(&self) -> bool {
    matches!(self, RetryMode::Disabled)
  }

  pub fn deferred(&self) -> bool {
    matches!(self, RetryMode::Deferred)
  }
}

impl fmt::Display for RetryMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RetryMode::Enabled => write!(f, "enabled"),
      RetryMode::Disabled => write!(f, "disabled"),
      RetryMode::Deferred => write!(f, "deferred"),
    }
  }
}

impl FromStr for RetryMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "enabled" => Ok(RetryMode::Enabled),
      "disabled" => Ok(RetryMode::Disabled),
      "deferred" => Ok(RetryMode::Deferred),
      other => Err(format!("unknown retry mode '{}'", other)),
    }
  }
}
