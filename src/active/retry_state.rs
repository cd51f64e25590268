//! Per-step retry attempt counts for one run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Number of retries already requested by each step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
  attempts: BTreeMap<String, u32>,
}

impl RetryState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seeds counts carried over from another process.
  pub fn from_attempts(attempts: BTreeMap<String, u32>) -> Self {
    Self { attempts }
  }

  /// Attempt number of the next run of `key` (0 for the first attempt).
  pub fn get_attempt_count(&self, key: &str) -> u32 {
    self.attempts.get(key).copied().unwrap_or(0)
  }

  pub fn mark_attempt(&mut self, key: &str) {
    *self.attempts.entry(key.to_string()).or_insert(0) += 1;
  }

  pub fn attempts(&self) -> &BTreeMap<String, u32> {
    &self.attempts
  }
}
