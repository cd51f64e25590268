//! Addressing handles: solid paths inside nested graphs and step outputs inside a plan.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Path of a solid invocation through nested composites (`outer.inner`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SolidHandle {
  pub path: Vec<String>,
}

impl SolidHandle {
  pub fn root(name: impl Into<String>) -> Self {
    Self {
      path: vec![name.into()],
    }
  }

  /// Handle of `name` invoked inside the composite addressed by `parent`.
  pub fn new(name: impl Into<String>, parent: Option<&SolidHandle>) -> Self {
    match parent {
      Some(p) => p.child(name),
      None => Self::root(name),
    }
  }

  pub fn child(&self, name: impl Into<String>) -> Self {
    let mut path = self.path.clone();
    path.push(name.into());
    Self { path }
  }

  /// The invocation name (last path segment).
  pub fn name(&self) -> &str {
    self.path.last().map(String::as_str).unwrap_or("")
  }

  pub fn parent(&self) -> Option<SolidHandle> {
    if self.path.len() <= 1 {
      return None;
    }
    Some(Self {
      path: self.path[..self.path.len() - 1].to_vec(),
    })
  }

  pub fn to_key(&self) -> String {
    self.path.join(".")
  }
}

impl fmt::Display for SolidHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_key())
  }
}

/// (producing step key, output name) pair addressing one intermediate value.
///
/// Compared and hashed by value; used as a map key for intermediates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepOutputHandle {
  pub step_key: String,
  pub output_name: String,
}

impl StepOutputHandle {
  pub fn new(step_key: impl Into<String>, output_name: impl Into<String>) -> Self {
    Self {
      step_key: step_key.into(),
      output_name: output_name.into(),
    }
  }
}

impl fmt::Display for StepOutputHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.step_key, self.output_name)
  }
}
