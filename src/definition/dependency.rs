//! Dependency structure: which upstream outputs satisfy each solid input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// (solid name, input name) inside one graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SolidInputHandle {
  pub solid: String,
  pub input: String,
}

impl SolidInputHandle {
  pub fn new(solid: impl Into<String>, input: impl Into<String>) -> Self {
    Self {
      solid: solid.into(),
      input: input.into(),
    }
  }
}

/// (solid name, output name) inside one graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SolidOutputHandle {
  pub solid: String,
  pub output: String,
}

impl SolidOutputHandle {
  pub fn new(solid: impl Into<String>, output: impl Into<String>) -> Self {
    Self {
      solid: solid.into(),
      output: output.into(),
    }
  }
}

/// One member of a fan-in dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanInMember {
  Output(SolidOutputHandle),
  /// Slot filled by an input mapping of the enclosing composite.
  MappedInput,
}

/// Where a solid input gets its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
  Single(SolidOutputHandle),
  FanIn(Vec<FanInMember>),
}

impl InputSource {
  /// Upstream outputs referenced by this source, in declaration order.
  pub fn upstream_outputs(&self) -> Vec<&SolidOutputHandle> {
    match self {
      InputSource::Single(h) => vec![h],
      InputSource::FanIn(members) => members
        .iter()
        .filter_map(|m| match m {
          FanInMember::Output(h) => Some(h),
          FanInMember::MappedInput => None,
        })
        .collect(),
    }
  }

  pub fn placeholder_count(&self) -> usize {
    match self {
      InputSource::Single(_) => 0,
      InputSource::FanIn(members) => members
        .iter()
        .filter(|m| matches!(m, FanInMember::MappedInput))
        .count(),
    }
  }

  pub fn is_fan_in(&self) -> bool {
    matches!(self, InputSource::FanIn(_))
  }
}

/// Mapping from solid input to its source, for one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyStructure {
  sources: BTreeMap<SolidInputHandle, InputSource>,
}

impl DependencyStructure {
  pub(crate) fn insert(&mut self, handle: SolidInputHandle, source: InputSource) -> bool {
    if self.sources.contains_key(&handle) {
      return false;
    }
    self.sources.insert(handle, source);
    true
  }

  pub fn source(&self, solid: &str, input: &str) -> Option<&InputSource> {
    self.sources.get(&SolidInputHandle::new(solid, input))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&SolidInputHandle, &InputSource)> {
    self.sources.iter()
  }

  /// Distinct upstream solid names of `solid`, sorted.
  pub fn upstream_solids(&self, solid: &str) -> Vec<&str> {
    let mut names: Vec<&str> = self
      .sources
      .iter()
      .filter(|(h, _)| h.solid == solid)
      .flat_map(|(_, s)| s.upstream_outputs())
      .map(|h| h.solid.as_str())
      .collect();
    names.sort_unstable();
    names.dedup();
    names
  }

  pub fn len(&self) -> usize {
    self.sources.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sources.is_empty()
  }
}
