//! Chained builder for [GraphDefinition]s.
//!
//! Each builder is an explicit value threaded through construction, so independent
//! graphs can be built concurrently.

use super::{
  FanInMember, GraphDefinition, InputSource, NodeDefinition, SolidInputHandle, SolidInvocation,
  SolidOutputHandle,
};
use crate::error::DefinitionError;

/// Builds a [GraphDefinition] from solid invocations and connections.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
  name: String,
  solids: Vec<SolidInvocation>,
  dependencies: Vec<(SolidInputHandle, InputSource)>,
}

impl GraphBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      solids: vec![],
      dependencies: vec![],
    }
  }

  /// Adds a solid invoked under its definition name.
  pub fn add_solid(mut self, definition: impl Into<NodeDefinition>) -> Self {
    self.solids.push(SolidInvocation::new(definition));
    self
  }

  /// Adds a solid invoked under `alias`.
  pub fn add_aliased(mut self, alias: impl Into<String>, definition: impl Into<NodeDefinition>) -> Self {
    self.solids.push(SolidInvocation::aliased(alias, definition));
    self
  }

  pub fn add_invocation(mut self, invocation: SolidInvocation) -> Self {
    self.solids.push(invocation);
    self
  }

  /// Connects `from.output` to `to.input`.
  pub fn connect(mut self, from: &str, output: &str, to: &str, input: &str) -> Self {
    self.dependencies.push((
      SolidInputHandle::new(to, input),
      InputSource::Single(SolidOutputHandle::new(from, output)),
    ));
    self
  }

  /// Fans the listed `(solid, output)` pairs into `to.input`.
  pub fn fan_in(mut self, to: &str, input: &str, sources: &[(&str, &str)]) -> Self {
    let members = sources
      .iter()
      .map(|(s, o)| FanInMember::Output(SolidOutputHandle::new(*s, *o)))
      .collect();
    self
      .dependencies
      .push((SolidInputHandle::new(to, input), InputSource::FanIn(members)));
    self
  }

  /// Fan-in with explicit members, including mapped-input placeholders.
  pub fn fan_in_members(mut self, to: &str, input: &str, members: Vec<FanInMember>) -> Self {
    self
      .dependencies
      .push((SolidInputHandle::new(to, input), InputSource::FanIn(members)));
    self
  }

  pub fn build(self) -> Result<GraphDefinition, DefinitionError> {
    GraphDefinition::new(self.name, self.solids, self.dependencies)
  }
}
