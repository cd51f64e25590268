//! Node definitions (solid or composite) and their invocations inside a graph.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{CompositeDefinition, InputDefinition, OutputDefinition, SolidDefinition};

/// Either a leaf solid or a composite sub-graph.
#[derive(Debug, Clone)]
pub enum NodeDefinition {
  Solid(Arc<SolidDefinition>),
  Composite(Arc<CompositeDefinition>),
}

impl NodeDefinition {
  pub fn name(&self) -> &str {
    match self {
      NodeDefinition::Solid(s) => &s.name,
      NodeDefinition::Composite(c) => &c.name,
    }
  }

  pub fn input_defs(&self) -> Vec<&InputDefinition> {
    match self {
      NodeDefinition::Solid(s) => s.inputs.iter().collect(),
      NodeDefinition::Composite(c) => c.input_mappings.iter().map(|m| &m.definition).collect(),
    }
  }

  pub fn output_defs(&self) -> Vec<&OutputDefinition> {
    match self {
      NodeDefinition::Solid(s) => s.outputs.iter().collect(),
      NodeDefinition::Composite(c) => c.output_mappings.iter().map(|m| &m.definition).collect(),
    }
  }

  pub fn input_def(&self, name: &str) -> Option<&InputDefinition> {
    self.input_defs().into_iter().find(|d| d.name == name)
  }

  pub fn output_def(&self, name: &str) -> Option<&OutputDefinition> {
    self.output_defs().into_iter().find(|d| d.name == name)
  }

  pub fn tags(&self) -> &BTreeMap<String, String> {
    match self {
      NodeDefinition::Solid(s) => &s.tags,
      NodeDefinition::Composite(c) => &c.tags,
    }
  }

  pub fn is_composite(&self) -> bool {
    matches!(self, NodeDefinition::Composite(_))
  }
}

impl From<SolidDefinition> for NodeDefinition {
  fn from(def: SolidDefinition) -> Self {
    NodeDefinition::Solid(Arc::new(def))
  }
}

impl From<CompositeDefinition> for NodeDefinition {
  fn from(def: CompositeDefinition) -> Self {
    NodeDefinition::Composite(Arc::new(def))
  }
}

/// A named use of a node definition inside a graph.
#[derive(Debug, Clone)]
pub struct SolidInvocation {
  /// Name unique within the graph (defaults to the definition name).
  pub name: String,
  pub definition: NodeDefinition,
  /// Invocation tags, merged over the definition's tags.
  pub tags: BTreeMap<String, String>,
}

impl SolidInvocation {
  pub fn new(definition: impl Into<NodeDefinition>) -> Self {
    let definition = definition.into();
    Self {
      name: definition.name().to_string(),
      definition,
      tags: BTreeMap::new(),
    }
  }

  pub fn aliased(alias: impl Into<String>, definition: impl Into<NodeDefinition>) -> Self {
    Self {
      name: alias.into(),
      definition: definition.into(),
      tags: BTreeMap::new(),
    }
  }

  pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.tags.insert(key.into(), value.into());
    self
  }

  /// Definition tags overlaid with invocation tags.
  pub fn merged_tags(&self) -> BTreeMap<String, String> {
    let mut tags = self.definition.tags().clone();
    tags.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    tags
  }
}
