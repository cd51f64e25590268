//! Pipelines: a root graph plus the modes (resource sets) it can run in.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::{GraphDefinition, ResourceDefinition};
use crate::error::DefinitionError;

/// Mode used when a run does not name one.
pub const DEFAULT_MODE: &str = "default";

/// A named set of resource definitions.
#[derive(Clone)]
pub struct ModeDefinition {
  pub name: String,
  pub resources: BTreeMap<String, Arc<dyn ResourceDefinition>>,
}

impl ModeDefinition {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      resources: BTreeMap::new(),
    }
  }

  pub fn with_resource(
    mut self,
    name: impl Into<String>,
    resource: Arc<dyn ResourceDefinition>,
  ) -> Self {
    self.resources.insert(name.into(), resource);
    self
  }
}

impl Default for ModeDefinition {
  fn default() -> Self {
    Self::new(DEFAULT_MODE)
  }
}

impl fmt::Debug for ModeDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModeDefinition")
      .field("name", &self.name)
      .field("resources", &self.resources.keys().collect::<Vec<_>>())
      .finish()
  }
}

/// A root graph that can be planned and executed.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
  pub name: String,
  pub graph: Arc<GraphDefinition>,
  pub modes: Vec<ModeDefinition>,
}

impl PipelineDefinition {
  /// Creates a pipeline; an empty `modes` list gets the default mode.
  pub fn new(graph: GraphDefinition, modes: Vec<ModeDefinition>) -> Result<Self, DefinitionError> {
    if let Some(handle) = graph.placeholder_inputs().first() {
      return Err(DefinitionError::UnfilledPlaceholder {
        solid: handle.solid.clone(),
        input: handle.input.clone(),
      });
    }
    let modes = if modes.is_empty() {
      vec![ModeDefinition::default()]
    } else {
      modes
    };
    let mut seen = HashSet::new();
    for mode in &modes {
      if !seen.insert(mode.name.as_str()) {
        return Err(DefinitionError::DuplicateMode {
          pipeline: graph.name.clone(),
          mode: mode.name.clone(),
        });
      }
    }
    Ok(Self {
      name: graph.name.clone(),
      graph: Arc::new(graph),
      modes,
    })
  }

  pub fn mode(&self, name: &str) -> Option<&ModeDefinition> {
    self.modes.iter().find(|m| m.name == name)
  }

  /// The first declared mode.
  pub fn default_mode_name(&self) -> &str {
    self
      .modes
      .first()
      .map(|m| m.name.as_str())
      .unwrap_or(DEFAULT_MODE)
  }
}
