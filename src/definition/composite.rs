//! Composite solids: a sub-graph exposed as a single node through input and output mappings.

use std::collections::BTreeMap;

use tracing::instrument;

use super::names::check_valid_name;
use super::solid::check_io_definitions;
use super::{GraphDefinition, InputDefinition, InputSource, OutputDefinition};
use crate::error::DefinitionError;

/// Maps an outer composite input onto an input of an inner solid.
#[derive(Debug, Clone)]
pub struct InputMapping {
  pub definition: InputDefinition,
  pub solid: String,
  pub input: String,
}

impl InputMapping {
  pub fn new(definition: InputDefinition, solid: impl Into<String>, input: impl Into<String>) -> Self {
    Self {
      definition,
      solid: solid.into(),
      input: input.into(),
    }
  }
}

/// Maps an output of an inner solid onto an outer composite output.
#[derive(Debug, Clone)]
pub struct OutputMapping {
  pub definition: OutputDefinition,
  pub solid: String,
  pub output: String,
}

impl OutputMapping {
  pub fn new(
    definition: OutputDefinition,
    solid: impl Into<String>,
    output: impl Into<String>,
  ) -> Self {
    Self {
      definition,
      solid: solid.into(),
      output: output.into(),
    }
  }
}

/// A node whose body is another graph.
#[derive(Debug, Clone)]
pub struct CompositeDefinition {
  pub name: String,
  pub graph: GraphDefinition,
  pub input_mappings: Vec<InputMapping>,
  pub output_mappings: Vec<OutputMapping>,
  pub tags: BTreeMap<String, String>,
  pub description: Option<String>,
}

impl CompositeDefinition {
  #[instrument(level = "trace", skip_all)]
  pub fn new(
    name: impl Into<String>,
    graph: GraphDefinition,
    input_mappings: Vec<InputMapping>,
    output_mappings: Vec<OutputMapping>,
  ) -> Result<Self, DefinitionError> {
    let name: String = name.into();
    check_valid_name("composite", &name)?;
    let input_defs: Vec<InputDefinition> =
      input_mappings.iter().map(|m| m.definition.clone()).collect();
    let output_defs: Vec<OutputDefinition> =
      output_mappings.iter().map(|m| m.definition.clone()).collect();
    check_io_definitions(&name, &input_defs, &output_defs)?;

    for mapping in &input_mappings {
      validate_input_mapping(&name, &graph, mapping)?;
      let targets = input_mappings
        .iter()
        .filter(|m| m.solid == mapping.solid && m.input == mapping.input)
        .count();
      if targets > 1 && graph.dependency(&mapping.solid, &mapping.input).is_none() {
        return Err(DefinitionError::InvalidMapping {
          composite: name.clone(),
          message: format!(
            "inner input '{}.{}' is mapped more than once without a fan-in dependency",
            mapping.solid, mapping.input
          ),
        });
      }
    }
    for handle in graph.placeholder_inputs() {
      let source = graph
        .dependency(&handle.solid, &handle.input)
        .map(InputSource::placeholder_count)
        .unwrap_or(0);
      let filled = input_mappings
        .iter()
        .filter(|m| m.solid == handle.solid && m.input == handle.input)
        .count();
      if filled != source {
        return Err(DefinitionError::InvalidMapping {
          composite: name.clone(),
          message: format!(
            "input '{}' of inner solid '{}' has {} mapped-input placeholder(s) but {} mapping(s)",
            handle.input, handle.solid, source, filled
          ),
        });
      }
    }
    for mapping in &output_mappings {
      validate_output_mapping(&name, &graph, mapping)?;
    }

    Ok(Self {
      name,
      graph,
      input_mappings,
      output_mappings,
      tags: BTreeMap::new(),
      description: None,
    })
  }

  pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.tags.insert(key.into(), value.into());
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// Input mappings that feed the inner `(solid, input)`, in declaration order.
  pub fn mappings_into(&self, solid: &str, input: &str) -> Vec<&InputMapping> {
    self
      .input_mappings
      .iter()
      .filter(|m| m.solid == solid && m.input == input)
      .collect()
  }

  pub fn output_mapping(&self, output: &str) -> Option<&OutputMapping> {
    self
      .output_mappings
      .iter()
      .find(|m| m.definition.name == output)
  }
}

fn validate_input_mapping(
  composite: &str,
  graph: &GraphDefinition,
  mapping: &InputMapping,
) -> Result<(), DefinitionError> {
  let inner = graph
    .solid(&mapping.solid)
    .ok_or_else(|| DefinitionError::InvalidMapping {
      composite: composite.to_string(),
      message: format!(
        "input '{}' maps to unknown solid '{}'",
        mapping.definition.name, mapping.solid
      ),
    })?;
  let inner_input = inner
    .definition
    .input_def(&mapping.input)
    .ok_or_else(|| DefinitionError::InvalidMapping {
      composite: composite.to_string(),
      message: format!(
        "input '{}' maps to '{}.{}', which does not exist",
        mapping.definition.name, mapping.solid, mapping.input
      ),
    })?;
  if !mapping
    .definition
    .runtime_type
    .accepts_mapping_from(&inner_input.runtime_type)
  {
    return Err(DefinitionError::MappingTypeMismatch {
      composite: composite.to_string(),
      mapping: mapping.definition.name.clone(),
      outer: mapping.definition.runtime_type.display_name(),
      inner: inner_input.runtime_type.display_name(),
    });
  }
  if let Some(source) = graph.dependency(&mapping.solid, &mapping.input)
    && source.placeholder_count() == 0
  {
    return Err(DefinitionError::InvalidMapping {
      composite: composite.to_string(),
      message: format!(
        "input '{}' maps to '{}.{}', which is already satisfied by a dependency",
        mapping.definition.name, mapping.solid, mapping.input
      ),
    });
  }
  Ok(())
}

fn validate_output_mapping(
  composite: &str,
  graph: &GraphDefinition,
  mapping: &OutputMapping,
) -> Result<(), DefinitionError> {
  let inner = graph
    .solid(&mapping.solid)
    .ok_or_else(|| DefinitionError::InvalidMapping {
      composite: composite.to_string(),
      message: format!(
        "output '{}' maps from unknown solid '{}'",
        mapping.definition.name, mapping.solid
      ),
    })?;
  let inner_output = inner
    .definition
    .output_def(&mapping.output)
    .ok_or_else(|| DefinitionError::InvalidMapping {
      composite: composite.to_string(),
      message: format!(
        "output '{}' maps from '{}.{}', which does not exist",
        mapping.definition.name, mapping.solid, mapping.output
      ),
    })?;
  if !mapping
    .definition
    .runtime_type
    .accepts_mapping_from(&inner_output.runtime_type)
  {
    return Err(DefinitionError::MappingTypeMismatch {
      composite: composite.to_string(),
      mapping: mapping.definition.name.clone(),
      outer: mapping.definition.runtime_type.display_name(),
      inner: inner_output.runtime_type.display_name(),
    });
  }
  Ok(())
}
