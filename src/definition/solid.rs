//! Solid definitions: named, typed inputs and outputs around a user compute function.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::ExpectationDefinition;
use super::names::check_valid_name;
use crate::error::DefinitionError;
use crate::execution::ComputeFn;
use crate::types::RuntimeType;

/// A declared input of a solid or composite.
#[derive(Debug, Clone)]
pub struct InputDefinition {
  pub name: String,
  pub runtime_type: RuntimeType,
  pub description: Option<String>,
  pub expectations: Vec<ExpectationDefinition>,
}

impl InputDefinition {
  pub fn new(name: impl Into<String>, runtime_type: RuntimeType) -> Self {
    Self {
      name: name.into(),
      runtime_type,
      description: None,
      expectations: vec![],
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_expectation(mut self, expectation: ExpectationDefinition) -> Self {
    self.expectations.push(expectation);
    self
  }
}

/// A declared output of a solid or composite.
#[derive(Debug, Clone)]
pub struct OutputDefinition {
  pub name: String,
  pub runtime_type: RuntimeType,
  /// Required outputs must be emitted by every successful invocation.
  pub is_required: bool,
  pub description: Option<String>,
  pub expectations: Vec<ExpectationDefinition>,
}

impl OutputDefinition {
  pub fn new(name: impl Into<String>, runtime_type: RuntimeType) -> Self {
    Self {
      name: name.into(),
      runtime_type,
      is_required: true,
      description: None,
      expectations: vec![],
    }
  }

  pub fn optional(mut self) -> Self {
    self.is_required = false;
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_expectation(mut self, expectation: ExpectationDefinition) -> Self {
    self.expectations.push(expectation);
    self
  }
}

/// Checks names and uniqueness of input/output definitions on `owner`.
pub(crate) fn check_io_definitions(
  owner: &str,
  inputs: &[InputDefinition],
  outputs: &[OutputDefinition],
) -> Result<(), DefinitionError> {
  let mut seen = HashSet::new();
  for input in inputs {
    check_valid_name("input", &input.name)?;
    if !seen.insert(input.name.as_str()) {
      return Err(DefinitionError::DuplicateIODefinition {
        solid: owner.to_string(),
        kind: "input".to_string(),
        name: input.name.clone(),
      });
    }
    for e in &input.expectations {
      check_valid_name("expectation", &e.name)?;
    }
  }
  let mut seen = HashSet::new();
  for output in outputs {
    check_valid_name("output", &output.name)?;
    if !seen.insert(output.name.as_str()) {
      return Err(DefinitionError::DuplicateIODefinition {
        solid: owner.to_string(),
        kind: "output".to_string(),
        name: output.name.clone(),
      });
    }
    for e in &output.expectations {
      check_valid_name("expectation", &e.name)?;
    }
  }
  Ok(())
}

/// A leaf unit of computation. Immutable once constructed.
#[derive(Clone)]
pub struct SolidDefinition {
  pub name: String,
  pub inputs: Vec<InputDefinition>,
  pub outputs: Vec<OutputDefinition>,
  pub compute: Arc<dyn ComputeFn>,
  /// Declared type of the solid's `config` value, if any.
  pub config_type: Option<RuntimeType>,
  pub tags: BTreeMap<String, String>,
  pub description: Option<String>,
}

impl SolidDefinition {
  pub fn new(
    name: impl Into<String>,
    inputs: Vec<InputDefinition>,
    outputs: Vec<OutputDefinition>,
    compute: Arc<dyn ComputeFn>,
  ) -> Result<Self, DefinitionError> {
    let name: String = name.into();
    check_valid_name("solid", &name)?;
    check_io_definitions(&name, &inputs, &outputs)?;
    Ok(Self {
      name,
      inputs,
      outputs,
      compute,
      config_type: None,
      tags: BTreeMap::new(),
      description: None,
    })
  }

  pub fn with_config_type(mut self, config_type: RuntimeType) -> Self {
    self.config_type = Some(config_type);
    self
  }

  pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.tags.insert(key.into(), value.into());
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn input(&self, name: &str) -> Option<&InputDefinition> {
    self.inputs.iter().find(|i| i.name == name)
  }

  pub fn output(&self, name: &str) -> Option<&OutputDefinition> {
    self.outputs.iter().find(|o| o.name == name)
  }
}

impl fmt::Debug for SolidDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SolidDefinition")
      .field("name", &self.name)
      .field("inputs", &self.inputs)
      .field("outputs", &self.outputs)
      .field("config_type", &self.config_type)
      .field("tags", &self.tags)
      .finish_non_exhaustive()
  }
}
