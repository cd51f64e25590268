//! Structural validation of a [RunConfig] against a pipeline, run before any plan is built.

use std::collections::BTreeMap;

use tracing::instrument;

use super::{RunConfig, SolidConfig};
use crate::definition::{GraphDefinition, ModeDefinition, NodeDefinition, PipelineDefinition};
use crate::error::ConfigError;
use crate::types::SolidHandle;

/// Resolves the mode named by `mode`, or the pipeline's first mode.
pub fn resolve_mode<'a>(
  pipeline: &'a PipelineDefinition,
  mode: Option<&str>,
) -> Result<&'a ModeDefinition, ConfigError> {
  let name = mode.unwrap_or_else(|| pipeline.default_mode_name());
  pipeline
    .mode(name)
    .ok_or_else(|| ConfigError::ModeNotFound {
      pipeline: pipeline.name.clone(),
      mode: name.to_string(),
    })
}

/// Checks solid names, input and output names, nesting, config types, and resources.
#[instrument(level = "trace", skip_all, fields(pipeline = %pipeline.name, mode = %mode.name))]
pub fn validate_run_config(
  config: &RunConfig,
  pipeline: &PipelineDefinition,
  mode: &ModeDefinition,
) -> Result<(), ConfigError> {
  validate_solids(&config.solids, &pipeline.graph, None)?;
  for name in config.resources.keys() {
    if !mode.resources.contains_key(name) {
      return Err(ConfigError::UnknownResource {
        mode: mode.name.clone(),
        resource: name.clone(),
      });
    }
  }
  Ok(())
}

fn validate_solids(
  solids: &BTreeMap<String, SolidConfig>,
  graph: &GraphDefinition,
  parent: Option<&SolidHandle>,
) -> Result<(), ConfigError> {
  for (name, solid_config) in solids {
    let handle = SolidHandle::new(name.clone(), parent);
    let invocation = graph.solid(name).ok_or_else(|| ConfigError::UnknownSolid {
      path: handle.to_key(),
    })?;
    let definition = &invocation.definition;
    for input in solid_config.inputs.keys() {
      if definition.input_def(input).is_none() {
        return Err(ConfigError::UnknownInput {
          solid: handle.to_key(),
          input: input.clone(),
        });
      }
    }
    for entry in &solid_config.outputs {
      for output in entry.keys() {
        if definition.output_def(output).is_none() {
          return Err(ConfigError::UnknownOutput {
            solid: handle.to_key(),
            output: output.clone(),
          });
        }
      }
    }
    match definition {
      NodeDefinition::Solid(solid) => {
        if !solid_config.solids.is_empty() {
          return Err(ConfigError::NotAComposite {
            solid: handle.to_key(),
          });
        }
        if let Some(config_type) = &solid.config_type
          && !solid_config.config.is_null()
        {
          config_type
            .type_check(&solid_config.config)
            .map_err(|failure| ConfigError::ConfigTypeMismatch {
              solid: handle.to_key(),
              message: failure.to_string(),
            })?;
        }
      }
      NodeDefinition::Composite(composite) => {
        validate_solids(&solid_config.solids, &composite.graph, Some(&handle))?;
      }
    }
  }
  Ok(())
}
