//! Compiles a pipeline's graph plus run config into a flat list of steps.
//!
//! Solids are walked in topological order, recursing into composites. Each solid
//! becomes a transform step, surrounded by input thunks for config literals,
//! expectation and join steps, and materialization steps. The output handles each
//! solid finally exposes are recorded so downstream solids can resolve against them.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, instrument};

use super::step::{
  EXPECTATION_VALUE, INPUT_THUNK_OUTPUT, JOIN_OUTPUT, MATERIALIZATION_VALUE, expectation_key,
  input_thunk_key, join_key, materialization_key, transform_key,
};
use super::{ExecutionStep, StepInput, StepInputSource, StepKind, StepOutput};
use crate::config::{InputSpec, RunConfig, SolidConfig};
use crate::definition::{
  ExpectationDefinition, FanInMember, GraphDefinition, InputSource, NodeDefinition,
  OutputDefinition, PipelineDefinition,
};
use crate::error::{ConfigError, PlanError};
use crate::types::{RuntimeType, SolidHandle, StepOutputHandle};

/// Sources of a composite's inputs, keyed by the inner `(solid, input)` they map onto.
type MappedSources = HashMap<(String, String), Vec<Option<StepInputSource>>>;

/// Everything a synthesized step shares with its originating solid.
struct Origin<'a> {
  handle: &'a SolidHandle,
  tags: &'a BTreeMap<String, String>,
  solid_config: &'a Value,
}

pub(crate) struct PlanBuilder<'a> {
  run_config: &'a RunConfig,
  /// Subset builds keep config literals on connected inputs for later thunk injection.
  allow_config_on_connected: bool,
  steps: Vec<ExecutionStep>,
  keys: HashSet<String>,
  /// (solid handle, output name) → handle downstream solids read from.
  output_map: HashMap<(SolidHandle, String), StepOutputHandle>,
}

impl<'a> PlanBuilder<'a> {
  pub(crate) fn new(run_config: &'a RunConfig, allow_config_on_connected: bool) -> Self {
    Self {
      run_config,
      allow_config_on_connected,
      steps: vec![],
      keys: HashSet::new(),
      output_map: HashMap::new(),
    }
  }

  #[instrument(level = "trace", skip_all, fields(pipeline = %pipeline.name))]
  pub(crate) fn build(mut self, pipeline: &PipelineDefinition) -> Result<Vec<ExecutionStep>, PlanError> {
    self.build_graph(&pipeline.graph, None, &BTreeMap::new(), &MappedSources::new())?;
    debug!(step_count = self.steps.len(), "plan steps built");
    Ok(self.steps)
  }

  fn build_graph(
    &mut self,
    graph: &GraphDefinition,
    parent: Option<&SolidHandle>,
    parent_tags: &BTreeMap<String, String>,
    mapped: &MappedSources,
  ) -> Result<(), PlanError> {
    let run_config = self.run_config;
    for invocation in graph.solids_in_topological_order() {
      let handle = SolidHandle::new(invocation.name.clone(), parent);
      let mut tags = parent_tags.clone();
      tags.extend(invocation.merged_tags());
      let solid_config = run_config.solid_config(&handle);
      let config_value = solid_config.map(|c| c.config.clone()).unwrap_or(Value::Null);
      let origin = Origin {
        handle: &handle,
        tags: &tags,
        solid_config: &config_value,
      };

      match &invocation.definition {
        NodeDefinition::Solid(solid) => {
          let mut inputs = Vec::with_capacity(solid.inputs.len());
          for input_def in &solid.inputs {
            let source = self
              .resolve_input(
                graph,
                parent,
                &origin,
                solid_config,
                &input_def.name,
                &input_def.runtime_type,
                mapped,
              )?
              .ok_or_else(|| PlanError::UnresolvedInput {
                solid: handle.to_key(),
                input: input_def.name.clone(),
              })?;
            let source = self.add_input_expectations(
              &origin,
              &input_def.name,
              &input_def.runtime_type,
              &input_def.expectations,
              source,
            )?;
            inputs.push(StepInput {
              name: input_def.name.clone(),
              runtime_type: input_def.runtime_type.clone(),
              source,
            });
          }

          let transform = ExecutionStep {
            key: transform_key(&handle),
            solid_handle: handle.clone(),
            kind: StepKind::Transform {
              compute: solid.compute.clone(),
            },
            inputs,
            outputs: solid
              .outputs
              .iter()
              .map(|o| StepOutput::new(o.name.clone(), o.runtime_type.clone(), o.is_required))
              .collect(),
            tags: tags.clone(),
            solid_config: config_value.clone(),
          };
          let produced_by = transform.key.clone();
          self.push(transform)?;

          for output_def in &solid.outputs {
            let produced = StepOutputHandle::new(produced_by.clone(), output_def.name.clone());
            let exposed = self.finish_output(&origin, solid_config, output_def, produced)?;
            self
              .output_map
              .insert((handle.clone(), output_def.name.clone()), exposed);
          }
        }
        NodeDefinition::Composite(composite) => {
          let mut inner_mapped = MappedSources::new();
          for mapping in &composite.input_mappings {
            let def = &mapping.definition;
            let source = self.resolve_input(
              graph,
              parent,
              &origin,
              solid_config,
              &def.name,
              &def.runtime_type,
              mapped,
            )?;
            let source = match source {
              Some(s) => Some(self.add_input_expectations(
                &origin,
                &def.name,
                &def.runtime_type,
                &def.expectations,
                s,
              )?),
              None => None,
            };
            inner_mapped
              .entry((mapping.solid.clone(), mapping.input.clone()))
              .or_default()
              .push(source);
          }

          self.build_graph(&composite.graph, Some(&handle), &tags, &inner_mapped)?;

          for mapping in &composite.output_mappings {
            let inner = (handle.child(mapping.solid.clone()), mapping.output.clone());
            if let Some(produced) = self.output_map.get(&inner).cloned() {
              let exposed = self.finish_output(&origin, solid_config, &mapping.definition, produced)?;
              self
                .output_map
                .insert((handle.clone(), mapping.definition.name.clone()), exposed);
            }
          }
        }
      }
    }
    Ok(())
  }

  /// Resolves one input of the solid at `origin.handle`.
  ///
  /// Returns `None` when nothing (dependency, composite mapping, config literal) supplies it.
  #[allow(clippy::too_many_arguments)]
  fn resolve_input(
    &mut self,
    graph: &GraphDefinition,
    parent: Option<&SolidHandle>,
    origin: &Origin<'_>,
    solid_config: Option<&SolidConfig>,
    input: &str,
    runtime_type: &RuntimeType,
    mapped: &MappedSources,
  ) -> Result<Option<StepInputSource>, PlanError> {
    let local = origin.handle.name().to_string();
    let configured = solid_config.and_then(|c| c.inputs.get(input));
    let mut mapped_sources = mapped
      .get(&(local.clone(), input.to_string()))
      .into_iter()
      .flatten();

    let Some(dependency) = graph.dependency(&local, input) else {
      if let Some(Some(source)) = mapped_sources.next() {
        return Ok(Some(source.clone()));
      }
      return match configured {
        Some(spec) => {
          let handle = self.add_input_thunk(origin, input, runtime_type, spec.clone())?;
          Ok(Some(StepInputSource::Single(handle)))
        }
        None => Ok(None),
      };
    };

    if configured.is_some() && !self.allow_config_on_connected {
      return Err(
        ConfigError::InputAlreadySatisfied {
          solid: origin.handle.to_key(),
          input: input.to_string(),
        }
        .into(),
      );
    }

    let unresolved = || PlanError::UnresolvedInput {
      solid: origin.handle.to_key(),
      input: input.to_string(),
    };
    let lookup = |solid: &str, output: &str| {
      self
        .output_map
        .get(&(SolidHandle::new(solid, parent), output.to_string()))
        .cloned()
    };

    match dependency {
      InputSource::Single(upstream) => {
        let handle = lookup(&upstream.solid, &upstream.output).ok_or_else(unresolved)?;
        Ok(Some(StepInputSource::Single(handle)))
      }
      InputSource::FanIn(members) => {
        let mut handles = vec![];
        for member in members {
          match member {
            FanInMember::Output(upstream) => {
              handles.push(lookup(&upstream.solid, &upstream.output).ok_or_else(unresolved)?);
            }
            FanInMember::MappedInput => match mapped_sources.next() {
              Some(Some(StepInputSource::Single(h))) => handles.push(h.clone()),
              Some(Some(StepInputSource::FanIn(hs))) => handles.extend(hs.iter().cloned()),
              _ => return Err(unresolved()),
            },
          }
        }
        Ok(Some(StepInputSource::FanIn(handles)))
      }
    }
  }

  fn add_input_thunk(
    &mut self,
    origin: &Origin<'_>,
    input: &str,
    runtime_type: &RuntimeType,
    spec: InputSpec,
  ) -> Result<StepOutputHandle, PlanError> {
    let step = ExecutionStep {
      key: input_thunk_key(origin.handle, input),
      solid_handle: origin.handle.clone(),
      kind: StepKind::InputThunk {
        values: BTreeMap::from([(INPUT_THUNK_OUTPUT.to_string(), spec)]),
      },
      inputs: vec![],
      outputs: vec![StepOutput::new(INPUT_THUNK_OUTPUT, runtime_type.clone(), true)],
      tags: origin.tags.clone(),
      solid_config: origin.solid_config.clone(),
    };
    let handle = step.output_handle(INPUT_THUNK_OUTPUT);
    self.push(step)?;
    Ok(handle)
  }

  fn add_input_expectations(
    &mut self,
    origin: &Origin<'_>,
    input: &str,
    runtime_type: &RuntimeType,
    expectations: &[ExpectationDefinition],
    source: StepInputSource,
  ) -> Result<StepInputSource, PlanError> {
    Ok(
      match self.add_expectations(origin, "input", input, runtime_type, expectations, &source)? {
        Some(handle) => StepInputSource::Single(handle),
        None => source,
      },
    )
  }

  /// Adds output expectations and materializations; returns the handle downstream reads.
  fn finish_output(
    &mut self,
    origin: &Origin<'_>,
    solid_config: Option<&SolidConfig>,
    output_def: &OutputDefinition,
    produced: StepOutputHandle,
  ) -> Result<StepOutputHandle, PlanError> {
    let exposed = self
      .add_expectations(
        origin,
        "output",
        &output_def.name,
        &output_def.runtime_type,
        &output_def.expectations,
        &StepInputSource::Single(produced.clone()),
      )?
      .unwrap_or(produced);

    let specs = solid_config
      .map(|c| c.materializations(&output_def.name))
      .unwrap_or_default();
    for (index, spec) in specs.into_iter().enumerate() {
      self.push(ExecutionStep {
        key: materialization_key(origin.handle, &output_def.name, index),
        solid_handle: origin.handle.clone(),
        kind: StepKind::Materialization { spec: spec.clone() },
        inputs: vec![StepInput::single(
          MATERIALIZATION_VALUE,
          output_def.runtime_type.clone(),
          exposed.clone(),
        )],
        outputs: vec![],
        tags: origin.tags.clone(),
        solid_config: origin.solid_config.clone(),
      })?;
    }
    Ok(exposed)
  }

  /// Adds one step per expectation plus a join when there is more than one.
  ///
  /// Returns the handle that replaces `source`, or `None` when nothing was added.
  fn add_expectations(
    &mut self,
    origin: &Origin<'_>,
    io: &str,
    io_name: &str,
    runtime_type: &RuntimeType,
    expectations: &[ExpectationDefinition],
    source: &StepInputSource,
  ) -> Result<Option<StepOutputHandle>, PlanError> {
    if !self.run_config.expectations.evaluate || expectations.is_empty() {
      return Ok(None);
    }
    let mut checked = vec![];
    for expectation in expectations {
      let step = ExecutionStep {
        key: expectation_key(origin.handle, io, io_name, &expectation.name),
        solid_handle: origin.handle.clone(),
        kind: StepKind::Expectation {
          expectation: expectation.clone(),
        },
        inputs: vec![StepInput {
          name: EXPECTATION_VALUE.to_string(),
          runtime_type: runtime_type.clone(),
          source: source.clone(),
        }],
        outputs: vec![StepOutput::new(EXPECTATION_VALUE, runtime_type.clone(), true)],
        tags: origin.tags.clone(),
        solid_config: origin.solid_config.clone(),
      };
      checked.push(step.output_handle(EXPECTATION_VALUE));
      self.push(step)?;
    }
    if checked.len() == 1 {
      return Ok(checked.pop());
    }

    let join = ExecutionStep {
      key: join_key(origin.handle, io, io_name),
      solid_handle: origin.handle.clone(),
      kind: StepKind::Join,
      inputs: checked
        .into_iter()
        .enumerate()
        .map(|(i, h)| StepInput::single(format!("expectation_{}", i), runtime_type.clone(), h))
        .collect(),
      outputs: vec![StepOutput::new(JOIN_OUTPUT, runtime_type.clone(), true)],
      tags: origin.tags.clone(),
      solid_config: origin.solid_config.clone(),
    };
    let handle = join.output_handle(JOIN_OUTPUT);
    self.push(join)?;
    Ok(Some(handle))
  }

  fn push(&mut self, step: ExecutionStep) -> Result<(), PlanError> {
    if !self.keys.insert(step.key.clone()) {
      return Err(PlanError::DuplicateStepKey { key: step.key });
    }
    self.steps.push(step);
    Ok(())
  }
}
