//! Execution steps: the flattened, immutable units of an [ExecutionPlan](super::ExecutionPlan).
//!
//! Steps reference their producers by [StepOutputHandle] (step key + output name),
//! never by pointer; the plan owns every step in a single arena.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{InputSpec, MaterializationSpec};
use crate::definition::ExpectationDefinition;
use crate::execution::ComputeFn;
use crate::types::{RuntimeType, SolidHandle, StepOutputHandle};

/// Output name of an input-thunk step built from config.
pub const INPUT_THUNK_OUTPUT: &str = "input_thunk_output";
/// Input and output name of an expectation step.
pub const EXPECTATION_VALUE: &str = "expectation_value";
/// Output name of a join step.
pub const JOIN_OUTPUT: &str = "join_output";
/// Input name of a materialization step.
pub const MATERIALIZATION_VALUE: &str = "materialization_value";
/// Tag holding an integer dispatch priority; higher runs first.
pub const PRIORITY_TAG: &str = "priority";

/// Where a step input reads its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInputSource {
  /// Exactly one producer.
  Single(StepOutputHandle),
  /// Several producers whose produced values are collected into a list.
  FanIn(Vec<StepOutputHandle>),
}

impl StepInputSource {
  pub fn handles(&self) -> Vec<&StepOutputHandle> {
    match self {
      StepInputSource::Single(h) => vec![h],
      StepInputSource::FanIn(hs) => hs.iter().collect(),
    }
  }

  pub fn is_fan_in(&self) -> bool {
    matches!(self, StepInputSource::FanIn(_))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInput {
  pub name: String,
  pub runtime_type: RuntimeType,
  pub source: StepInputSource,
}

impl StepInput {
  pub fn single(name: impl Into<String>, runtime_type: RuntimeType, handle: StepOutputHandle) -> Self {
    Self {
      name: name.into(),
      runtime_type,
      source: StepInputSource::Single(handle),
    }
  }

  /// Step keys this input depends on.
  pub fn dependency_keys(&self) -> impl Iterator<Item = &str> {
    self.source.handles().into_iter().map(|h| h.step_key.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
  pub name: String,
  pub runtime_type: RuntimeType,
  pub is_required: bool,
}

impl StepOutput {
  pub fn new(name: impl Into<String>, runtime_type: RuntimeType, is_required: bool) -> Self {
    Self {
      name: name.into(),
      runtime_type,
      is_required,
    }
  }
}

/// What a step does. Matched on by the step executor.
#[derive(Clone)]
pub enum StepKind {
  /// The solid's own compute.
  Transform { compute: Arc<dyn ComputeFn> },
  /// Emits configured or previously-produced values, keyed by output name.
  InputThunk { values: BTreeMap<String, InputSpec> },
  /// Checks its input and re-emits it unchanged on success.
  Expectation { expectation: ExpectationDefinition },
  /// Passes through the first of its inputs once every expectation has passed.
  Join,
  /// Writes its input to the configured destination.
  Materialization { spec: MaterializationSpec },
}

impl StepKind {
  pub fn name(&self) -> &'static str {
    match self {
      StepKind::Transform { .. } => "transform",
      StepKind::InputThunk { .. } => "input_thunk",
      StepKind::Expectation { .. } => "expectation",
      StepKind::Join => "join",
      StepKind::Materialization { .. } => "materialization",
    }
  }
}

impl fmt::Debug for StepKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepKind::Transform { .. } => f.write_str("Transform"),
      StepKind::InputThunk { values } => f.debug_struct("InputThunk").field("values", values).finish(),
      StepKind::Expectation { expectation } => f
        .debug_struct("Expectation")
        .field("name", &expectation.name)
        .finish(),
      StepKind::Join => f.write_str("Join"),
      StepKind::Materialization { spec } => {
        f.debug_struct("Materialization").field("spec", spec).finish()
      }
    }
  }
}

impl fmt::Display for StepKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// One executable unit of a plan.
#[derive(Debug, Clone)]
pub struct ExecutionStep {
  pub key: String,
  pub solid_handle: SolidHandle,
  pub kind: StepKind,
  pub inputs: Vec<StepInput>,
  pub outputs: Vec<StepOutput>,
  /// Tags of the originating invocation (and enclosing composites).
  pub tags: BTreeMap<String, String>,
  /// The originating solid's `config` value.
  pub solid_config: Value,
}

impl ExecutionStep {
  pub fn inputs(&self) -> &[StepInput] {
    &self.inputs
  }

  pub fn outputs(&self) -> &[StepOutput] {
    &self.outputs
  }

  pub fn input(&self, name: &str) -> Option<&StepInput> {
    self.inputs.iter().find(|i| i.name == name)
  }

  pub fn output(&self, name: &str) -> Option<&StepOutput> {
    self.outputs.iter().find(|o| o.name == name)
  }

  /// Distinct producing step keys referenced by this step's inputs.
  pub fn dependency_keys(&self) -> BTreeSet<String> {
    self
      .inputs
      .iter()
      .flat_map(|i| i.dependency_keys().map(str::to_string))
      .collect()
  }

  /// Value of the integer `priority` tag, 0 when absent or unparsable.
  pub fn priority(&self) -> i64 {
    self
      .tags
      .get(PRIORITY_TAG)
      .and_then(|p| p.trim().parse().ok())
      .unwrap_or(0)
  }

  pub fn output_handle(&self, output_name: &str) -> StepOutputHandle {
    StepOutputHandle::new(self.key.clone(), output_name)
  }
}

/// Step key of the transform step of `handle`.
pub fn transform_key(handle: &SolidHandle) -> String {
  format!("{}.transform", handle.to_key())
}

/// Step key of the config input thunk for `input`.
pub fn input_thunk_key(handle: &SolidHandle, input: &str) -> String {
  format!("{}.input.{}.value", handle.to_key(), input)
}

/// Step key of expectation `name` on an input or output (`io` is `input` or `output`).
pub fn expectation_key(handle: &SolidHandle, io: &str, io_name: &str, name: &str) -> String {
  format!("{}.{}.{}.expectation.{}", handle.to_key(), io, io_name, name)
}

pub fn join_key(handle: &SolidHandle, io: &str, io_name: &str) -> String {
  format!("{}.{}.{}.expectations.join", handle.to_key(), io, io_name)
}

pub fn materialization_key(handle: &SolidHandle, output: &str, index: usize) -> String {
  format!("{}.output.{}.materialization.{}", handle.to_key(), output, index)
}
