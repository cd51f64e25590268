//! Solid and pipeline fixtures shared by unit tests.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::RunConfig;
use crate::definition::{
  GraphBuilder, InputDefinition, OutputDefinition, PipelineDefinition, SolidDefinition,
};
use crate::execution::{ComputeError, lambda};
use crate::plan::ExecutionPlan;
use crate::types::RuntimeType;

/// Solid with no inputs emitting `value` on `result`.
pub(crate) fn constant(name: &str, value: Value) -> SolidDefinition {
  SolidDefinition::new(
    name,
    vec![],
    vec![OutputDefinition::new("result", RuntimeType::Any)],
    lambda(move |_, _| {
      let value = value.clone();
      async move { Ok::<_, ComputeError>(value) }
    }),
  )
  .unwrap()
}

/// Solid adding one to its Int input `x`.
pub(crate) fn add_one(name: &str) -> SolidDefinition {
  SolidDefinition::new(
    name,
    vec![InputDefinition::new("x", RuntimeType::Int)],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(|_, inputs| async move {
      let x = inputs.get("x").and_then(Value::as_i64).unwrap_or_default();
      Ok::<_, ComputeError>(json!(x + 1))
    }),
  )
  .unwrap()
}

/// Solid summing the Int members of its fan-in input `xs`.
pub(crate) fn sum(name: &str) -> SolidDefinition {
  SolidDefinition::new(
    name,
    vec![InputDefinition::new("xs", RuntimeType::list(RuntimeType::Int))],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(|_, inputs| async move {
      let total: i64 = inputs
        .get("xs")
        .and_then(Value::as_array)
        .map(|xs| xs.iter().filter_map(Value::as_i64).sum())
        .unwrap_or_default();
      Ok::<_, ComputeError>(json!(total))
    }),
  )
  .unwrap()
}

/// Solid whose compute always fails.
pub(crate) fn failing(name: &str) -> SolidDefinition {
  SolidDefinition::new(
    name,
    vec![],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(|_, _| async { Err::<Value, _>(ComputeError::user("boom")) }),
  )
  .unwrap()
}

/// `A -> B`: A emits 1, B adds one.
pub(crate) fn linear_pipeline() -> Arc<PipelineDefinition> {
  let graph = GraphBuilder::new("linear")
    .add_solid(constant("A", json!(1)))
    .add_solid(add_one("B"))
    .connect("A", "result", "B", "x")
    .build()
    .unwrap();
  Arc::new(PipelineDefinition::new(graph, vec![]).unwrap())
}

pub(crate) fn plan_for(pipeline: Arc<PipelineDefinition>, run_config: RunConfig) -> ExecutionPlan {
  ExecutionPlan::build(pipeline, Arc::new(run_config), None).unwrap()
}
