//! Solids and pipelines shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::{Value, json};
use streamweave_plan::definition::{
  GraphBuilder, InputDefinition, OutputDefinition, PipelineDefinition, SolidDefinition,
};
use streamweave_plan::execution::{ComputeError, lambda};
use streamweave_plan::types::{Event, EventType, RuntimeType};

pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_test_writer()
    .try_init();
}

pub fn constant(name: &str, value: Value) -> SolidDefinition {
  SolidDefinition::new(
    name,
    vec![],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(move |_, _| {
      let value = value.clone();
      async move { Ok::<_, ComputeError>(value) }
    }),
  )
  .unwrap()
}

pub fn add_one(name: &str) -> SolidDefinition {
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

pub fn sum(name: &str) -> SolidDefinition {
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

pub fn failing(name: &str) -> SolidDefinition {
  SolidDefinition::new(
    name,
    vec![],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(|_, _| async { Err::<Value, _>(ComputeError::user("boom")) }),
  )
  .unwrap()
}

/// Solid that asks for a retry on its first `failures` attempts, then emits `value`.
pub fn flaky(
  name: &str,
  failures: u32,
  seconds_to_wait: Option<f64>,
  value: Value,
) -> (SolidDefinition, Arc<AtomicU32>) {
  let calls = Arc::new(AtomicU32::new(0));
  let counter = calls.clone();
  let solid = SolidDefinition::new(
    name,
    vec![],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(move |_, _| {
      let attempt = counter.fetch_add(1, Ordering::SeqCst);
      let value = value.clone();
      async move {
        if attempt < failures {
          Err(ComputeError::retry(failures, seconds_to_wait))
        } else {
          Ok(value)
        }
      }
    }),
  )
  .unwrap();
  (solid, calls)
}

/// `A -> B`: A emits 1, B adds one.
pub fn linear_pipeline() -> Arc<PipelineDefinition> {
  let graph = GraphBuilder::new("linear")
    .add_solid(constant("A", json!(1)))
    .add_solid(add_one("B"))
    .connect("A", "result", "B", "x")
    .build()
    .unwrap();
  Arc::new(PipelineDefinition::new(graph, vec![]).unwrap())
}

/// `(step_key, event_type)` pairs, leaving out step outputs.
pub fn summary(events: &[Event]) -> Vec<(Option<String>, EventType)> {
  events
    .iter()
    .filter(|e| e.event_type() != EventType::StepOutput)
    .map(|e| (e.step_key.clone(), e.event_type()))
    .collect()
}

pub fn step(key: &str, event_type: EventType) -> (Option<String>, EventType) {
  (Some(key.to_string()), event_type)
}

pub fn plan(event_type: EventType) -> (Option<String>, EventType) {
  (None, event_type)
}
