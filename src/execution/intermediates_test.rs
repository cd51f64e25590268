//! Tests for intermediate storage and input gathering.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::Intermediates;
use crate::execution::{ComputeError, lambda};
use crate::plan::{ExecutionStep, StepInput, StepInputSource, StepKind};
use crate::types::{RuntimeType, SolidHandle, StepOutputHandle};

fn consumer() -> ExecutionStep {
  ExecutionStep {
    key: "j.transform".to_string(),
    solid_handle: SolidHandle::root("j"),
    kind: StepKind::Transform {
      compute: lambda(|_, _| async { Ok::<_, ComputeError>(Value::Null) }),
    },
    inputs: vec![
      StepInput::single(
        "x",
        RuntimeType::Int,
        StepOutputHandle::new("a.transform", "result"),
      ),
      StepInput {
        name: "xs".to_string(),
        runtime_type: RuntimeType::Any,
        source: StepInputSource::FanIn(vec![
          StepOutputHandle::new("e1.transform", "result"),
          StepOutputHandle::new("e2.transform", "result"),
          StepOutputHandle::new("e3.transform", "result"),
        ]),
      },
    ],
    outputs: vec![],
    tags: BTreeMap::new(),
    solid_config: Value::Null,
  }
}

#[test]
fn fan_in_gathers_only_produced_members_in_order() {
  let mut store = Intermediates::new();
  store.insert(StepOutputHandle::new("a.transform", "result"), json!(1));
  store.insert(StepOutputHandle::new("e3.transform", "result"), json!(3));
  store.insert(StepOutputHandle::new("e1.transform", "result"), json!(10));
  let inputs = store.gather_inputs(&consumer());
  assert_eq!(inputs["x"], json!(1));
  assert_eq!(inputs["xs"], json!([10, 3]));
}

#[test]
fn missing_single_input_is_left_out() {
  let store = Intermediates::new();
  let inputs = store.gather_inputs(&consumer());
  assert!(!inputs.contains_key("x"));
  assert_eq!(inputs["xs"], json!([]));
}

#[test]
fn values_for_selects_read_handles() {
  let mut store = Intermediates::new();
  store.insert(StepOutputHandle::new("a.transform", "result"), json!(1));
  store.insert(StepOutputHandle::new("other.transform", "result"), json!(2));
  let known = store.values_for(&consumer());
  assert_eq!(known.len(), 1);
  assert!(known.contains_key(&StepOutputHandle::new("a.transform", "result")));
}

#[test]
fn remove_step_drops_only_that_producer() {
  let mut store = Intermediates::new();
  store.insert(StepOutputHandle::new("a.transform", "result"), json!(1));
  store.insert(StepOutputHandle::new("a.transform", "extra"), json!(2));
  store.insert(StepOutputHandle::new("e1.transform", "result"), json!(3));
  store.remove_step("a.transform");
  assert_eq!(store.len(), 1);
  assert!(store.contains(&StepOutputHandle::new("e1.transform", "result")));
}
