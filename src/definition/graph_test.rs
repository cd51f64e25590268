//! Tests for graph validation and topological ordering.

use serde_json::Value;

use super::{
  GraphBuilder, GraphDefinition, InputDefinition, InputSource, OutputDefinition, SolidDefinition,
  SolidInputHandle, SolidInvocation,
};
use crate::error::DefinitionError;
use crate::execution::{ComputeError, lambda};
use crate::types::RuntimeType;

fn solid(name: &str, inputs: &[&str], outputs: &[&str]) -> SolidDefinition {
  SolidDefinition::new(
    name,
    inputs
      .iter()
      .map(|i| InputDefinition::new(*i, RuntimeType::Any))
      .collect(),
    outputs
      .iter()
      .map(|o| OutputDefinition::new(*o, RuntimeType::Any))
      .collect(),
    lambda(|_, _| async { Ok::<_, ComputeError>(Value::Null) }),
  )
  .unwrap()
}

fn order(graph: &GraphDefinition) -> Vec<&str> {
  graph
    .solids_in_topological_order()
    .into_iter()
    .map(|s| s.name.as_str())
    .collect()
}

#[test]
fn independent_solids_keep_declaration_order() {
  let graph = GraphBuilder::new("g")
    .add_solid(solid("c", &[], &["result"]))
    .add_solid(solid("a", &[], &["result"]))
    .add_solid(solid("b", &["x"], &["result"]))
    .connect("a", "result", "b", "x")
    .build()
    .unwrap();
  assert_eq!(order(&graph), vec!["c", "a", "b"]);
}

#[test]
fn downstream_declared_first_still_ordered_after_upstream() {
  let graph = GraphBuilder::new("g")
    .add_solid(solid("b", &["x"], &["result"]))
    .add_solid(solid("a", &[], &["result"]))
    .connect("a", "result", "b", "x")
    .build()
    .unwrap();
  assert_eq!(order(&graph), vec!["a", "b"]);
}

#[test]
fn fan_in_waits_for_every_member() {
  let graph = GraphBuilder::new("g")
    .add_solid(solid("sum", &["xs"], &["result"]))
    .add_solid(solid("one", &[], &["result"]))
    .add_solid(solid("two", &[], &["result"]))
    .fan_in("sum", "xs", &[("one", "result"), ("two", "result")])
    .build()
    .unwrap();
  assert_eq!(order(&graph), vec!["one", "two", "sum"]);
  assert!(graph.dependency("sum", "xs").unwrap().is_fan_in());
}

#[test]
fn cycle_is_rejected_with_participants() {
  let err = GraphBuilder::new("g")
    .add_solid(solid("a", &["x"], &["result"]))
    .add_solid(solid("b", &["x"], &["result"]))
    .add_solid(solid("c", &[], &["result"]))
    .connect("a", "result", "b", "x")
    .connect("b", "result", "a", "x")
    .build()
    .unwrap_err();
  assert_eq!(
    err,
    DefinitionError::GraphCycle {
      graph: "g".to_string(),
      solids: vec!["a".to_string(), "b".to_string()],
    }
  );
}

#[test]
fn duplicate_invocation_names_are_rejected() {
  let err = GraphBuilder::new("g")
    .add_solid(solid("a", &[], &["result"]))
    .add_solid(solid("a", &[], &["result"]))
    .build()
    .unwrap_err();
  assert!(matches!(err, DefinitionError::DuplicateSolid { .. }));
}

#[test]
fn aliases_allow_reusing_a_definition() {
  let def = solid("add_one", &["x"], &["result"]);
  let graph = GraphBuilder::new("g")
    .add_aliased("first", def.clone())
    .add_aliased("second", def)
    .connect("first", "result", "second", "x")
    .build()
    .unwrap();
  assert_eq!(order(&graph), vec!["first", "second"]);
}

#[test]
fn invalid_alias_is_rejected() {
  let err = GraphBuilder::new("g")
    .add_aliased("bad.name", solid("a", &[], &["result"]))
    .build()
    .unwrap_err();
  assert!(matches!(err, DefinitionError::InvalidName { .. }));
}

#[test]
fn unknown_references_are_rejected() {
  let err = GraphBuilder::new("g")
    .add_solid(solid("a", &[], &["result"]))
    .add_solid(solid("b", &["x"], &["result"]))
    .connect("a", "result", "b", "nope")
    .build()
    .unwrap_err();
  assert!(matches!(err, DefinitionError::UnknownInput { .. }));

  let err = GraphBuilder::new("g")
    .add_solid(solid("a", &[], &["result"]))
    .add_solid(solid("b", &["x"], &["result"]))
    .connect("a", "missing", "b", "x")
    .build()
    .unwrap_err();
  assert!(matches!(err, DefinitionError::UnknownOutput { .. }));

  let err = GraphBuilder::new("g")
    .add_solid(solid("b", &["x"], &["result"]))
    .connect("ghost", "result", "b", "x")
    .build()
    .unwrap_err();
  assert!(matches!(err, DefinitionError::UnknownSolid { .. }));
}

#[test]
fn input_with_two_sources_is_rejected() {
  let err = GraphBuilder::new("g")
    .add_solid(solid("a", &[], &["result"]))
    .add_solid(solid("b", &["x"], &["result"]))
    .connect("a", "result", "b", "x")
    .connect("a", "result", "b", "x")
    .build()
    .unwrap_err();
  assert!(matches!(err, DefinitionError::DuplicateDependency { .. }));
}

#[test]
fn empty_fan_in_is_rejected() {
  let err = GraphDefinition::new(
    "g",
    vec![SolidInvocation::new(solid("b", &["xs"], &["result"]))],
    vec![(SolidInputHandle::new("b", "xs"), InputSource::FanIn(vec![]))],
  )
  .unwrap_err();
  assert!(matches!(err, DefinitionError::EmptyFanIn { .. }));
}

#[test]
fn duplicate_io_names_are_rejected() {
  let err = SolidDefinition::new(
    "a",
    vec![
      InputDefinition::new("x", RuntimeType::Int),
      InputDefinition::new("x", RuntimeType::Int),
    ],
    vec![],
    lambda(|_, _| async { Ok::<_, ComputeError>(Value::Null) }),
  )
  .unwrap_err();
  assert_eq!(
    err,
    DefinitionError::DuplicateIODefinition {
      solid: "a".to_string(),
      kind: "input".to_string(),
      name: "x".to_string(),
    }
  );
}
