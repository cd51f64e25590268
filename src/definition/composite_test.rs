//! Tests for composite mapping validation.

use serde_json::Value;

use super::{
  CompositeDefinition, FanInMember, GraphBuilder, GraphDefinition, InputDefinition, InputMapping,
  OutputDefinition, OutputMapping, SolidDefinition, SolidOutputHandle,
};
use crate::error::DefinitionError;
use crate::execution::{ComputeError, lambda};
use crate::types::RuntimeType;

fn typed_solid(name: &str, input: Option<(&str, RuntimeType)>, output: RuntimeType) -> SolidDefinition {
  SolidDefinition::new(
    name,
    input
      .map(|(n, t)| vec![InputDefinition::new(n, t)])
      .unwrap_or_default(),
    vec![OutputDefinition::new("result", output)],
    lambda(|_, _| async { Ok::<_, ComputeError>(Value::Null) }),
  )
  .unwrap()
}

fn inner_graph() -> GraphDefinition {
  GraphBuilder::new("inner")
    .add_solid(typed_solid("parse", Some(("raw", RuntimeType::String)), RuntimeType::Int))
    .add_solid(typed_solid("double", Some(("x", RuntimeType::Int)), RuntimeType::Int))
    .connect("parse", "result", "double", "x")
    .build()
    .unwrap()
}

#[test]
fn valid_composite_exposes_mapped_io() {
  let composite = CompositeDefinition::new(
    "parse_and_double",
    inner_graph(),
    vec![InputMapping::new(
      InputDefinition::new("text", RuntimeType::String),
      "parse",
      "raw",
    )],
    vec![OutputMapping::new(
      OutputDefinition::new("doubled", RuntimeType::Int),
      "double",
      "result",
    )],
  )
  .unwrap();
  assert_eq!(composite.mappings_into("parse", "raw").len(), 1);
  assert_eq!(composite.output_mapping("doubled").unwrap().solid, "double");
}

#[test]
fn mapping_types_must_match_exactly() {
  let err = CompositeDefinition::new(
    "c",
    inner_graph(),
    vec![InputMapping::new(
      InputDefinition::new("text", RuntimeType::Int),
      "parse",
      "raw",
    )],
    vec![],
  )
  .unwrap_err();
  assert_eq!(
    err,
    DefinitionError::MappingTypeMismatch {
      composite: "c".to_string(),
      mapping: "text".to_string(),
      outer: "Int".to_string(),
      inner: "String".to_string(),
    }
  );

  let err = CompositeDefinition::new(
    "c",
    inner_graph(),
    vec![],
    vec![OutputMapping::new(
      OutputDefinition::new("doubled", RuntimeType::nullable(RuntimeType::Int)),
      "double",
      "result",
    )],
  )
  .unwrap_err();
  assert!(matches!(err, DefinitionError::MappingTypeMismatch { .. }));
}

#[test]
fn outer_any_absorbs_inner_type() {
  CompositeDefinition::new(
    "c",
    inner_graph(),
    vec![InputMapping::new(
      InputDefinition::new("text", RuntimeType::Any),
      "parse",
      "raw",
    )],
    vec![OutputMapping::new(
      OutputDefinition::new("doubled", RuntimeType::Any),
      "double",
      "result",
    )],
  )
  .unwrap();
}

#[test]
fn mapping_onto_connected_input_is_rejected() {
  let err = CompositeDefinition::new(
    "c",
    inner_graph(),
    vec![InputMapping::new(
      InputDefinition::new("n", RuntimeType::Int),
      "double",
      "x",
    )],
    vec![],
  )
  .unwrap_err();
  assert!(matches!(err, DefinitionError::InvalidMapping { .. }));
}

#[test]
fn unknown_mapping_targets_are_rejected() {
  let err = CompositeDefinition::new(
    "c",
    inner_graph(),
    vec![],
    vec![OutputMapping::new(
      OutputDefinition::new("out", RuntimeType::Int),
      "ghost",
      "result",
    )],
  )
  .unwrap_err();
  assert!(matches!(err, DefinitionError::InvalidMapping { .. }));
}

fn fan_in_graph() -> GraphDefinition {
  GraphBuilder::new("inner")
    .add_solid(typed_solid("seed", None, RuntimeType::Int))
    .add_solid(typed_solid("collect", Some(("xs", RuntimeType::Any)), RuntimeType::Any))
    .fan_in_members(
      "collect",
      "xs",
      vec![
        FanInMember::Output(SolidOutputHandle::new("seed", "result")),
        FanInMember::MappedInput,
      ],
    )
    .build()
    .unwrap()
}

#[test]
fn fan_in_placeholder_is_filled_by_mapping() {
  let composite = CompositeDefinition::new(
    "c",
    fan_in_graph(),
    vec![InputMapping::new(
      InputDefinition::new("extra", RuntimeType::Any),
      "collect",
      "xs",
    )],
    vec![],
  )
  .unwrap();
  assert_eq!(composite.input_mappings.len(), 1);
}

#[test]
fn unfilled_placeholder_is_rejected() {
  let err = CompositeDefinition::new("c", fan_in_graph(), vec![], vec![]).unwrap_err();
  assert!(matches!(err, DefinitionError::InvalidMapping { .. }));
}
