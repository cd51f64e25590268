//! Runtime types declared on inputs and outputs, checked against `serde_json::Value`s.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

/// Declared type of an input, output, or solid config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeType {
  /// Accepts every value.
  Any,
  /// Ordering-only edge; the value must be `null`.
  Nothing,
  Bool,
  Int,
  Float,
  String,
  List(Box<RuntimeType>),
  Nullable(Box<RuntimeType>),
  Object,
}

/// A value failed the type check of a [RuntimeType].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCheckFailure {
  /// Display name of the expected type.
  pub expected: String,
  /// JSON rendering of the offending value.
  pub value_repr: String,
}

impl fmt::Display for TypeCheckFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "value {} is not of type {}",
      self.value_repr, self.expected
    )
  }
}

impl RuntimeType {
  pub fn list(inner: RuntimeType) -> Self {
    RuntimeType::List(Box::new(inner))
  }

  pub fn nullable(inner: RuntimeType) -> Self {
    RuntimeType::Nullable(Box::new(inner))
  }

  pub fn is_any(&self) -> bool {
    matches!(self, RuntimeType::Any)
  }

  /// Display name used in error messages (e.g. `List[Int]`).
  pub fn display_name(&self) -> String {
    match self {
      RuntimeType::Any => "Any".to_string(),
      RuntimeType::Nothing => "Nothing".to_string(),
      RuntimeType::Bool => "Bool".to_string(),
      RuntimeType::Int => "Int".to_string(),
      RuntimeType::Float => "Float".to_string(),
      RuntimeType::String => "String".to_string(),
      RuntimeType::List(inner) => format!("List[{}]", inner.display_name()),
      RuntimeType::Nullable(inner) => format!("Nullable[{}]", inner.display_name()),
      RuntimeType::Object => "Object".to_string(),
    }
  }

  /// True if a value declared as `inner` may flow into a slot declared as `self`.
  ///
  /// Types must match exactly; only an outer `Any` absorbs any inner type.
  pub fn accepts_mapping_from(&self, inner: &RuntimeType) -> bool {
    self.is_any() || self == inner
  }

  fn matches(&self, value: &Value) -> bool {
    match self {
      RuntimeType::Any => true,
      RuntimeType::Nothing => value.is_null(),
      RuntimeType::Bool => value.is_boolean(),
      RuntimeType::Int => value.is_i64() || value.is_u64(),
      RuntimeType::Float => value.is_number(),
      RuntimeType::String => value.is_string(),
      RuntimeType::List(inner) => value
        .as_array()
        .is_some_and(|items| items.iter().all(|item| inner.matches(item))),
      RuntimeType::Nullable(inner) => value.is_null() || inner.matches(value),
      RuntimeType::Object => value.is_object(),
    }
  }

  /// Checks `value` against this type.
  #[instrument(level = "trace", skip(value))]
  pub fn type_check(&self, value: &Value) -> Result<(), TypeCheckFailure> {
    if self.matches(value) {
      Ok(())
    } else {
      Err(TypeCheckFailure {
        expected: self.display_name(),
        value_repr: value.to_string(),
      })
    }
  }
}

impl fmt::Display for RuntimeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.display_name())
  }
}
