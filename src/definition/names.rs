//! Name validation for solids, inputs, outputs, expectations, and graphs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DefinitionError;

static VALID_NAME: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("name pattern is a valid regex"));

pub(crate) fn is_valid_name(name: &str) -> bool {
  VALID_NAME.is_match(name)
}

/// Returns `Err(InvalidName)` unless `name` matches `^[A-Za-z0-9_]+$`.
pub(crate) fn check_valid_name(kind: &str, name: &str) -> Result<(), DefinitionError> {
  if is_valid_name(name) {
    Ok(())
  } else {
    Err(DefinitionError::InvalidName {
      kind: kind.to_string(),
      name: name.to_string(),
    })
  }
}
