//! JSON file loading for input specs and writing for materializations.

use std::path::Path;

use serde_json::Value;
use tracing::instrument;

use super::ComputeError;

/// Loads a JSON document from `path`.
#[instrument(level = "trace", skip(path), fields(path = %path.display()))]
pub async fn load_json_value(path: &Path) -> Result<Value, ComputeError> {
  let bytes = tokio::fs::read(path)
    .await
    .map_err(|e| ComputeError::from_source(format!("could not read {}", path.display()), e))?;
  serde_json::from_slice(&bytes)
    .map_err(|e| ComputeError::from_source(format!("invalid JSON in {}", path.display()), e))
}

/// Writes `value` as pretty JSON to `path`, creating parent directories.
#[instrument(level = "trace", skip(path, value), fields(path = %path.display()))]
pub async fn write_json_value(path: &Path, value: &Value) -> Result<(), ComputeError> {
  let json = serde_json::to_string_pretty(value)
    .map_err(|e| ComputeError::from_source("could not serialize value", e))?;
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent)
      .await
      .map_err(|e| ComputeError::from_source(format!("could not create {}", parent.display()), e))?;
  }
  tokio::fs::write(path, json)
    .await
    .map_err(|e| ComputeError::from_source(format!("could not write {}", path.display()), e))
}
