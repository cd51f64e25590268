//! Run configuration: per-solid config, input literals, materializations, execution
//! and retry settings, and resource config.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::ConfigError;
use crate::types::{RetryMode, SolidHandle};

/// Overrides `execution` with a multithread executor of this size.
pub const MAX_CONCURRENT_ENV: &str = "STREAMWEAVE_PLAN_MAX_CONCURRENT";
/// Overrides `retries` (`enabled`, `disabled` or `deferred`).
pub const RETRIES_ENV: &str = "STREAMWEAVE_PLAN_RETRIES";

fn default_max_concurrent() -> usize {
  4
}

fn default_true() -> bool {
  true
}

/// Where an input's value comes from when it has no upstream dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSpec {
  /// Literal JSON value.
  Value(Value),
  /// JSON document loaded from a file when the input step runs.
  Json { path: PathBuf },
}

/// Where a materialized output is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationSpec {
  Json { path: PathBuf },
}

/// Config for one solid invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolidConfig {
  pub config: Value,
  pub inputs: BTreeMap<String, InputSpec>,
  /// Each entry maps one output name to where it is written.
  pub outputs: Vec<BTreeMap<String, MaterializationSpec>>,
  /// Config for the inner solids of a composite.
  pub solids: BTreeMap<String, SolidConfig>,
}

impl SolidConfig {
  /// Materializations requested for `output`, in config order.
  pub fn materializations(&self, output: &str) -> Vec<&MaterializationSpec> {
    self
      .outputs
      .iter()
      .filter_map(|entry| entry.get(output))
      .collect()
  }
}

/// Executor selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionConfig {
  InProcess {},
  Multithread {
    #[serde(default = "default_max_concurrent")]
    max_concurrent: usize,
  },
}

impl Default for ExecutionConfig {
  fn default() -> Self {
    ExecutionConfig::InProcess {}
  }
}

/// Retry policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetriesConfig {
  Enabled {},
  Disabled {},
  Deferred {},
}

impl Default for RetriesConfig {
  fn default() -> Self {
    RetriesConfig::Enabled {}
  }
}

impl From<RetryMode> for RetriesConfig {
  fn from(mode: RetryMode) -> Self {
    match mode {
      RetryMode::Enabled => RetriesConfig::Enabled {},
      RetryMode::Disabled => RetriesConfig::Disabled {},
      RetryMode::Deferred => RetriesConfig::Deferred {},
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationsConfig {
  #[serde(default = "default_true")]
  pub evaluate: bool,
}

impl Default for ExpectationsConfig {
  fn default() -> Self {
    Self { evaluate: true }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
  #[serde(default)]
  pub config: Value,
}

/// Configuration for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
  pub solids: BTreeMap<String, SolidConfig>,
  pub execution: ExecutionConfig,
  pub resources: BTreeMap<String, ResourceConfig>,
  pub expectations: ExpectationsConfig,
  pub retries: RetriesConfig,
}

impl RunConfig {
  /// Parses a run config from a JSON value.
  #[instrument(level = "trace", skip(value))]
  pub fn from_value(value: Value) -> Result<Self, ConfigError> {
    if value.is_null() {
      return Ok(Self::default());
    }
    serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
  }

  /// Parses a run config from JSON text.
  pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
    serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
  }

  pub fn to_value(&self) -> Value {
    serde_json::to_value(self).unwrap_or(Value::Null)
  }

  pub fn with_solid(mut self, name: impl Into<String>, config: SolidConfig) -> Self {
    self.solids.insert(name.into(), config);
    self
  }

  pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
    self.execution = execution;
    self
  }

  pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
    self.retries = mode.into();
    self
  }

  pub fn with_resource(mut self, name: impl Into<String>, config: Value) -> Self {
    self.resources.insert(name.into(), ResourceConfig { config });
    self
  }

  /// Config of the solid at `handle`, walking nested composite config.
  pub fn solid_config(&self, handle: &SolidHandle) -> Option<&SolidConfig> {
    let mut segments = handle.path.iter();
    let mut current = self.solids.get(segments.next()?)?;
    for segment in segments {
      current = current.solids.get(segment)?;
    }
    Some(current)
  }

  pub fn retry_mode(&self) -> RetryMode {
    match self.retries {
      RetriesConfig::Enabled {} => RetryMode::Enabled,
      RetriesConfig::Disabled {} => RetryMode::Disabled,
      RetriesConfig::Deferred {} => RetryMode::Deferred,
    }
  }

  /// Step concurrency limit; in-process execution runs one step at a time.
  pub fn max_concurrent(&self) -> usize {
    match self.execution {
      ExecutionConfig::InProcess {} => 1,
      ExecutionConfig::Multithread { max_concurrent } => max_concurrent.max(1),
    }
  }

  /// Applies overrides from the process environment.
  pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
    self.with_overrides_from(|var| std::env::var(var).ok())
  }

  /// Applies overrides read through `lookup`.
  pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(raw) = lookup(MAX_CONCURRENT_ENV) {
      let max_concurrent = raw
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::InvalidEnvOverride {
          var: MAX_CONCURRENT_ENV.to_string(),
          value: raw.clone(),
        })?;
      debug!(max_concurrent, "execution overridden from environment");
      self.execution = ExecutionConfig::Multithread { max_concurrent };
    }
    if let Some(raw) = lookup(RETRIES_ENV) {
      let mode: RetryMode = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride {
          var: RETRIES_ENV.to_string(),
          value: raw.clone(),
        })?;
      debug!(%mode, "retries overridden from environment");
      self.retries = mode.into();
    }
    Ok(self)
  }
}
