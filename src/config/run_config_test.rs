//! Tests for run config parsing and environment overrides.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::json;

use super::{
  ExecutionConfig, InputSpec, MAX_CONCURRENT_ENV, MaterializationSpec, RETRIES_ENV, RunConfig,
};
use crate::error::ConfigError;
use crate::types::{RetryMode, SolidHandle};

#[test]
fn empty_config_uses_defaults() {
  let config = RunConfig::from_value(json!({})).unwrap();
  assert_eq!(config.execution, ExecutionConfig::InProcess {});
  assert_eq!(config.retry_mode(), RetryMode::Enabled);
  assert!(config.expectations.evaluate);
  assert_eq!(config.max_concurrent(), 1);
  assert_eq!(RunConfig::from_value(serde_json::Value::Null).unwrap(), config);
}

#[test]
fn parses_full_document() {
  let config = RunConfig::from_value(json!({
    "solids": {
      "load": {
        "config": {"limit": 3},
        "inputs": {
          "n": {"value": 5},
          "rows": {"json": {"path": "/tmp/rows.json"}}
        },
        "outputs": [{"result": {"json": {"path": "/tmp/out.json"}}}]
      },
      "wrap": {"solids": {"inner": {"config": 1}}}
    },
    "execution": {"multithread": {"max_concurrent": 3}},
    "resources": {"db": {"config": "sqlite://"}},
    "expectations": {"evaluate": false},
    "retries": {"deferred": {}}
  }))
  .unwrap();

  let load = &config.solids["load"];
  assert_eq!(load.config, json!({"limit": 3}));
  assert_eq!(load.inputs["n"], InputSpec::Value(json!(5)));
  assert_eq!(
    load.inputs["rows"],
    InputSpec::Json {
      path: PathBuf::from("/tmp/rows.json")
    }
  );
  assert_eq!(
    load.materializations("result"),
    vec![&MaterializationSpec::Json {
      path: PathBuf::from("/tmp/out.json")
    }]
  );
  assert_eq!(config.max_concurrent(), 3);
  assert_eq!(config.retry_mode(), RetryMode::Deferred);
  assert!(!config.expectations.evaluate);
  assert_eq!(config.resources["db"].config, json!("sqlite://"));

  let inner = SolidHandle::root("wrap").child("inner");
  assert_eq!(config.solid_config(&inner).unwrap().config, json!(1));
  assert!(config.solid_config(&SolidHandle::root("nope")).is_none());
}

#[test]
fn multithread_defaults_max_concurrent() {
  let config = RunConfig::from_value(json!({"execution": {"multithread": {}}})).unwrap();
  assert_eq!(config.max_concurrent(), 4);
}

#[test]
fn unknown_top_level_key_is_a_parse_error() {
  let err = RunConfig::from_value(json!({"solidz": {}})).unwrap_err();
  assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn round_trips_through_value() {
  let config = RunConfig::default()
    .with_execution(ExecutionConfig::Multithread { max_concurrent: 2 })
    .with_retry_mode(RetryMode::Disabled)
    .with_resource("db", json!({"url": "x"}));
  assert_eq!(RunConfig::from_value(config.to_value()).unwrap(), config);
}

#[test]
fn env_overrides_apply() {
  let env: HashMap<&str, &str> = [(MAX_CONCURRENT_ENV, "8"), (RETRIES_ENV, "disabled")]
    .into_iter()
    .collect();
  let config = RunConfig::default()
    .with_overrides_from(|var| env.get(var).map(|v| v.to_string()))
    .unwrap();
  assert_eq!(config.max_concurrent(), 8);
  assert_eq!(config.retry_mode(), RetryMode::Disabled);
}

#[test]
fn invalid_env_override_is_rejected() {
  let err = RunConfig::default()
    .with_overrides_from(|var| (var == MAX_CONCURRENT_ENV).then(|| "zero".to_string()))
    .unwrap_err();
  assert_eq!(
    err,
    ConfigError::InvalidEnvOverride {
      var: MAX_CONCURRENT_ENV.to_string(),
      value: "zero".to_string(),
    }
  );
  let err = RunConfig::default()
    .with_overrides_from(|var| (var == RETRIES_ENV).then(|| "sometimes".to_string()))
    .unwrap_err();
  assert!(matches!(err, ConfigError::InvalidEnvOverride { .. }));
}

#[test]
fn no_env_leaves_config_untouched() {
  let config = RunConfig::default().with_overrides_from(|_| None).unwrap();
  assert_eq!(config, RunConfig::default());
}
