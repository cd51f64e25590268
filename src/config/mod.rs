//! Run configuration and its validation against a pipeline.

mod run_config;
#[cfg(test)]
mod run_config_test;
mod validate;

pub use run_config::{
  ExecutionConfig, ExpectationsConfig, InputSpec, MAX_CONCURRENT_ENV, MaterializationSpec,
  RETRIES_ENV, ResourceConfig, RetriesConfig, RunConfig, SolidConfig,
};
pub use validate::{resolve_mode, validate_run_config};
