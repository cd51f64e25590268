//! Error types for graph definition, configuration, plan building, and coordination.
//!
//! Node-local failures (user code, type checks, output contract violations) never
//! surface through these types; they become `StepFailure` events. Only build-time
//! errors and coordinator invariant violations are returned as `Err`.

use thiserror::Error;

use crate::types::ErrorInfo;

/// Fatal errors raised while constructing a graph or pipeline definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
  #[error("invalid {kind} name '{name}': names must match ^[A-Za-z0-9_]+$")]
  InvalidName { kind: String, name: String },
  #[error("graph '{graph}' has more than one solid named '{name}'")]
  DuplicateSolid { graph: String, name: String },
  #[error("solid '{solid}' declares {kind} '{name}' more than once")]
  DuplicateIODefinition {
    solid: String,
    kind: String,
    name: String,
  },
  #[error("graph '{graph}' references unknown solid '{name}'")]
  UnknownSolid { graph: String, name: String },
  #[error("solid '{solid}' has no input named '{input}'")]
  UnknownInput { solid: String, input: String },
  #[error("solid '{solid}' has no output named '{output}'")]
  UnknownOutput { solid: String, output: String },
  #[error("input '{input}' of solid '{solid}' has more than one dependency")]
  DuplicateDependency { solid: String, input: String },
  #[error("fan-in dependency for input '{input}' of solid '{solid}' is empty")]
  EmptyFanIn { solid: String, input: String },
  #[error("mapped input placeholder used outside a composite for input '{input}' of solid '{solid}'")]
  UnfilledPlaceholder { solid: String, input: String },
  #[error("graph '{graph}' contains a dependency cycle through solids {solids:?}")]
  GraphCycle { graph: String, solids: Vec<String> },
  #[error("composite '{composite}' has an invalid mapping: {message}")]
  InvalidMapping { composite: String, message: String },
  #[error(
    "composite '{composite}' maps '{mapping}' with type {outer} onto inner type {inner}; types must match exactly"
  )]
  MappingTypeMismatch {
    composite: String,
    mapping: String,
    outer: String,
    inner: String,
  },
  #[error("pipeline '{pipeline}' declares mode '{mode}' more than once")]
  DuplicateMode { pipeline: String, mode: String },
  #[error("pipeline '{pipeline}' must declare at least one mode")]
  NoModes { pipeline: String },
}

/// Errors in the structure of a run configuration, raised before execution begins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("run config could not be parsed: {0}")]
  Parse(String),
  #[error("run config references unknown solid '{path}'")]
  UnknownSolid { path: String },
  #[error("run config provides input '{input}' that solid '{solid}' does not declare")]
  UnknownInput { solid: String, input: String },
  #[error("run config materializes output '{output}' that solid '{solid}' does not declare")]
  UnknownOutput { solid: String, output: String },
  #[error("input '{input}' of solid '{solid}' is satisfied by a dependency and cannot also be configured")]
  InputAlreadySatisfied { solid: String, input: String },
  #[error("run config nests solids under '{solid}', which is not a composite")]
  NotAComposite { solid: String },
  #[error("config for solid '{solid}' does not match its declared type: {message}")]
  ConfigTypeMismatch { solid: String, message: String },
  #[error("pipeline '{pipeline}' has no mode named '{mode}'")]
  ModeNotFound { pipeline: String, mode: String },
  #[error("run config references resource '{resource}' that mode '{mode}' does not provide")]
  UnknownResource { mode: String, resource: String },
  #[error("environment variable {var} has invalid value '{value}'")]
  InvalidEnvOverride { var: String, value: String },
}

/// Errors raised while building, subsetting, or querying an execution plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(
    "input '{input}' of solid '{solid}' is not connected to a dependency and has no configured value"
  )]
  UnresolvedInput { solid: String, input: String },
  #[error("duplicate step key '{key}' in execution plan")]
  DuplicateStepKey { key: String },
  #[error("step '{step}' input '{input}' has no source in the requested subset")]
  InvalidSubset { step: String, input: String },
  #[error("step '{key}' not found in execution plan")]
  StepNotFound { key: String },
}

/// Coordinator invariant violations raised by the active execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActiveExecutionError {
  #[error("execution of plan exited with steps {steps:?} in an incomplete state")]
  IncompleteExecutionPlan { steps: Vec<String> },
  #[error("execution of plan exited with steps {steps:?} whose terminal outcome was never observed")]
  UnknownStepState { steps: Vec<String> },
  #[error("step '{key}' cannot be marked {transition}: it is not in flight")]
  NotInFlight { key: String, transition: String },
  #[error("step '{key}' requested a retry but retries are disabled for this run")]
  RetriesDisabled { key: String },
  #[error("step '{key}' not found in execution plan")]
  UnknownStep { key: String },
}

/// Errors that abort a run before or around plan execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
  #[error(transparent)]
  Plan(#[from] PlanError),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  ActiveExecution(#[from] ActiveExecutionError),
  #[error("resource '{name}' failed: {error}")]
  Resource { name: String, error: ErrorInfo },
  #[error("pipeline '{name}' not found in repository")]
  PipelineNotFound { name: String },
  #[error("step worker failed: {0}")]
  Worker(String),
}
