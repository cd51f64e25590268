//! Immutable execution plan: an arena of steps in build order plus the dependency map
//! used to seed an active execution.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, instrument};

use super::ExecutionStep;
use super::builder::PlanBuilder;
use crate::config::{RunConfig, resolve_mode, validate_run_config};
use crate::definition::PipelineDefinition;
use crate::error::PlanError;

/// Flattened, validated plan for one pipeline run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
  pipeline: Arc<PipelineDefinition>,
  run_config: Arc<RunConfig>,
  mode: String,
  steps: Vec<Arc<ExecutionStep>>,
  index: HashMap<String, usize>,
  deps: BTreeMap<String, BTreeSet<String>>,
  step_keys_to_execute: Option<Vec<String>>,
}

impl ExecutionPlan {
  /// Builds the full plan for `pipeline` under `run_config` and `mode`.
  #[instrument(level = "trace", skip(pipeline, run_config), fields(pipeline = %pipeline.name))]
  pub fn build(
    pipeline: Arc<PipelineDefinition>,
    run_config: Arc<RunConfig>,
    mode: Option<&str>,
  ) -> Result<Self, PlanError> {
    Self::build_with(pipeline, run_config, mode, false)
  }

  /// Full build; `allow_config_on_connected` keeps config literals on connected inputs
  /// for a following subset build.
  pub(crate) fn build_with(
    pipeline: Arc<PipelineDefinition>,
    run_config: Arc<RunConfig>,
    mode: Option<&str>,
    allow_config_on_connected: bool,
  ) -> Result<Self, PlanError> {
    let mode_def = resolve_mode(&pipeline, mode)?;
    validate_run_config(&run_config, &pipeline, mode_def)?;
    let mode = mode_def.name.clone();
    let steps = PlanBuilder::new(&run_config, allow_config_on_connected).build(&pipeline)?;
    let plan = Self::from_steps(pipeline, run_config, mode, steps, None)?;
    info!(
      pipeline = %plan.pipeline.name,
      mode = %plan.mode,
      step_count = plan.steps.len(),
      "execution plan built"
    );
    Ok(plan)
  }

  /// Assembles a plan from steps already ordered so producers precede consumers.
  pub(crate) fn from_steps(
    pipeline: Arc<PipelineDefinition>,
    run_config: Arc<RunConfig>,
    mode: String,
    steps: Vec<ExecutionStep>,
    step_keys_to_execute: Option<Vec<String>>,
  ) -> Result<Self, PlanError> {
    let mut index = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
      if index.insert(step.key.clone(), i).is_some() {
        return Err(PlanError::DuplicateStepKey {
          key: step.key.clone(),
        });
      }
    }
    let mut deps = BTreeMap::new();
    for step in &steps {
      for input in &step.inputs {
        for upstream in input.dependency_keys() {
          if !index.contains_key(upstream) {
            return Err(PlanError::InvalidSubset {
              step: step.key.clone(),
              input: input.name.clone(),
            });
          }
        }
      }
      deps.insert(step.key.clone(), step.dependency_keys());
    }
    Ok(Self {
      pipeline,
      run_config,
      mode,
      steps: steps.into_iter().map(Arc::new).collect(),
      index,
      deps,
      step_keys_to_execute,
    })
  }

  pub fn pipeline(&self) -> &Arc<PipelineDefinition> {
    &self.pipeline
  }

  pub fn pipeline_name(&self) -> &str {
    &self.pipeline.name
  }

  pub fn run_config(&self) -> &Arc<RunConfig> {
    &self.run_config
  }

  pub fn mode(&self) -> &str {
    &self.mode
  }

  /// Steps in build order; every producer precedes its consumers.
  pub fn steps(&self) -> &[Arc<ExecutionStep>] {
    &self.steps
  }

  pub fn step_keys(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.key.as_str()).collect()
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn has_step(&self, key: &str) -> bool {
    self.index.contains_key(key)
  }

  /// Position of `key` in build order.
  pub fn step_position(&self, key: &str) -> Option<usize> {
    self.index.get(key).copied()
  }

  pub fn get_step_by_key(&self, key: &str) -> Result<&Arc<ExecutionStep>, PlanError> {
    self
      .index
      .get(key)
      .map(|&i| &self.steps[i])
      .ok_or_else(|| PlanError::StepNotFound {
        key: key.to_string(),
      })
  }

  /// Step key → upstream step keys.
  pub fn execution_deps(&self) -> &BTreeMap<String, BTreeSet<String>> {
    &self.deps
  }

  /// Keys requested when this plan was built as a subset.
  pub fn step_keys_to_execute(&self) -> Option<&[String]> {
    self.step_keys_to_execute.as_deref()
  }

  /// Lazily yields levels of steps whose dependencies all lie in earlier levels.
  pub fn topological_step_levels(&self) -> StepLevels<'_> {
    StepLevels {
      plan: self,
      done: HashSet::new(),
      remaining: self.steps.iter().collect(),
    }
  }
}

/// Iterator returned by [ExecutionPlan::topological_step_levels].
pub struct StepLevels<'a> {
  plan: &'a ExecutionPlan,
  done: HashSet<&'a str>,
  remaining: Vec<&'a Arc<ExecutionStep>>,
}

impl<'a> Iterator for StepLevels<'a> {
  type Item = Vec<Arc<ExecutionStep>>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining.is_empty() {
      return None;
    }
    let deps = &self.plan.deps;
    let done = &self.done;
    let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.remaining)
      .into_iter()
      .partition(|step| {
        deps
          .get(&step.key)
          .is_none_or(|upstream| upstream.iter().all(|k| done.contains(k.as_str())))
      });
    self.remaining = rest;
    if ready.is_empty() {
      return None;
    }
    for step in ready.iter().copied() {
      self.done.insert(step.key.as_str());
    }
    Some(ready.into_iter().cloned().collect())
  }
}
