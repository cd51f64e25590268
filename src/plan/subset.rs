//! Reduced plans restricted to a requested set of step keys.
//!
//! Inputs whose producer is excluded are satisfied by injected value steps: either a
//! synthetic step that reuses the excluded producer's key and re-emits a known
//! output value, or an input thunk built from a config literal for that input.
//! A fan-in input with at least one known member keeps only its known and
//! requested members.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, instrument};

use super::step::{INPUT_THUNK_OUTPUT, input_thunk_key};
use super::{ExecutionPlan, ExecutionStep, StepInputSource, StepKind, StepOutput};
use crate::config::InputSpec;
use crate::error::PlanError;
use crate::types::{RuntimeType, StepOutputHandle};

impl ExecutionPlan {
  /// Builds a plan holding only `step_keys`, plus whatever value steps their inputs need.
  ///
  /// `known_outputs` supplies values already produced by excluded steps (e.g. in an
  /// earlier run). Fails with [PlanError::InvalidSubset] naming the first step input
  /// that nothing can satisfy.
  #[instrument(level = "trace", skip(self, known_outputs))]
  pub fn build_subset(
    &self,
    step_keys: &[String],
    known_outputs: &HashMap<StepOutputHandle, Value>,
  ) -> Result<ExecutionPlan, PlanError> {
    let mut requested = HashSet::new();
    for key in step_keys {
      self.get_step_by_key(key)?;
      requested.insert(key.as_str());
    }

    let mut injected: BTreeMap<usize, ExecutionStep> = BTreeMap::new();
    let mut thunks: Vec<ExecutionStep> = vec![];
    let mut subset: Vec<ExecutionStep> = vec![];

    for step in self.steps().iter().filter(|s| requested.contains(s.key.as_str())) {
      let mut step = ExecutionStep::clone(step);
      for input in &mut step.inputs {
        let missing: Vec<StepOutputHandle> = input
          .source
          .handles()
          .into_iter()
          .filter(|h| !requested.contains(h.step_key.as_str()))
          .cloned()
          .collect();
        if missing.is_empty() {
          continue;
        }

        if missing.iter().all(|h| known_outputs.contains_key(h)) {
          for handle in missing {
            self.inject_known_output(&mut injected, &handle, &known_outputs[&handle])?;
          }
          continue;
        }

        // A fan-in runs on whichever members produced; members with no known value are dropped.
        let narrowed = match &input.source {
          StepInputSource::FanIn(handles) if missing.iter().any(|h| known_outputs.contains_key(h)) => {
            Some(
              handles
                .iter()
                .filter(|h| requested.contains(h.step_key.as_str()) || known_outputs.contains_key(*h))
                .cloned()
                .collect::<Vec<_>>(),
            )
          }
          _ => None,
        };
        if let Some(kept) = narrowed {
          for handle in missing.iter().filter(|h| known_outputs.contains_key(*h)) {
            self.inject_known_output(&mut injected, handle, &known_outputs[handle])?;
          }
          debug!(
            step_key = %step.key,
            input = %input.name,
            members = kept.len(),
            "fan-in narrowed to known members"
          );
          input.source = StepInputSource::FanIn(kept);
          continue;
        }

        let configured = match step.kind {
          StepKind::Transform { .. } => self
            .run_config()
            .solid_config(&step.solid_handle)
            .and_then(|c| c.inputs.get(&input.name))
            .cloned(),
          _ => None,
        };
        let Some(spec) = configured else {
          return Err(PlanError::InvalidSubset {
            step: step.key.clone(),
            input: input.name.clone(),
          });
        };
        let thunk = ExecutionStep {
          key: input_thunk_key(&step.solid_handle, &input.name),
          solid_handle: step.solid_handle.clone(),
          kind: StepKind::InputThunk {
            values: BTreeMap::from([(INPUT_THUNK_OUTPUT.to_string(), spec)]),
          },
          inputs: vec![],
          outputs: vec![StepOutput::new(
            INPUT_THUNK_OUTPUT,
            input.runtime_type.clone(),
            true,
          )],
          tags: step.tags.clone(),
          solid_config: step.solid_config.clone(),
        };
        input.source = StepInputSource::Single(thunk.output_handle(INPUT_THUNK_OUTPUT));
        thunks.push(thunk);
      }
      subset.push(step);
    }

    debug!(
      requested = subset.len(),
      injected = injected.len() + thunks.len(),
      "subset plan built"
    );
    let steps = injected.into_values().chain(thunks).chain(subset).collect();
    ExecutionPlan::from_steps(
      self.pipeline().clone(),
      self.run_config().clone(),
      self.mode().to_string(),
      steps,
      Some(step_keys.to_vec()),
    )
  }

  /// Adds `value` as an output of the synthetic step standing in for `handle`'s producer.
  fn inject_known_output(
    &self,
    injected: &mut BTreeMap<usize, ExecutionStep>,
    handle: &StepOutputHandle,
    value: &Value,
  ) -> Result<(), PlanError> {
    let producer = self.get_step_by_key(&handle.step_key)?;
    let position = self.step_position(&handle.step_key).unwrap_or(usize::MAX);
    let step = injected.entry(position).or_insert_with(|| ExecutionStep {
      key: producer.key.clone(),
      solid_handle: producer.solid_handle.clone(),
      kind: StepKind::InputThunk {
        values: BTreeMap::new(),
      },
      inputs: vec![],
      outputs: vec![],
      tags: producer.tags.clone(),
      solid_config: producer.solid_config.clone(),
    });
    if let StepKind::InputThunk { values } = &mut step.kind {
      values.insert(handle.output_name.clone(), InputSpec::Value(value.clone()));
    }
    if step.output(&handle.output_name).is_none() {
      let runtime_type = producer
        .output(&handle.output_name)
        .map(|o| o.runtime_type.clone())
        .unwrap_or(RuntimeType::Any);
      step
        .outputs
        .push(StepOutput::new(handle.output_name.clone(), runtime_type, true));
    }
    Ok(())
  }
}
