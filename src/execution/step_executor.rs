//! Step executor: runs one step under an error boundary and turns what its compute
//! yields into engine events.
//!
//! The event stream always opens with `StepStart` (or `StepRestarted` on a retry) and
//! ends with exactly one terminal event: `StepSuccess`, `StepFailure`, or
//! `StepUpForRetry`. User errors, panics, contract violations, and type-check
//! failures all become `StepFailure`; none escape as a Rust error.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::json_io::{load_json_value, write_json_value};
use super::{ComputeError, ComputeEvent, ComputeStream, StepContext};
use crate::config::{InputSpec, MaterializationSpec};
use crate::definition::ExpectationDefinition;
use crate::plan::{EXPECTATION_VALUE, ExecutionStep, JOIN_OUTPUT, MATERIALIZATION_VALUE, StepKind};
use crate::types::{ErrorInfo, Event, EventKind, InputValues, RetryMode};

fn step_event(context: &StepContext, kind: EventKind, message: String) -> Event {
  Event::step_event(
    context.run_id,
    context.pipeline_name.clone(),
    context.step_key.clone(),
    context.solid_handle.clone(),
    kind,
    message,
  )
}

fn panic_info(payload: Box<dyn Any + Send>) -> ErrorInfo {
  let message = payload
    .downcast_ref::<&str>()
    .map(|s| s.to_string())
    .or_else(|| payload.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "compute panicked".to_string());
  ErrorInfo::new("Panic", message)
}

/// Validates one emitted output against the step's declared outputs.
fn check_output(
  step: &ExecutionStep,
  emitted: &mut HashSet<String>,
  name: &str,
  value: &Value,
) -> Result<(), ErrorInfo> {
  let Some(output) = step.output(name) else {
    return Err(ErrorInfo::new(
      "UndeclaredOutput",
      format!("step \"{}\" emitted output \"{}\", which it does not declare", step.key, name),
    ));
  };
  if !emitted.insert(name.to_string()) {
    return Err(ErrorInfo::new(
      "DuplicateOutput",
      format!("step \"{}\" emitted output \"{}\" more than once", step.key, name),
    ));
  }
  output.runtime_type.type_check(value).map_err(|failure| {
    ErrorInfo::new(
      "TypeCheckFailure",
      format!(
        "type check failed for output \"{}\" of step \"{}\": expected {}, got {}",
        name, step.key, failure.expected, failure.value_repr
      ),
    )
  })
}

fn input_thunk_stream(values: BTreeMap<String, InputSpec>) -> ComputeStream {
  stream::iter(values)
    .then(|(name, spec)| async move {
      let value = match spec {
        InputSpec::Value(value) => value,
        InputSpec::Json { path } => load_json_value(&path).await?,
      };
      Ok::<_, ComputeError>(ComputeEvent::output(name, value))
    })
    .boxed()
}

fn expectation_stream(
  expectation: &ExpectationDefinition,
  context: &StepContext,
  inputs: &InputValues,
) -> ComputeStream {
  let value = inputs.get(EXPECTATION_VALUE).cloned().unwrap_or(Value::Null);
  let result = expectation.evaluate(context, &value);
  let mut events = vec![Ok(ComputeEvent::ExpectationResult {
    label: expectation.name.clone(),
    success: result.success,
    description: result.description.clone(),
  })];
  if result.success {
    events.push(Ok(ComputeEvent::output(EXPECTATION_VALUE, value)));
  } else {
    events.push(Err(ComputeError::failure(format!(
      "expectation \"{}\" failed: {}",
      expectation.name,
      result.description.unwrap_or_default()
    ))));
  }
  stream::iter(events).boxed()
}

fn join_stream(step: &ExecutionStep, inputs: &InputValues) -> ComputeStream {
  let first = step
    .inputs()
    .first()
    .and_then(|i| inputs.get(&i.name))
    .cloned()
    .unwrap_or(Value::Null);
  stream::once(async move { Ok::<_, ComputeError>(ComputeEvent::output(JOIN_OUTPUT, first)) }).boxed()
}

fn materialization_stream(
  step: &ExecutionStep,
  spec: MaterializationSpec,
  inputs: &InputValues,
) -> ComputeStream {
  let value = inputs.get(MATERIALIZATION_VALUE).cloned().unwrap_or(Value::Null);
  let label = step
    .input(MATERIALIZATION_VALUE)
    .and_then(|i| i.source.handles().first().map(|h| h.to_string()))
    .unwrap_or_else(|| step.key.clone());
  stream::once(async move {
    match spec {
      MaterializationSpec::Json { path } => {
        write_json_value(&path, &value).await?;
        Ok::<_, ComputeError>(ComputeEvent::Materialization {
          label,
          path: path.display().to_string(),
        })
      }
    }
  })
  .boxed()
}

/// Builds the compute stream for `step`'s kind.
fn compute_stream(step: &ExecutionStep, context: &StepContext, inputs: InputValues) -> ComputeStream {
  match &step.kind {
    StepKind::Transform { compute } => compute.compute(context.clone(), inputs),
    StepKind::InputThunk { values } => input_thunk_stream(values.clone()),
    StepKind::Expectation { expectation } => expectation_stream(expectation, context, &inputs),
    StepKind::Join => join_stream(step, &inputs),
    StepKind::Materialization { spec } => materialization_stream(step, spec.clone(), &inputs),
  }
}

/// Executes `step` with resolved `inputs`, yielding its events.
pub fn execute_step(
  step: Arc<ExecutionStep>,
  context: StepContext,
  inputs: InputValues,
  retry_mode: RetryMode,
) -> BoxStream<'static, Event> {
  Box::pin(stream! {
    let started = Instant::now();
    let attempt = context.retry_attempt;
    if attempt > 0 {
      info!(step_key = %step.key, attempt, "step restarted");
      yield step_event(
        &context,
        EventKind::StepRestarted { attempt },
        format!("Restarted execution of step \"{}\" (attempt {}).", step.key, attempt + 1),
      );
    } else {
      info!(step_key = %step.key, kind = %step.kind, "step started");
      yield step_event(
        &context,
        EventKind::StepStart,
        format!("Started execution of step \"{}\".", step.key),
      );
    }

    let mut failure: Option<ErrorInfo> = None;
    let mut retry: Option<(ErrorInfo, Option<f64>)> = None;
    let mut emitted: HashSet<String> = HashSet::new();

    if let Some(missing) = step.inputs().iter().find(|i| !inputs.contains_key(&i.name)) {
      failure = Some(ErrorInfo::new(
        "MissingInput",
        format!("no value available for input \"{}\" of step \"{}\"", missing.name, step.key),
      ));
    }

    if failure.is_none() {
      let built = std::panic::catch_unwind(AssertUnwindSafe(|| {
        compute_stream(&step, &context, inputs)
      }));
      match built {
        Err(payload) => failure = Some(panic_info(payload)),
        Ok(events) => {
          let mut events = AssertUnwindSafe(events).catch_unwind();
          while let Some(item) = events.next().await {
            match item {
              Err(payload) => {
                failure = Some(panic_info(payload));
                break;
              }
              Ok(Ok(ComputeEvent::Output { name, value })) => {
                if let Err(info) = check_output(&step, &mut emitted, &name, &value) {
                  failure = Some(info);
                  break;
                }
                yield step_event(
                  &context,
                  EventKind::StepOutput { output_name: name.clone(), value },
                  format!("Yielded output \"{}\".", name),
                );
              }
              Ok(Ok(ComputeEvent::ExpectationResult { label, success, description })) => {
                let message = format!(
                  "Expectation \"{}\" {}.",
                  label,
                  if success { "passed" } else { "failed" }
                );
                yield step_event(
                  &context,
                  EventKind::ExpectationResult { label, success, description },
                  message,
                );
              }
              Ok(Ok(ComputeEvent::Materialization { label, path })) => {
                let message = format!("Materialized \"{}\" to {}.", label, path);
                yield step_event(&context, EventKind::Materialization { label, path }, message);
              }
              Ok(Err(ComputeError::RetryRequested { max_retries, seconds_to_wait, cause })) => {
                let info = ErrorInfo::new(
                  "RetryRequested",
                  cause.unwrap_or_else(|| "retry requested".to_string()),
                );
                if retry_mode.disabled() {
                  failure = Some(info.with_cause("retries are disabled for this run"));
                } else if attempt >= max_retries {
                  failure = Some(
                    ErrorInfo::new(
                      "RetryLimitExceeded",
                      format!("step \"{}\" exceeded max_retries of {}", step.key, max_retries),
                    )
                    .with_cause(info.message),
                  );
                } else {
                  retry = Some((info, seconds_to_wait));
                }
                break;
              }
              Ok(Err(err)) => {
                failure = Some(ErrorInfo::from_error(err.class_name(), &err));
                break;
              }
            }
          }
          // Dropping the stream closes the compute early.
          drop(events);

          if failure.is_none() && retry.is_none() {
            for output in step.outputs() {
              if emitted.contains(&output.name) {
                continue;
              }
              if output.is_required {
                failure = Some(ErrorInfo::new(
                  "MissingRequiredOutput",
                  format!(
                    "step \"{}\" did not emit required output \"{}\"",
                    step.key, output.name
                  ),
                ));
                break;
              }
              debug!(step_key = %step.key, output = %output.name, "optional output not emitted");
            }
          }
        }
      }
    }

    if let Some(error) = failure {
      warn!(step_key = %step.key, error = %error, "step failed");
      yield step_event(
        &context,
        EventKind::StepFailure { error },
        format!("Execution of step \"{}\" failed.", step.key),
      );
    } else if let Some((error, seconds_to_wait)) = retry {
      info!(step_key = %step.key, ?seconds_to_wait, "step requested retry");
      yield step_event(
        &context,
        EventKind::StepUpForRetry { error, seconds_to_wait, attempt: attempt + 1 },
        format!("Execution of step \"{}\" requested a retry.", step.key),
      );
    } else {
      let duration_ms = started.elapsed().as_millis() as u64;
      info!(step_key = %step.key, duration_ms, "step succeeded");
      yield step_event(
        &context,
        EventKind::StepSuccess { duration_ms },
        format!("Finished execution of step \"{}\" in {}ms.", step.key, duration_ms),
      );
    }
  })
}
