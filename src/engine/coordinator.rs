//! The coordinating loop of a run.
//!
//! One task owns the [ActiveExecution]. Each pass bookkeeps skipped and abandoned
//! steps, launches ready steps up to the executor's limit, then waits for the next
//! step event (or for a delayed retry to come due) and feeds it back. The run is
//! bracketed by `PlanStart` and `PlanSuccess`/`PlanFailure`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_stream::stream;
use futures::stream::{self, BoxStream, SelectAll, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::resources::RunResources;
use super::{EventSink, Executor, RunContext, StepLaunch};
use crate::active::ActiveExecution;
use crate::error::ActiveExecutionError;
use crate::execution::{Intermediates, Resources, StepContext};
use crate::plan::{ExecutionPlan, ExecutionStep};
use crate::types::{ErrorInfo, Event, EventKind, RetryMode};

enum StepMessage {
  Event(Event),
  /// The step's event stream ended; `terminal` is whether it carried a terminal event.
  Finished { key: String, terminal: bool },
}

struct Coordinator {
  run_id: Uuid,
  pipeline_name: String,
  plan: Arc<ExecutionPlan>,
  executor: Arc<dyn Executor>,
  retry_mode: RetryMode,
  active: ActiveExecution,
  intermediates: Intermediates,
  resources: Resources,
  running: SelectAll<BoxStream<'static, StepMessage>>,
}

impl Coordinator {
  fn step_event(&self, step: &ExecutionStep, kind: EventKind, message: String) -> Event {
    Event::step_event(
      self.run_id,
      self.pipeline_name.clone(),
      step.key.clone(),
      step.solid_handle.clone(),
      kind,
      message,
    )
  }

  /// Settles skips and abandons until none remain, then launches what fits.
  fn schedule(&mut self) -> Result<Vec<Event>, ActiveExecutionError> {
    let mut events = vec![];
    loop {
      let abandon = self.active.get_steps_to_abandon();
      let skip = self.active.get_steps_to_skip();
      if abandon.is_empty() && skip.is_empty() {
        break;
      }
      for step in abandon {
        self.active.mark_abandoned(&step.key)?;
      }
      for step in skip {
        self.active.mark_skipped(&step.key)?;
        events.push(self.step_event(
          &step,
          EventKind::StepSkipped,
          format!("Skipped execution of step \"{}\".", step.key),
        ));
      }
    }

    let capacity = self
      .executor
      .max_concurrent()
      .saturating_sub(self.running.len());
    if capacity > 0 {
      for step in self.active.get_steps_to_execute(Some(capacity)) {
        self.launch(step);
      }
    }
    Ok(events)
  }

  fn launch(&mut self, step: Arc<ExecutionStep>) {
    let attempt = self.active.retry_state().get_attempt_count(&step.key);
    debug!(step_key = %step.key, attempt, executor = self.executor.name(), "launching step");
    let launch = StepLaunch {
      plan: self.plan.clone(),
      context: StepContext::new(
        self.run_id,
        self.pipeline_name.clone(),
        &step,
        attempt,
        self.resources.clone(),
      ),
      inputs: self.intermediates.gather_inputs(&step),
      known_outputs: self.intermediates.values_for(&step),
      retry_mode: self.retry_mode,
      retry_state: self.active.retry_state().clone(),
      step: step.clone(),
    };
    let key = step.key.clone();
    let terminal = Arc::new(AtomicBool::new(false));
    let seen = terminal.clone();
    let events = self
      .executor
      .launch(launch)
      .inspect(move |event| {
        if event.step_outcome().is_some() {
          seen.store(true, Ordering::SeqCst);
        }
      })
      .map(StepMessage::Event)
      .chain(stream::once(async move {
        StepMessage::Finished {
          key,
          terminal: terminal.load(Ordering::SeqCst),
        }
      }));
    self.running.push(events.boxed());
  }

  /// Records a step event; outputs are stored before the state machine sees them.
  fn observe(&mut self, event: &Event) -> Result<(), ActiveExecutionError> {
    match (&event.kind, event.step_key.as_deref()) {
      (EventKind::StepOutput { value, .. }, _) => {
        if let Some(handle) = event.output_handle() {
          self.intermediates.insert(handle, value.clone());
        }
      }
      (EventKind::StepUpForRetry { .. }, Some(key)) => self.intermediates.remove_step(key),
      _ => {}
    }
    self.active.handle_event(event)
  }

  /// Whether nothing can make progress without a step finishing or a retry coming due.
  fn is_stalled(&self) -> bool {
    self.running.is_empty() && !self.active.has_waiting_to_retry()
  }
}

async fn publish(sinks: &[Arc<dyn EventSink>], event: &Event) {
  for sink in sinks {
    sink.handle_event(event).await;
  }
}

fn plan_failure(run_id: Uuid, pipeline_name: &str, error: ErrorInfo) -> Event {
  let message = format!("Execution of pipeline \"{}\" failed: {}", pipeline_name, error.message);
  Event::plan_event(
    run_id,
    pipeline_name,
    EventKind::PlanFailure { error: Some(error) },
    message,
  )
}

/// Runs `plan` on `executor`, yielding every event of the run.
///
/// Dropping the stream stops the run without a closing plan event; resources it still
/// holds are released in the background.
pub fn execute_plan_with(
  plan: Arc<ExecutionPlan>,
  executor: Arc<dyn Executor>,
  run_context: RunContext,
) -> BoxStream<'static, Event> {
  Box::pin(stream! {
    let run_id = run_context.run_id;
    let pipeline_name = plan.pipeline_name().to_string();
    let sinks = run_context.sinks.clone();
    let interrupt = run_context.interrupt.clone();

    info!(
      run_id = %run_id,
      pipeline = %pipeline_name,
      steps = plan.len(),
      executor = executor.name(),
      "plan started"
    );
    let start = Event::plan_event(
      run_id,
      pipeline_name.clone(),
      EventKind::PlanStart,
      format!("Started execution of pipeline \"{}\".", pipeline_name),
    );
    publish(&sinks, &start).await;
    yield start;

    let run_resources = match RunResources::acquire(&plan).await {
      Ok(r) => r,
      Err(e) => {
        error!(error = %e, "resource acquisition failed");
        let failure = plan_failure(run_id, &pipeline_name, ErrorInfo::from_error("ResourceError", &e));
        publish(&sinks, &failure).await;
        yield failure;
        return;
      }
    };

    let retry_mode = plan.run_config().retry_mode();
    let mut active = ActiveExecution::new(plan.clone(), retry_mode)
      .with_retry_state(run_context.retry_state.clone());
    if let Some(sort_key) = run_context.sort_key.clone() {
      active = active.with_sort_key(sort_key);
    }
    let mut coordinator = Coordinator {
      run_id,
      pipeline_name: pipeline_name.clone(),
      plan: plan.clone(),
      executor: executor.clone(),
      retry_mode,
      active,
      intermediates: Intermediates::new(),
      resources: run_resources.resources(),
      running: SelectAll::new(),
    };

    let mut interrupted = false;
    let mut fatal: Option<ActiveExecutionError> = None;
    'run: loop {
      if !interrupted && interrupt.is_interrupted() {
        interrupted = true;
        let in_flight = coordinator.active.in_flight_keys();
        warn!(in_flight = ?in_flight, "run interrupted, launching no further steps");
        for key in &in_flight {
          coordinator.active.mark_interrupted(key);
        }
      }

      if !interrupted {
        match coordinator.schedule() {
          Ok(events) => {
            for event in events {
              publish(&sinks, &event).await;
              yield event;
            }
          }
          Err(e) => {
            fatal = Some(e);
            break 'run;
          }
        }
      }

      if coordinator.running.is_empty() {
        if interrupted || coordinator.active.is_complete() || coordinator.is_stalled() {
          break 'run;
        }
        coordinator.active.sleep_til_ready().await;
        continue 'run;
      }

      let wake_for_retry = !interrupted
        && coordinator.active.has_waiting_to_retry()
        && coordinator.running.len() < executor.max_concurrent();
      let message = tokio::select! {
        message = coordinator.running.next() => message,
        _ = coordinator.active.sleep_til_ready(), if wake_for_retry => continue 'run,
      };
      match message {
        Some(StepMessage::Event(event)) => {
          if let Err(e) = coordinator.observe(&event) {
            fatal = Some(e);
            break 'run;
          }
          publish(&sinks, &event).await;
          yield event;
        }
        Some(StepMessage::Finished { key, terminal }) => {
          if !terminal {
            coordinator.active.verify_complete(&key);
          }
        }
        None => {}
      }
    }

    let Coordinator { active, running, .. } = coordinator;
    drop(running);
    let failed: Vec<String> = active
      .failed()
      .iter()
      .chain(active.abandoned())
      .cloned()
      .collect();
    let closed = active.close();
    run_resources.release().await;

    let outcome = if let Some(e) = fatal {
      error!(error = %e, "coordinator invariant violated");
      Err(ErrorInfo::from_error("ActiveExecutionError", &e))
    } else if interrupted {
      if let Err(e) = closed {
        warn!(error = %e, "interrupted run left steps incomplete");
      }
      Err(ErrorInfo::new("Interrupted", "execution was interrupted"))
    } else if let Err(e) = closed {
      error!(error = %e, "plan did not complete");
      Err(ErrorInfo::from_error("ActiveExecutionError", &e))
    } else if !failed.is_empty() {
      Err(ErrorInfo::new(
        "StepFailure",
        format!("steps did not succeed: {}", failed.join(", ")),
      ))
    } else {
      Ok(())
    };

    let last = match outcome {
      Ok(()) => {
        info!(run_id = %run_id, pipeline = %pipeline_name, "plan succeeded");
        Event::plan_event(
          run_id,
          pipeline_name.clone(),
          EventKind::PlanSuccess,
          format!("Finished execution of pipeline \"{}\".", pipeline_name),
        )
      }
      Err(error) => {
        warn!(run_id = %run_id, pipeline = %pipeline_name, error = %error, "plan failed");
        plan_failure(run_id, &pipeline_name, error)
      }
    };
    publish(&sinks, &last).await;
    yield last;
  })
}

/// Runs `plan` on the executor `run_context` selects (see [RunContext::executor_for]).
pub fn execute_plan_in_context(plan: Arc<ExecutionPlan>, run_context: RunContext) -> BoxStream<'static, Event> {
  let executor = run_context.executor_for(plan.run_config());
  execute_plan_with(plan, executor, run_context)
}
