//! Run bookkeeping boundary: where events go and where runs are recorded.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Event, EventKind, Run, RunStatus};

/// Receives every plan- and step-level event of a run, in emission order.
///
/// The coordinator awaits each call before emitting the next event.
#[async_trait]
pub trait EventSink: Send + Sync {
  async fn handle_event(&self, event: &Event);
}

/// Run storage used to bracket a run.
#[async_trait]
pub trait Instance: EventSink {
  async fn create_run(&self, run: Run) -> Run;

  async fn get_run_by_id(&self, run_id: Uuid) -> Option<Run>;

  /// Records an engine event that is not tied to a step.
  async fn report_engine_event(&self, run_id: Uuid, message: &str);

  async fn update_run_status(&self, run_id: Uuid, status: RunStatus);
}

/// Instance that keeps runs and their events in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstance {
  runs: Arc<RwLock<HashMap<Uuid, Run>>>,
  events: Arc<RwLock<HashMap<Uuid, Vec<Event>>>>,
}

impl InMemoryInstance {
  pub fn new() -> Self {
    Self::default()
  }

  /// Events recorded for `run_id`, in emission order.
  pub async fn events_for_run(&self, run_id: Uuid) -> Vec<Event> {
    self
      .events
      .read()
      .await
      .get(&run_id)
      .cloned()
      .unwrap_or_default()
  }

  pub async fn run_ids(&self) -> Vec<Uuid> {
    self.runs.read().await.keys().copied().collect()
  }
}

#[async_trait]
impl EventSink for InMemoryInstance {
  async fn handle_event(&self, event: &Event) {
    let status = match event.kind {
      EventKind::PlanStart => Some(RunStatus::Started),
      EventKind::PlanSuccess => Some(RunStatus::Success),
      EventKind::PlanFailure { .. } => Some(RunStatus::Failure),
      _ => None,
    };
    if let Some(status) = status {
      self.update_run_status(event.run_id, status).await;
    }
    self
      .events
      .write()
      .await
      .entry(event.run_id)
      .or_default()
      .push(event.clone());
  }
}

#[async_trait]
impl Instance for InMemoryInstance {
  async fn create_run(&self, run: Run) -> Run {
    info!(run_id = %run.run_id, pipeline = %run.pipeline_name, "run created");
    self.runs.write().await.insert(run.run_id, run.clone());
    run
  }

  async fn get_run_by_id(&self, run_id: Uuid) -> Option<Run> {
    self.runs.read().await.get(&run_id).cloned()
  }

  async fn report_engine_event(&self, run_id: Uuid, message: &str) {
    let pipeline_name = self
      .get_run_by_id(run_id)
      .await
      .map(|r| r.pipeline_name)
      .unwrap_or_default();
    let event = Event::plan_event(run_id, pipeline_name, EventKind::EngineEvent, message);
    self.handle_event(&event).await;
  }

  async fn update_run_status(&self, run_id: Uuid, status: RunStatus) {
    if let Some(run) = self.runs.write().await.get_mut(&run_id) {
      debug!(run_id = %run_id, %status, "run status updated");
      run.status = status;
    }
  }
}
