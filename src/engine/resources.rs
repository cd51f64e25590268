//! Run-scoped resource lifecycle: acquired before the first step, released in reverse
//! order after the last. Resources still held when the run is dropped are released on
//! the current runtime in the background.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::definition::{ResourceDefinition, ResourceHandle};
use crate::error::{ConfigError, EngineError};
use crate::execution::Resources;
use crate::plan::ExecutionPlan;
use crate::types::ErrorInfo;

struct Acquired {
  name: String,
  definition: Arc<dyn ResourceDefinition>,
  handle: ResourceHandle,
}

/// Resources held open for one run.
pub(crate) struct RunResources {
  acquired: Vec<Acquired>,
}

impl RunResources {
  /// Acquires every resource of the plan's mode, releasing any already open on failure.
  pub(crate) async fn acquire(plan: &ExecutionPlan) -> Result<Self, EngineError> {
    let mode = plan
      .pipeline()
      .mode(plan.mode())
      .ok_or_else(|| ConfigError::ModeNotFound {
        pipeline: plan.pipeline_name().to_string(),
        mode: plan.mode().to_string(),
      })?;
    let mut resources = Self { acquired: vec![] };
    for (name, definition) in &mode.resources {
      let config = plan
        .run_config()
        .resources
        .get(name)
        .map(|r| r.config.clone())
        .unwrap_or(Value::Null);
      match definition.acquire(&config).await {
        Ok(handle) => {
          debug!(resource = %name, "resource acquired");
          resources.acquired.push(Acquired {
            name: name.clone(),
            definition: definition.clone(),
            handle,
          });
        }
        Err(e) => {
          let error = ErrorInfo::from_error(e.class_name(), &e);
          resources.release().await;
          return Err(EngineError::Resource {
            name: name.clone(),
            error,
          });
        }
      }
    }
    if !resources.acquired.is_empty() {
      info!(count = resources.acquired.len(), "run resources acquired");
    }
    Ok(resources)
  }

  /// Handles visible to step compute.
  pub(crate) fn resources(&self) -> Resources {
    Resources::new(
      self
        .acquired
        .iter()
        .map(|a| (a.name.clone(), a.handle.clone()))
        .collect::<HashMap<_, _>>(),
    )
  }

  /// Releases in reverse acquisition order; failures are logged and do not stop the rest.
  pub(crate) async fn release(mut self) {
    release_all(std::mem::take(&mut self.acquired)).await;
  }
}

impl Drop for RunResources {
  fn drop(&mut self) {
    if self.acquired.is_empty() {
      return;
    }
    let acquired = std::mem::take(&mut self.acquired);
    match tokio::runtime::Handle::try_current() {
      Ok(runtime) => {
        warn!(count = acquired.len(), "run stopped early, releasing resources");
        runtime.spawn(release_all(acquired));
      }
      Err(_) => error!(count = acquired.len(), "run stopped outside a runtime, resources not released"),
    }
  }
}

async fn release_all(acquired: Vec<Acquired>) {
  for acquired in acquired.into_iter().rev() {
    match acquired.definition.release(acquired.handle).await {
      Ok(()) => debug!(resource = %acquired.name, "resource released"),
      Err(e) => warn!(resource = %acquired.name, error = %e, "resource release failed"),
    }
  }
}
