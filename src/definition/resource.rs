//! Run-scoped resources, acquired when a run starts and released when it finishes.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::execution::ComputeError;

/// A resource instance shared by every step of one run.
pub type ResourceHandle = Arc<dyn Any + Send + Sync>;

/// Definition of a run-scoped resource.
#[async_trait]
pub trait ResourceDefinition: Send + Sync {
  /// Opens the resource for one run.
  async fn acquire(&self, config: &Value) -> Result<ResourceHandle, ComputeError>;

  /// Closes the resource at the end of the run.
  async fn release(&self, _resource: ResourceHandle) -> Result<(), ComputeError> {
    Ok(())
  }
}

/// A resource whose instance is its config value.
#[derive(Debug, Clone, Default)]
pub struct ConfigValueResource;

#[async_trait]
impl ResourceDefinition for ConfigValueResource {
  async fn acquire(&self, config: &Value) -> Result<ResourceHandle, ComputeError> {
    Ok(Arc::new(config.clone()))
  }
}
