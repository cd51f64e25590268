//! Named collection of pipelines, used by step workers to rebuild a plan from wire arguments.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::PipelineDefinition;

/// Pipelines addressable by name.
#[derive(Debug, Clone, Default)]
pub struct Repository {
  pipelines: BTreeMap<String, Arc<PipelineDefinition>>,
}

impl Repository {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_pipeline(mut self, pipeline: PipelineDefinition) -> Self {
    self.add_pipeline(Arc::new(pipeline));
    self
  }

  pub fn add_pipeline(&mut self, pipeline: Arc<PipelineDefinition>) {
    self.pipelines.insert(pipeline.name.clone(), pipeline);
  }

  pub fn pipeline(&self, name: &str) -> Option<Arc<PipelineDefinition>> {
    self.pipelines.get(name).cloned()
  }

  pub fn pipeline_names(&self) -> Vec<&str> {
    self.pipelines.keys().map(String::as_str).collect()
  }
}
