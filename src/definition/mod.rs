//! Graph model: solids, composites, dependencies, and the pipelines that own them.

mod composite;
#[cfg(test)]
mod composite_test;
mod dependency;
mod expectation;
mod graph;
mod graph_builder;
#[cfg(test)]
mod graph_test;
mod names;
mod node;
mod pipeline;
mod repository;
mod resource;
mod solid;

pub use composite::{CompositeDefinition, InputMapping, OutputMapping};
pub use dependency::{
  DependencyStructure, FanInMember, InputSource, SolidInputHandle, SolidOutputHandle,
};
pub use expectation::{ExpectationDefinition, ExpectationResult};
pub use graph::GraphDefinition;
pub use graph_builder::GraphBuilder;
pub use node::{NodeDefinition, SolidInvocation};
pub use pipeline::{DEFAULT_MODE, ModeDefinition, PipelineDefinition};
pub use repository::Repository;
pub use resource::{ConfigValueResource, ResourceDefinition, ResourceHandle};
pub use solid::{InputDefinition, OutputDefinition, SolidDefinition};
