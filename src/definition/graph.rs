//! Graph definitions: solid invocations plus the dependency structure between them.
//!
//! A graph is validated when it is built: names are unique, every dependency points
//! at real inputs and outputs, no input has two sources, and the dependency structure
//! is acyclic. The topological order is computed once and reused by the plan builder.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, instrument};

use super::names::check_valid_name;
use super::{InputSource, SolidInputHandle, SolidInvocation};
use super::{DependencyStructure, FanInMember};
use crate::error::DefinitionError;

/// An immutable, validated graph of solid invocations.
#[derive(Debug, Clone)]
pub struct GraphDefinition {
  pub name: String,
  solids: Vec<SolidInvocation>,
  dependencies: DependencyStructure,
  /// Indices into `solids`, upstream first.
  topological_order: Vec<usize>,
}

impl GraphDefinition {
  #[instrument(level = "trace", skip_all)]
  pub fn new(
    name: impl Into<String>,
    solids: Vec<SolidInvocation>,
    dependencies: Vec<(SolidInputHandle, InputSource)>,
  ) -> Result<Self, DefinitionError> {
    let name: String = name.into();
    check_valid_name("graph", &name)?;

    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, solid) in solids.iter().enumerate() {
      check_valid_name("solid", &solid.name)?;
      if index.insert(solid.name.as_str(), i).is_some() {
        return Err(DefinitionError::DuplicateSolid {
          graph: name.clone(),
          name: solid.name.clone(),
        });
      }
    }

    let mut structure = DependencyStructure::default();
    for (handle, source) in dependencies {
      let target = index
        .get(handle.solid.as_str())
        .map(|&i| &solids[i])
        .ok_or_else(|| DefinitionError::UnknownSolid {
          graph: name.clone(),
          name: handle.solid.clone(),
        })?;
      if target.definition.input_def(&handle.input).is_none() {
        return Err(DefinitionError::UnknownInput {
          solid: handle.solid.clone(),
          input: handle.input.clone(),
        });
      }
      if let InputSource::FanIn(members) = &source
        && members.is_empty()
      {
        return Err(DefinitionError::EmptyFanIn {
          solid: handle.solid.clone(),
          input: handle.input.clone(),
        });
      }
      for upstream in source.upstream_outputs() {
        let producer = index
          .get(upstream.solid.as_str())
          .map(|&i| &solids[i])
          .ok_or_else(|| DefinitionError::UnknownSolid {
            graph: name.clone(),
            name: upstream.solid.clone(),
          })?;
        if producer.definition.output_def(&upstream.output).is_none() {
          return Err(DefinitionError::UnknownOutput {
            solid: upstream.solid.clone(),
            output: upstream.output.clone(),
          });
        }
      }
      if !structure.insert(handle.clone(), source) {
        return Err(DefinitionError::DuplicateDependency {
          solid: handle.solid,
          input: handle.input,
        });
      }
    }

    let topological_order = topological_order(&name, &solids, &structure)?;
    debug!(
      graph = %name,
      solid_count = solids.len(),
      dependency_count = structure.len(),
      "graph validated"
    );
    Ok(Self {
      name,
      solids,
      dependencies: structure,
      topological_order,
    })
  }

  pub fn solids(&self) -> &[SolidInvocation] {
    &self.solids
  }

  pub fn solid(&self, name: &str) -> Option<&SolidInvocation> {
    self.solids.iter().find(|s| s.name == name)
  }

  pub fn dependencies(&self) -> &DependencyStructure {
    &self.dependencies
  }

  pub fn dependency(&self, solid: &str, input: &str) -> Option<&InputSource> {
    self.dependencies.source(solid, input)
  }

  /// Solids ordered so every solid follows all of its upstream dependencies.
  ///
  /// Solids with no relative ordering constraint keep declaration order.
  pub fn solids_in_topological_order(&self) -> Vec<&SolidInvocation> {
    self
      .topological_order
      .iter()
      .map(|&i| &self.solids[i])
      .collect()
  }

  /// Inputs whose fan-in dependency still holds a mapped-input placeholder.
  pub(crate) fn placeholder_inputs(&self) -> Vec<&SolidInputHandle> {
    self
      .dependencies
      .iter()
      .filter(|(_, source)| match source {
        InputSource::FanIn(members) => members.iter().any(|m| *m == FanInMember::MappedInput),
        InputSource::Single(_) => false,
      })
      .map(|(h, _)| h)
      .collect()
  }
}

/// Stable Kahn's algorithm: among ready solids, the earliest-declared goes first.
fn topological_order(
  graph: &str,
  solids: &[SolidInvocation],
  structure: &DependencyStructure,
) -> Result<Vec<usize>, DefinitionError> {
  let index: HashMap<&str, usize> = solids
    .iter()
    .enumerate()
    .map(|(i, s)| (s.name.as_str(), i))
    .collect();

  let mut in_degree = vec![0usize; solids.len()];
  let mut downstream: Vec<Vec<usize>> = vec![vec![]; solids.len()];
  for (i, solid) in solids.iter().enumerate() {
    let upstream: HashSet<usize> = structure
      .upstream_solids(&solid.name)
      .into_iter()
      .filter_map(|n| index.get(n).copied())
      .collect();
    in_degree[i] = upstream.len();
    for u in upstream {
      downstream[u].push(i);
    }
  }

  let mut ready: BTreeSet<usize> = (0..solids.len()).filter(|&i| in_degree[i] == 0).collect();
  let mut order = Vec::with_capacity(solids.len());
  while let Some(i) = ready.pop_first() {
    order.push(i);
    for &d in &downstream[i] {
      in_degree[d] -= 1;
      if in_degree[d] == 0 {
        ready.insert(d);
      }
    }
  }

  if order.len() != solids.len() {
    let cycle: Vec<String> = (0..solids.len())
      .filter(|&i| in_degree[i] > 0)
      .map(|i| solids[i].name.clone())
      .collect();
    return Err(DefinitionError::GraphCycle {
      graph: graph.to_string(),
      solids: cycle,
    });
  }
  Ok(order)
}
