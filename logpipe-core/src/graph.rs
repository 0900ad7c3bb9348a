//! Descriptor dependency graph
//!
//! Dependencies are declared explicitly on each descriptor and checked once when
//! the graph is built: ids are unique, every dependency exists and there is no
//! cycle. The topological order is computed at that point. The graph has no
//! structural mutators, so the order stays valid for its whole lifetime.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::domain::descriptor::{DescriptorId, ResourceDescriptor};
use crate::domain::permission::PermissionStatement;
use crate::error::GraphError;

/// Immutable builder collecting descriptors in declaration order
#[derive(Debug, Default)]
pub struct GraphBuilder {
    descriptors: Vec<ResourceDescriptor>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, descriptor: ResourceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn build(self) -> Result<DescriptorGraph, GraphError> {
        DescriptorGraph::new(self.descriptors)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorGraph {
    descriptors: Vec<ResourceDescriptor>,
    #[serde(skip)]
    order: Vec<DescriptorId>,
}

impl DescriptorGraph {
    pub fn new(descriptors: Vec<ResourceDescriptor>) -> Result<Self, GraphError> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.id.as_str()) {
                return Err(GraphError::DuplicateId(descriptor.id.clone()));
            }
        }

        for descriptor in &descriptors {
            if let Some(missing) = descriptor
                .depends_on
                .iter()
                .find(|dep| !seen.contains(dep.as_str()))
            {
                return Err(GraphError::UnknownDependency {
                    descriptor: descriptor.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let order = topological_sort(&descriptors)?;
        Ok(Self { descriptors, order })
    }

    /// Descriptors in declaration order
    pub fn descriptors(&self) -> &[ResourceDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Producers before consumers; ties keep declaration order
    pub fn topological_order(&self) -> &[DescriptorId] {
        &self.order
    }

    /// Consumers before producers, used for teardown
    pub fn reverse_order(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.order.iter().rev().filter_map(|id| self.get(id))
    }

    /// Descriptors that depend directly on `id`
    pub fn dependents(&self, id: &str) -> impl Iterator<Item = &ResourceDescriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.depends_on.contains(id))
    }

    /// Every descriptor that depends on `id` directly or indirectly, in topological order
    pub fn transitive_dependents(&self, id: &str) -> Vec<DescriptorId> {
        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents(current) {
                if reached.insert(dependent.id.as_str()) {
                    queue.push_back(dependent.id.as_str());
                }
            }
        }

        self.order
            .iter()
            .filter(|candidate| reached.contains(candidate.as_str()))
            .cloned()
            .collect()
    }

    /// Descriptors nothing depends on
    pub fn sinks(&self) -> Vec<&ResourceDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| self.dependents(&d.id).next().is_none())
            .collect()
    }

    /// Graph restricted to `ids`
    ///
    /// Dependencies outside the subset are dropped; they are assumed to exist
    /// already.
    pub fn subset(&self, ids: &BTreeSet<DescriptorId>) -> Result<DescriptorGraph, GraphError> {
        let descriptors = self
            .descriptors
            .iter()
            .filter(|d| ids.contains(&d.id))
            .map(|d| {
                let mut d = d.clone();
                d.depends_on.retain(|dep| ids.contains(dep));
                d
            })
            .collect();
        DescriptorGraph::new(descriptors)
    }

    /// Attaches composed statements; the graph shape is unchanged
    pub fn with_statements(
        mut self,
        mut statements: BTreeMap<DescriptorId, Vec<PermissionStatement>>,
    ) -> DescriptorGraph {
        for descriptor in &mut self.descriptors {
            if let Some(composed) = statements.remove(&descriptor.id) {
                descriptor.statements = composed;
            }
        }
        self
    }
}

/// Kahn's algorithm over declaration indices
fn topological_sort(descriptors: &[ResourceDescriptor]) -> Result<Vec<DescriptorId>, GraphError> {
    let index: HashMap<&str, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.id.as_str(), i))
        .collect();

    let mut in_degree: Vec<usize> = descriptors.iter().map(|d| d.depends_on.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
    for (i, descriptor) in descriptors.iter().enumerate() {
        for dep in &descriptor.depends_on {
            dependents[index[dep.as_str()]].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..descriptors.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(descriptors.len());

    while let Some(i) = ready.pop_front() {
        order.push(descriptors[i].id.clone());
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() != descriptors.len() {
        let stuck = descriptors
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, d)| d.id.clone())
            .collect();
        return Err(GraphError::Cycle(stuck));
    }

    Ok(order)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::descriptor::ResourceKind;

    pub fn node(id: &str, deps: &[&str]) -> ResourceDescriptor {
        ResourceDescriptor {
            id: id.to_string(),
            kind: ResourceKind::Processor,
            name: format!("test-{}", id),
            config: serde_json::json!({}),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            idempotency_key: format!("key-{}", id),
            principal: None,
            execution_role: None,
            statements: Vec::new(),
            post_provision: None,
        }
    }
}
