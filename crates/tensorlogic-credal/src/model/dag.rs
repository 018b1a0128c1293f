//! Directed acyclic graph over integer variables.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PgmError, Result};

/// A DAG with parent and child adjacency kept in sync.
///
/// Acyclicity is enforced on every [`DirectedAcyclicGraph::add_link`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectedAcyclicGraph {
    parents: BTreeMap<usize, BTreeSet<usize>>,
    children: BTreeMap<usize, BTreeSet<usize>>,
}

impl DirectedAcyclicGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; adding an existing node is a no-op.
    pub fn add_variable(&mut self, variable: usize) {
        self.parents.entry(variable).or_default();
        self.children.entry(variable).or_default();
    }

    /// Whether the node exists.
    pub fn contains(&self, variable: usize) -> bool {
        self.parents.contains_key(&variable)
    }

    /// Nodes in increasing order.
    pub fn variables(&self) -> Vec<usize> {
        self.parents.keys().copied().collect()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Add the edge `parent → child`.
    pub fn add_link(&mut self, parent: usize, child: usize) -> Result<()> {
        self.require(parent)?;
        self.require(child)?;
        if parent == child || self.has_path(child, parent) {
            return Err(PgmError::CycleDetected { parent, child });
        }
        self.parents.entry(child).or_default().insert(parent);
        self.children.entry(parent).or_default().insert(child);
        Ok(())
    }

    /// Remove the edge `parent → child`; returns whether it existed.
    pub fn remove_link(&mut self, parent: usize, child: usize) -> bool {
        let removed = self
            .parents
            .get_mut(&child)
            .is_some_and(|ps| ps.remove(&parent));
        if let Some(cs) = self.children.get_mut(&parent) {
            cs.remove(&child);
        }
        removed
    }

    /// Remove every edge into `variable`, returning the former parents.
    pub fn remove_incoming(&mut self, variable: usize) -> Vec<usize> {
        let former = self.parents(variable);
        for &p in &former {
            self.remove_link(p, variable);
        }
        former
    }

    /// Whether the edge `parent → child` exists.
    pub fn has_link(&self, parent: usize, child: usize) -> bool {
        self.parents
            .get(&child)
            .is_some_and(|ps| ps.contains(&parent))
    }

    /// Parents in increasing order.
    pub fn parents(&self, variable: usize) -> Vec<usize> {
        self.parents
            .get(&variable)
            .map(|ps| ps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Children in increasing order.
    pub fn children(&self, variable: usize) -> Vec<usize> {
        self.children
            .get(&variable)
            .map(|cs| cs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Nodes without parents.
    pub fn roots(&self) -> Vec<usize> {
        self.parents
            .iter()
            .filter(|(_, ps)| ps.is_empty())
            .map(|(v, _)| *v)
            .collect()
    }

    /// Whether a directed path `from ⇝ to` exists.
    pub fn has_path(&self, from: usize, to: usize) -> bool {
        let mut stack = vec![from];
        let mut visited = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if visited.insert(node) {
                if let Some(cs) = self.children.get(&node) {
                    stack.extend(cs.iter().copied());
                }
            }
        }
        false
    }

    /// Ancestors first; ties broken by smallest identifier (Kahn's algorithm).
    pub fn topological_order(&self) -> Vec<usize> {
        let mut in_degree: BTreeMap<usize, usize> = self
            .parents
            .iter()
            .map(|(v, ps)| (*v, ps.len()))
            .collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(v, _)| *v)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for child in self.children(node) {
                if let Some(d) = in_degree.get_mut(&child) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(child);
                    }
                }
            }
        }
        order
    }

    fn require(&self, variable: usize) -> Result<()> {
        if self.contains(variable) {
            Ok(())
        } else {
            Err(PgmError::VariableNotFound(variable))
        }
    }
}
