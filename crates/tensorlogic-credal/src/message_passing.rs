//! Loopy belief propagation over the family clusters of a Bayesian network.
//!
//! Every variable contributes one cluster holding its conditional table; a
//! cluster is linked to the cluster of each child through the separator
//! `{parent}`. On polytrees one sweep is exact; on loopy graphs the beliefs
//! are approximations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{PgmError, Result};
use crate::factor::{BayesianFactor, FactorOps, PointMass};
use crate::model::BayesianNetwork;
use crate::Evidence;

/// Trait for message passing algorithms.
pub trait MessagePassingAlgorithm {
    /// Posterior marginal of `target` given `evidence`.
    fn query(
        &self,
        model: &BayesianNetwork,
        evidence: &Evidence,
        target: usize,
    ) -> Result<BayesianFactor>;

    /// Get algorithm name.
    fn name(&self) -> &str;
}

/// Convergence statistics for belief propagation.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceStats {
    /// Number of iterations performed
    pub iterations: usize,
    /// Maximum message difference in last iteration
    pub max_delta: f64,
}

/// Message storage: (from cluster, to cluster) -> message over the separator.
type MessageStore = BTreeMap<(usize, usize), BayesianFactor>;

/// Loopy belief propagation with a fixed number of iterations.
///
/// Each iteration is a collect sweep towards the target followed by a
/// distribute sweep away from it. There is no early stopping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopyBeliefPropagation {
    pub iterations: usize,
}

impl Default for LoopyBeliefPropagation {
    fn default() -> Self {
        Self { iterations: 5 }
    }
}

impl LoopyBeliefPropagation {
    pub fn new(iterations: usize) -> Self {
        Self { iterations }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Like [`MessagePassingAlgorithm::query`], also reporting the last
    /// iteration's largest message change.
    pub fn run_with_stats(
        &self,
        model: &BayesianNetwork,
        evidence: &Evidence,
        target: usize,
    ) -> Result<(BayesianFactor, ConvergenceStats)> {
        let cardinality = model.cardinality(target)?;
        if let Some(&state) = evidence.get(&target) {
            let stats = ConvergenceStats {
                iterations: 0,
                max_delta: 0.0,
            };
            return Ok((BayesianFactor::point_mass(target, cardinality, state)?, stats));
        }

        let graph = ClusterGraph::build(model, evidence)?;
        let schedule = graph.breadth_first(target);
        let rank: BTreeMap<usize, usize> =
            schedule.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        let mut messages = graph.initial_messages(model)?;

        let mut max_delta = 0.0;
        for iteration in 0..self.iterations {
            max_delta = 0.0f64;

            // collect: every cluster sends towards the clusters reached before it
            for &from in schedule.iter().rev() {
                for &(to, separator) in graph.neighbors(from) {
                    if rank[&to] < rank[&from] {
                        let delta = graph.update(&mut messages, from, to, separator)?;
                        max_delta = max_delta.max(delta);
                    }
                }
            }

            // distribute: and back out again
            for &from in &schedule {
                for &(to, separator) in graph.neighbors(from) {
                    if rank[&to] > rank[&from] {
                        let delta = graph.update(&mut messages, from, to, separator)?;
                        max_delta = max_delta.max(delta);
                    }
                }
            }

            tracing::debug!(iteration, max_delta, "belief propagation sweep");
        }

        let belief = graph
            .incoming_product(&messages, target, None)?
            .marginalize_to(&[target])?;
        if belief.is_degenerate() {
            tracing::warn!(target, "belief vanished under the evidence");
            return Err(PgmError::InconsistentEvidence);
        }

        let stats = ConvergenceStats {
            iterations: self.iterations,
            max_delta,
        };
        Ok((belief.normalize()?, stats))
    }
}

impl MessagePassingAlgorithm for LoopyBeliefPropagation {
    fn query(
        &self,
        model: &BayesianNetwork,
        evidence: &Evidence,
        target: usize,
    ) -> Result<BayesianFactor> {
        Ok(self.run_with_stats(model, evidence, target)?.0)
    }

    fn name(&self) -> &str {
        "LoopyBeliefPropagation"
    }
}

/// Family clusters with evidence already absorbed.
struct ClusterGraph {
    potentials: BTreeMap<usize, BayesianFactor>,
    /// cluster -> [(neighbor cluster, separator variable)]
    neighbors: BTreeMap<usize, Vec<(usize, usize)>>,
}

impl ClusterGraph {
    fn build(model: &BayesianNetwork, evidence: &Evidence) -> Result<Self> {
        let mut potentials = BTreeMap::new();
        let mut neighbors: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();

        for (variable, factor) in model.variables().into_iter().zip(model.complete_factors()?) {
            let mut potential = factor;
            for (&var, &state) in evidence {
                if potential.domain().contains(var) {
                    potential = potential.filter(var, state)?;
                }
            }
            potentials.insert(variable, potential);
            neighbors.entry(variable).or_default();

            for parent in model.parents(variable) {
                // an observed parent is no longer shared by the two clusters
                if evidence.contains_key(&parent) {
                    continue;
                }
                neighbors.entry(parent).or_default().push((variable, parent));
                neighbors.entry(variable).or_default().push((parent, parent));
            }
        }

        Ok(Self {
            potentials,
            neighbors,
        })
    }

    fn neighbors(&self, cluster: usize) -> &[(usize, usize)] {
        self.neighbors.get(&cluster).map_or(&[], Vec::as_slice)
    }

    /// Clusters reachable from `start`, in breadth-first order.
    fn breadth_first(&self, start: usize) -> Vec<usize> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(cluster) = queue.pop_front() {
            order.push(cluster);
            for &(next, _) in self.neighbors(cluster) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        order
    }

    /// Uniform message on every directed edge.
    fn initial_messages(&self, model: &BayesianNetwork) -> Result<MessageStore> {
        let mut messages = MessageStore::new();
        for (&from, edges) in &self.neighbors {
            for &(to, separator) in edges {
                let uniform = BayesianFactor::uniform(model.domain(separator)?);
                messages.insert((from, to), uniform);
            }
        }
        Ok(messages)
    }

    /// Local potential times every incoming message, optionally skipping one
    /// neighbor.
    fn incoming_product(
        &self,
        messages: &MessageStore,
        cluster: usize,
        skip: Option<usize>,
    ) -> Result<BayesianFactor> {
        let mut product = self
            .potentials
            .get(&cluster)
            .cloned()
            .ok_or(PgmError::VariableNotFound(cluster))?;
        for &(neighbor, _) in self.neighbors(cluster) {
            if Some(neighbor) == skip {
                continue;
            }
            if let Some(incoming) = messages.get(&(neighbor, cluster)) {
                product = product.combine(incoming)?;
            }
        }
        Ok(product)
    }

    /// μ(from→to) = normalize(Σ_{~sep} ψ_from ∏_{n≠to} μ(n→from)); returns the change.
    fn update(
        &self,
        messages: &mut MessageStore,
        from: usize,
        to: usize,
        separator: usize,
    ) -> Result<f64> {
        let message = self
            .incoming_product(messages, from, Some(to))?
            .marginalize_to(&[separator])?
            .normalize()?;

        let delta = messages.get(&(from, to)).map_or(f64::INFINITY, |old| {
            old.data()
                .iter()
                .zip(message.data())
                .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()))
        });
        tracing::trace!(from, to, separator, delta, "updated message");
        messages.insert((from, to), message);
        Ok(delta)
    }
}
