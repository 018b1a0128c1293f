//! Elimination ordering heuristics for variable elimination.
//!
//! Orders are computed on the interaction graph of a factor set: two
//! variables are adjacent when some factor mentions both. For the family
//! factors of a directed model this is the moral graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::Domain;
use crate::error::Result;
use crate::factor::FactorOps;
use crate::model::GraphicalModel;

type Adjacency = BTreeMap<usize, BTreeSet<usize>>;

/// Strategy for computing variable elimination ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EliminationStrategy {
    /// Min-degree: Choose variable with fewest neighbors
    #[default]
    MinDegree,
    /// Min-fill: Choose variable that introduces fewest new edges
    MinFill,
    /// Weighted min-fill: fill weighted by the size of the created cluster
    WeightedMinFill,
}

/// Compute elimination ordering for variable elimination.
///
/// Ties are broken by the smallest variable identifier, so the order is
/// deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EliminationOrdering {
    pub strategy: EliminationStrategy,
}

impl EliminationOrdering {
    /// Create with a specific strategy.
    pub fn new(strategy: EliminationStrategy) -> Self {
        Self { strategy }
    }

    pub fn with_strategy(mut self, strategy: EliminationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Order every model variable except those in `exclude`.
    pub fn for_model<F: FactorOps>(
        &self,
        model: &GraphicalModel<F>,
        exclude: &[usize],
    ) -> Result<Vec<usize>> {
        let domains = model
            .variables()
            .into_iter()
            .map(|v| model.family_domain(v))
            .collect::<Result<Vec<_>>>()?;
        let vars: Vec<usize> = model
            .variables()
            .into_iter()
            .filter(|v| !exclude.contains(v))
            .collect();
        Ok(self.compute_order(&domains, &vars))
    }

    /// Compute elimination order for `vars` given the factor domains.
    pub fn compute_order(&self, domains: &[Domain], vars: &[usize]) -> Vec<usize> {
        let mut remaining: BTreeSet<usize> = vars.iter().copied().collect();
        let mut adjacency = build_adjacency_graph(domains, &remaining);
        let cardinalities: BTreeMap<usize, usize> = domains
            .iter()
            .flat_map(|d| {
                d.variables()
                    .iter()
                    .copied()
                    .zip(d.cardinalities().iter().copied())
            })
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while let Some(next) = remaining
            .iter()
            .copied()
            .min_by_key(|&v| self.score(&adjacency, &cardinalities, v))
        {
            order.push(next);
            remaining.remove(&next);
            update_adjacency_after_elimination(&mut adjacency, next);
        }

        tracing::trace!(strategy = ?self.strategy, order = ?order, "computed elimination order");
        order
    }

    fn score(
        &self,
        adjacency: &Adjacency,
        cardinalities: &BTreeMap<usize, usize>,
        var: usize,
    ) -> usize {
        match self.strategy {
            EliminationStrategy::MinDegree => adjacency.get(&var).map_or(0, BTreeSet::len),
            EliminationStrategy::MinFill => compute_fill(adjacency, var),
            EliminationStrategy::WeightedMinFill => {
                let cluster: usize = adjacency
                    .get(&var)
                    .into_iter()
                    .flatten()
                    .chain(std::iter::once(&var))
                    .map(|v| cardinalities.get(v).copied().unwrap_or(1))
                    .fold(1usize, |acc, c| acc.saturating_mul(c));
                compute_fill(adjacency, var).saturating_mul(cluster)
            }
        }
    }
}

/// Adjacency between the variables in `vars`, one clique per factor.
fn build_adjacency_graph(domains: &[Domain], vars: &BTreeSet<usize>) -> Adjacency {
    let mut adjacency: Adjacency = vars.iter().map(|&v| (v, BTreeSet::new())).collect();

    for domain in domains {
        let factor_vars: Vec<usize> = domain
            .variables()
            .iter()
            .copied()
            .filter(|v| vars.contains(v))
            .collect();

        for (i, &v1) in factor_vars.iter().enumerate() {
            for &v2 in &factor_vars[i + 1..] {
                adjacency.entry(v1).or_default().insert(v2);
                adjacency.entry(v2).or_default().insert(v1);
            }
        }
    }

    adjacency
}

/// Number of new edges created by eliminating `var`.
fn compute_fill(adjacency: &Adjacency, var: usize) -> usize {
    let Some(neighbors) = adjacency.get(&var) else {
        return 0;
    };
    let neighbors: Vec<usize> = neighbors.iter().copied().collect();

    let mut fill = 0;
    for (i, v1) in neighbors.iter().enumerate() {
        for v2 in &neighbors[i + 1..] {
            if adjacency.get(v1).is_some_and(|adj| !adj.contains(v2)) {
                fill += 1;
            }
        }
    }
    fill
}

/// Remove `var` and connect its former neighbors pairwise.
fn update_adjacency_after_elimination(adjacency: &mut Adjacency, var: usize) {
    let Some(neighbors) = adjacency.remove(&var) else {
        return;
    };

    for neighbor in &neighbors {
        if let Some(adj) = adjacency.get_mut(neighbor) {
            adj.remove(&var);
        }
    }

    let neighbors: Vec<usize> = neighbors.into_iter().collect();
    for (i, &v1) in neighbors.iter().enumerate() {
        for &v2 in &neighbors[i + 1..] {
            if let Some(adj) = adjacency.get_mut(&v1) {
                adj.insert(v2);
            }
            if let Some(adj) = adjacency.get_mut(&v2) {
                adj.insert(v1);
            }
        }
    }
}
