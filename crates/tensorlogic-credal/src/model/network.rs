//! Directed graphical models with one factor per variable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dag::DirectedAcyclicGraph;
use crate::domain::Domain;
use crate::error::{PgmError, Result};
use crate::factor::{FactorOps, PointMass};

/// A DAG over discrete variables plus one factor per variable.
///
/// The factor of `v` must be defined over `{v} ∪ parents(v)`; structural
/// mutations that change a parent set drop the stale factor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphicalModel<F> {
    dag: DirectedAcyclicGraph,
    cardinalities: BTreeMap<usize, usize>,
    factors: BTreeMap<usize, F>,
    next_id: usize,
}

impl<F> Default for GraphicalModel<F> {
    fn default() -> Self {
        Self {
            dag: DirectedAcyclicGraph::new(),
            cardinalities: BTreeMap::new(),
            factors: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<F> GraphicalModel<F> {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable and return its identifier.
    pub fn add_variable(&mut self, cardinality: usize) -> Result<usize> {
        let id = self.next_id;
        self.insert_variable(id, cardinality)?;
        Ok(id)
    }

    /// Add a variable under a caller-chosen identifier.
    pub fn insert_variable(&mut self, id: usize, cardinality: usize) -> Result<()> {
        if cardinality == 0 {
            return Err(PgmError::OutOfRange(format!(
                "variable {} needs a positive cardinality",
                id
            )));
        }
        if let Some(&existing) = self.cardinalities.get(&id) {
            return Err(PgmError::DomainConflict {
                variable: id,
                left: existing,
                right: cardinality,
            });
        }
        self.dag.add_variable(id);
        self.cardinalities.insert(id, cardinality);
        self.next_id = self.next_id.max(id + 1);
        Ok(())
    }

    /// Add the edge `parent → child`; the child's factor is dropped.
    pub fn add_link(&mut self, parent: usize, child: usize) -> Result<()> {
        self.dag.add_link(parent, child)?;
        if self.factors.remove(&child).is_some() {
            tracing::debug!(parent, child, "parent set changed, dropped factor");
        }
        Ok(())
    }

    /// Remove the edge `parent → child`; the child's factor is dropped.
    pub fn remove_link(&mut self, parent: usize, child: usize) -> Result<()> {
        if !self.dag.remove_link(parent, child) {
            return Err(PgmError::InvalidGraph(format!(
                "no link {} -> {}",
                parent, child
            )));
        }
        if self.factors.remove(&child).is_some() {
            tracing::debug!(parent, child, "parent set changed, dropped factor");
        }
        Ok(())
    }

    /// Underlying graph.
    pub fn dag(&self) -> &DirectedAcyclicGraph {
        &self.dag
    }

    /// Variables in increasing order.
    pub fn variables(&self) -> Vec<usize> {
        self.dag.variables()
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.cardinalities.len()
    }

    /// Whether the model has no variables.
    pub fn is_empty(&self) -> bool {
        self.cardinalities.is_empty()
    }

    /// Cardinality of a variable.
    pub fn cardinality(&self, variable: usize) -> Result<usize> {
        self.cardinalities
            .get(&variable)
            .copied()
            .ok_or(PgmError::VariableNotFound(variable))
    }

    /// Parents in increasing order.
    pub fn parents(&self, variable: usize) -> Vec<usize> {
        self.dag.parents(variable)
    }

    /// Children in increasing order.
    pub fn children(&self, variable: usize) -> Vec<usize> {
        self.dag.children(variable)
    }

    /// Single-variable domain.
    pub fn domain(&self, variable: usize) -> Result<Domain> {
        Ok(Domain::var(variable, self.cardinality(variable)?))
    }

    /// Domain a factor for `variable` must have: `{variable} ∪ parents`.
    pub fn family_domain(&self, variable: usize) -> Result<Domain> {
        let mut vars = vec![variable];
        vars.extend(self.parents(variable));
        self.domain_of(&vars)
    }

    /// Domain over a set of model variables.
    pub fn domain_of(&self, variables: &[usize]) -> Result<Domain> {
        let cards = variables
            .iter()
            .map(|&v| self.cardinality(v))
            .collect::<Result<Vec<_>>>()?;
        Domain::new(variables, &cards)
    }

    /// Factor of a variable, if assigned.
    pub fn factor(&self, variable: usize) -> Option<&F> {
        self.factors.get(&variable)
    }

    /// All assigned factors in variable order.
    pub fn factors(&self) -> Vec<&F> {
        self.factors.values().collect()
    }

    /// Whether every variable has a factor.
    pub fn is_complete(&self) -> bool {
        self.factors.len() == self.cardinalities.len()
    }

    /// Clone of every factor, failing if a variable has none.
    pub fn complete_factors(&self) -> Result<Vec<F>>
    where
        F: Clone,
    {
        self.cardinalities
            .keys()
            .map(|v| {
                self.factors.get(v).cloned().ok_or_else(|| {
                    PgmError::InvalidGraph(format!("variable {} has no factor", v))
                })
            })
            .collect()
    }

    /// Convert every factor into another kind, keeping the structure.
    pub fn map_factors<G>(
        &self,
        mut convert: impl FnMut(usize, &F) -> Result<G>,
    ) -> Result<GraphicalModel<G>> {
        let factors = self
            .factors
            .iter()
            .map(|(&v, f)| Ok((v, convert(v, f)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(GraphicalModel {
            dag: self.dag.clone(),
            cardinalities: self.cardinalities.clone(),
            factors,
            next_id: self.next_id,
        })
    }
}

impl<F: FactorOps> GraphicalModel<F> {
    /// Assign the factor of one variable.
    pub fn set_factor(&mut self, variable: usize, factor: F) -> Result<()> {
        self.check_factor(variable, &factor)?;
        self.factors.insert(variable, factor);
        Ok(())
    }

    /// Assign one factor per variable, in increasing variable order.
    ///
    /// Either every factor is accepted or the model is left untouched.
    pub fn set_factors(&mut self, factors: Vec<F>) -> Result<()> {
        let variables = self.variables();
        if factors.len() != variables.len() {
            return Err(PgmError::DimensionMismatch {
                expected: variables.len(),
                got: factors.len(),
            });
        }
        for (&v, f) in variables.iter().zip(&factors) {
            self.check_factor(v, f)?;
        }
        self.factors = variables.into_iter().zip(factors).collect();
        Ok(())
    }

    fn check_factor(&self, variable: usize, factor: &F) -> Result<()> {
        let expected = self.family_domain(variable)?;
        if factor.domain() != &expected {
            return Err(PgmError::DomainMismatch {
                variable,
                expected: expected.variables().to_vec(),
                got: factor.domain().variables().to_vec(),
            });
        }
        Ok(())
    }
}

impl<F: FactorOps + PointMass> GraphicalModel<F> {
    /// Graph surgery `do(variable = state)`.
    ///
    /// Returns a new model in which `variable` has no parents and a point mass
    /// on `state`; `self` is not modified.
    pub fn intervention(&self, variable: usize, state: usize) -> Result<Self> {
        let cardinality = self.cardinality(variable)?;
        let point = F::point_mass(variable, cardinality, state)?;

        let mut model = self.clone();
        let removed = model.dag.remove_incoming(variable);
        model.factors.insert(variable, point);
        tracing::debug!(variable, state, removed = ?removed, "applied intervention");
        Ok(model)
    }
}
