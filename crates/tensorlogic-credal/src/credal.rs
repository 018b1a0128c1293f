//! Credal query solvers.
//!
//! [`CredalVariableElimination`] runs the elimination engine over vertex
//! factors and is exact, with a cost exponential in the number of vertices.
//! [`ApproxLp`] keeps every local credal set as linear constraints and
//! searches each bound through a sequence of linear-fractional programs, one
//! local set at a time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::Domain;
use crate::elimination_ordering::EliminationOrdering;
use crate::error::{PgmError, Result};
use crate::factor::{
    BayesianFactor, FactorOps, HalfspaceFactor, IntervalFactor, VertexFactor,
    PROBABILITY_TOLERANCE,
};
use crate::lp::{
    Goal, LinearConstraint, LinearFractionalProblem, LinearProblem, LinearSolver, SimplexSolver,
};
use crate::model::GraphicalModel;
use crate::variable_elimination::VariableElimination;
use crate::Evidence;

fn check_disjoint(targets: &[usize], evidence: &Evidence) -> Result<()> {
    match targets.iter().find(|t| evidence.contains_key(t)) {
        Some(t) => Err(PgmError::UnsupportedOperation(format!(
            "variable {} is both a target and observed",
            t
        ))),
        None => Ok(()),
    }
}

/// Exact credal inference by variable elimination over vertex factors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredalVariableElimination {
    /// Drop non-extreme vertices from the local factors and the answer
    pub prune_vertices: bool,
    pub ordering: EliminationOrdering,
    pub solver: SimplexSolver,
}

impl Default for CredalVariableElimination {
    fn default() -> Self {
        Self {
            prune_vertices: true,
            ordering: EliminationOrdering::default(),
            solver: SimplexSolver::default(),
        }
    }
}

impl CredalVariableElimination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prune_vertices(mut self, prune_vertices: bool) -> Self {
        self.prune_vertices = prune_vertices;
        self
    }

    pub fn with_ordering(mut self, ordering: EliminationOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Posterior credal set of `targets` given `evidence`, one normalized
    /// vertex per extreme joint.
    pub fn query(
        &self,
        model: &GraphicalModel<VertexFactor>,
        targets: &[usize],
        evidence: &Evidence,
    ) -> Result<VertexFactor> {
        check_disjoint(targets, evidence)?;
        let mut keep = targets.to_vec();
        keep.extend(evidence.keys());
        let order = self.ordering.for_model(model, &keep)?;

        let mut factors = model.complete_factors()?;
        if self.prune_vertices {
            factors = factors
                .iter()
                .map(|f| f.prune(&self.solver))
                .collect::<Result<_>>()?;
        }

        let answer = VariableElimination::new(order)
            .with_factors(factors)
            .with_evidence(evidence.clone())
            .run(targets)?
            .into_result()?;

        let answer = if self.prune_vertices {
            answer.prune(&self.solver)?
        } else {
            answer
        };
        tracing::debug!(
            targets = ?targets,
            vertices = answer.num_vertices(),
            "credal variable elimination finished"
        );
        Ok(answer)
    }

    /// Lower and upper posterior probabilities of every target state.
    pub fn bounds(
        &self,
        model: &GraphicalModel<VertexFactor>,
        targets: &[usize],
        evidence: &Evidence,
    ) -> Result<IntervalFactor> {
        self.query(model, targets, evidence)?.to_interval()
    }
}

/// Approximate credal inference by iterated linear programming.
///
/// Every local credal set stays a polytope over its own table. A bound
/// `min / max q(t, e) / q(e)` is searched one local set at a time: with the
/// other tables fixed, the query is a ratio of two linear functions of the
/// free table, so each step is one linear-fractional program whose
/// coefficients come from a precise elimination run. Steps repeat until no
/// local set improves the bound.
///
/// The answer is an inner approximation of the exact bounds. It is exact when
/// a single credal set influences the query and for precise models, where it
/// reduces to variable elimination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApproxLp {
    /// Additive slack applied to every constraint; `0` keeps them exact
    pub epsilon: f64,
    /// Maximum sweeps over the local sets per bound
    pub max_iterations: usize,
    pub ordering: EliminationOrdering,
    pub solver: SimplexSolver,
}

impl Default for ApproxLp {
    fn default() -> Self {
        Self {
            epsilon: 0.0,
            max_iterations: 32,
            ordering: EliminationOrdering::default(),
            solver: SimplexSolver::default(),
        }
    }
}

/// A local credal set under optimization.
struct LocalSet {
    /// Position in the model's factor list
    index: usize,
    domain: Domain,
    columns: usize,
    constraints: Vec<LinearConstraint>,
}

/// Linear coefficients of one local table in the query.
struct LocalCoefficients {
    /// `∂ q(t, e) / ∂ y` for every joint target state `t`
    numerators: Vec<Vec<f64>>,
    /// `∂ q(e) / ∂ y`
    denominator: Vec<f64>,
}

impl ApproxLp {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            ..Self::default()
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_solver(mut self, solver: SimplexSolver) -> Self {
        self.solver = solver;
        self
    }

    /// Posterior bounds of every joint target state given `evidence`.
    pub fn query(
        &self,
        model: &GraphicalModel<HalfspaceFactor>,
        targets: &[usize],
        evidence: &Evidence,
    ) -> Result<IntervalFactor> {
        check_disjoint(targets, evidence)?;
        let target_domain = model.domain_of(targets)?;
        let factors = model.complete_factors()?;

        let mut tables = Vec::with_capacity(factors.len());
        let mut sets = Vec::new();
        for (index, factor) in factors.iter().enumerate() {
            let domain = factor.domain().clone();
            match factor.point() {
                Some(values) => tables.push(BayesianFactor::new(domain, values.to_vec())?),
                None => {
                    let set = LocalSet {
                        index,
                        columns: factor.columns(),
                        constraints: factor
                            .constraints()
                            .iter()
                            .flat_map(|c| c.relaxed(self.epsilon))
                            .collect(),
                        domain,
                    };
                    let start = self.solver.solve(&LinearProblem::new(
                        vec![0.0; set.columns],
                        Goal::Minimize,
                        set.constraints.clone(),
                    ))?;
                    tables.push(set.table(&start.point)?);
                    sets.push(set);
                }
            }
        }

        if !evidence.is_empty() {
            self.maximize_evidence(model, &sets, &mut tables, evidence)?;
        }

        let mut lower = Vec::with_capacity(target_domain.size());
        let mut upper = Vec::with_capacity(target_domain.size());
        for state in 0..target_domain.size() {
            let [low, high] = [Goal::Minimize, Goal::Maximize].map(|goal| {
                self.optimize(model, &sets, &tables, targets, evidence, state, goal)
            });
            let low = low?.clamp(0.0, 1.0);
            lower.push(low);
            upper.push(high?.clamp(0.0, 1.0).max(low));
        }

        tracing::debug!(
            credal_sets = sets.len(),
            epsilon = self.epsilon,
            "iterated linear programs converged"
        );
        IntervalFactor::new(target_domain, Domain::empty(), lower, upper)
    }

    /// Move every local table towards the largest evidence probability.
    fn maximize_evidence(
        &self,
        model: &GraphicalModel<HalfspaceFactor>,
        sets: &[LocalSet],
        tables: &mut [BayesianFactor],
        evidence: &Evidence,
    ) -> Result<()> {
        let mut mass = self.evidence_mass(model, tables, evidence)?;
        for _ in 0..self.max_iterations {
            let mut improved = false;
            for set in sets {
                let local = self.coefficients(model, tables, set, &[], evidence)?;
                let mut objective = local.denominator;
                objective.resize(set.columns, 0.0);
                let best = self.solver.solve(&LinearProblem::new(
                    objective,
                    Goal::Maximize,
                    set.constraints.clone(),
                ))?;
                if best.value > mass + PROBABILITY_TOLERANCE {
                    tables[set.index] = set.table(&best.point)?;
                    mass = best.value;
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }

        if mass <= PROBABILITY_TOLERANCE {
            tracing::warn!("evidence has zero upper probability");
            return Err(PgmError::InconsistentEvidence);
        }
        Ok(())
    }

    /// Coordinate search over the local sets for one bound of `P(state | e)`.
    #[allow(clippy::too_many_arguments)]
    fn optimize(
        &self,
        model: &GraphicalModel<HalfspaceFactor>,
        sets: &[LocalSet],
        start: &[BayesianFactor],
        targets: &[usize],
        evidence: &Evidence,
        state: usize,
        goal: Goal,
    ) -> Result<f64> {
        let mut tables = start.to_vec();
        let posterior = VariableElimination::new(self.ordering.for_model(model, targets)?)
            .with_factors(tables.clone())
            .with_evidence(evidence.clone())
            .run(targets)?
            .into_result()?;
        let mut value = posterior.data()[state];

        for iteration in 0..self.max_iterations {
            let mut improved = false;
            for set in sets {
                let local = self.coefficients(model, &tables, set, targets, evidence)?;
                let mut numerator = local.numerators[state].clone();
                let mut denominator = local.denominator;
                numerator.resize(set.columns, 0.0);
                denominator.resize(set.columns, 0.0);
                let best = LinearFractionalProblem {
                    numerator,
                    denominator,
                    goal,
                    constraints: set.constraints.clone(),
                }
                .solve(&self.solver)?;

                let better = match goal {
                    Goal::Minimize => best.value < value - PROBABILITY_TOLERANCE,
                    Goal::Maximize => best.value > value + PROBABILITY_TOLERANCE,
                };
                if better {
                    tables[set.index] = set.table(&best.point)?;
                    value = best.value;
                    improved = true;
                }
            }
            if !improved {
                tracing::trace!(state, ?goal, iteration, value, "local search converged");
                break;
            }
        }
        Ok(value)
    }

    fn evidence_mass(
        &self,
        model: &GraphicalModel<HalfspaceFactor>,
        tables: &[BayesianFactor],
        evidence: &Evidence,
    ) -> Result<f64> {
        let joint = VariableElimination::new(self.ordering.for_model(model, &[])?)
            .with_factors(tables.to_vec())
            .with_evidence(evidence.clone())
            .with_normalize(false)
            .run(&[])?
            .factor;
        Ok(joint.sum())
    }

    /// Coefficients of `q(t, e)` and `q(e)` in the table of `set`, the other
    /// tables held fixed.
    fn coefficients(
        &self,
        model: &GraphicalModel<HalfspaceFactor>,
        tables: &[BayesianFactor],
        set: &LocalSet,
        targets: &[usize],
        evidence: &Evidence,
    ) -> Result<LocalCoefficients> {
        let family = &set.domain;
        let observed: Vec<usize> = evidence.keys().copied().collect();
        let evidence_domain = model.domain_of(&observed)?;
        let free = family.subtract(&evidence_domain);
        let target_domain = model.domain_of(targets)?;

        let keep: Vec<usize> = targets
            .iter()
            .chain(free.variables())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut factors = tables.to_vec();
        factors[set.index] = BayesianFactor::new(family.clone(), vec![1.0; family.size()])?;
        let partial = VariableElimination::new(self.ordering.for_model(model, &keep)?)
            .with_factors(factors)
            .with_evidence(evidence.clone())
            .with_normalize(false)
            .run(&keep)?
            .factor;

        // partial(t, r) summed into a table over (free state, target state)
        let mut by_free = vec![vec![0.0; target_domain.size()]; free.size()];
        let to_free = partial.domain().offset_map(&free);
        let to_target = partial.domain().offset_map(&target_domain);
        for (j, value) in partial.data().into_iter().enumerate() {
            by_free[to_free[j]][to_target[j]] += value;
        }

        let shared = family.intersection(&evidence_domain);
        let states: Vec<usize> = shared
            .variables()
            .iter()
            .map(|v| evidence.get(v).copied().unwrap_or_default())
            .collect();
        let observed_index = shared.index_of(&states)?;
        let consistent: Vec<bool> = family
            .offset_map(&shared)
            .into_iter()
            .map(|s| s == observed_index)
            .collect();
        let family_to_free = family.offset_map(&free);

        let n = family.size();
        let mut numerators = vec![vec![0.0; n]; target_domain.size()];
        let mut denominator = vec![0.0; n];
        for i in (0..n).filter(|&i| consistent[i]) {
            for (t, &value) in by_free[family_to_free[i]].iter().enumerate() {
                numerators[t][i] = value;
                denominator[i] += value;
            }
        }
        Ok(LocalCoefficients {
            numerators,
            denominator,
        })
    }
}

impl LocalSet {
    fn table(&self, point: &[f64]) -> Result<BayesianFactor> {
        let values = point[..self.domain.size()]
            .iter()
            .map(|v| v.max(0.0))
            .collect();
        BayesianFactor::new(self.domain.clone(), values)
    }
}
