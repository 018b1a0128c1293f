//! Structural causal models and their credal relaxation.
//!
//! Endogenous variables are deterministic functions of their parents, one of
//! which is an exogenous root carrying the unmodeled noise:
//!
//! ```text
//! X = f_X(pa(X), U_X),   U_X ~ P(U_X)
//! ```
//!
//! When only the observational conditionals `P(X | endogenous parents)` are
//! known, the exogenous priors are identified up to a polytope; the credal
//! network keeps the equations precise and replaces each prior by that set.

use scirs2_core::random::{Rng, SeedableRng, StdRng};
use std::collections::{BTreeMap, BTreeSet};

use super::dag::DirectedAcyclicGraph;
use super::network::GraphicalModel;
use crate::domain::Domain;
use crate::error::{PgmError, Result};
use crate::factor::convert::{
    halfspace_to_interval, point_to_halfspace, point_to_interval, point_to_vertex,
};
use crate::factor::{
    prune_set, BayesianFactor, FactorOps, HalfspaceFactor, IntervalFactor, VertexFactor,
    PROBABILITY_TOLERANCE,
};
use crate::lp::{Goal, LinearConstraint, LinearProblem, LinearSolver, SimplexSolver};
use crate::variable_elimination::VariableElimination;

/// A credal network derived from a causal model.
#[derive(Clone, Debug, PartialEq)]
pub enum CredalNetwork {
    /// Every local credal set given by its extreme points.
    Vertex(GraphicalModel<VertexFactor>),
    /// Every local credal set given by linear constraints.
    Linear(GraphicalModel<HalfspaceFactor>),
}

impl CredalNetwork {
    pub fn as_vertex(&self) -> Option<&GraphicalModel<VertexFactor>> {
        match self {
            Self::Vertex(model) => Some(model),
            Self::Linear(_) => None,
        }
    }

    pub fn as_linear(&self) -> Option<&GraphicalModel<HalfspaceFactor>> {
        match self {
            Self::Linear(model) => Some(model),
            Self::Vertex(_) => None,
        }
    }

    /// Graph shared by both representations.
    pub fn dag(&self) -> &DirectedAcyclicGraph {
        match self {
            Self::Vertex(model) => model.dag(),
            Self::Linear(model) => model.dag(),
        }
    }
}

/// A point-factor model split into endogenous and exogenous variables.
///
/// Exogenous variables are always roots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuralCausalModel {
    model: GraphicalModel<BayesianFactor>,
    endogenous: BTreeSet<usize>,
    exogenous: BTreeSet<usize>,
}

impl StructuralCausalModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Markovian model over an endogenous DAG with canonical exogenous sizes.
    ///
    /// Each endogenous `X` gets its own exogenous parent with `|X|^{Π|pa(X)|}`
    /// states, one per deterministic function `pa(X) → X`.
    pub fn markovian(
        dag: &DirectedAcyclicGraph,
        cardinalities: &BTreeMap<usize, usize>,
    ) -> Result<Self> {
        let mut exogenous = BTreeMap::new();
        for x in dag.variables() {
            let overflow = || {
                PgmError::OutOfRange(format!(
                    "canonical exogenous cardinality of variable {} overflows",
                    x
                ))
            };
            let mut configs = 1usize;
            for p in dag.parents(x) {
                configs = configs
                    .checked_mul(lookup(cardinalities, p)?)
                    .ok_or_else(overflow)?;
            }
            let size = canonical_size(lookup(cardinalities, x)?, configs).ok_or_else(overflow)?;
            exogenous.insert(x, size);
        }
        Self::markovian_with_sizes(dag, cardinalities, &exogenous)
    }

    /// Markovian model with explicit exogenous cardinalities, keyed by the
    /// endogenous child.
    ///
    /// Endogenous variables keep their DAG identifiers; exogenous ones are
    /// numbered after them.
    pub fn markovian_with_sizes(
        dag: &DirectedAcyclicGraph,
        cardinalities: &BTreeMap<usize, usize>,
        exogenous: &BTreeMap<usize, usize>,
    ) -> Result<Self> {
        let mut scm = Self::new();
        for x in dag.variables() {
            scm.model.insert_variable(x, lookup(cardinalities, x)?)?;
            scm.endogenous.insert(x);
        }
        for x in dag.variables() {
            for p in dag.parents(x) {
                scm.model.add_link(p, x)?;
            }
        }
        for x in dag.variables() {
            let u = scm.add_exogenous(lookup(exogenous, x)?)?;
            scm.add_link(u, x)?;
        }
        Ok(scm)
    }

    pub fn add_endogenous(&mut self, cardinality: usize) -> Result<usize> {
        let id = self.model.add_variable(cardinality)?;
        self.endogenous.insert(id);
        Ok(id)
    }

    pub fn add_exogenous(&mut self, cardinality: usize) -> Result<usize> {
        let id = self.model.add_variable(cardinality)?;
        self.exogenous.insert(id);
        Ok(id)
    }

    /// Add `parent → child`; exogenous variables cannot receive edges.
    pub fn add_link(&mut self, parent: usize, child: usize) -> Result<()> {
        if self.exogenous.contains(&child) {
            return Err(PgmError::InvalidGraph(format!(
                "exogenous variable {} must stay a root",
                child
            )));
        }
        self.model.add_link(parent, child)
    }

    /// Assign the equation of an endogenous variable or the prior of an
    /// exogenous one.
    pub fn set_factor(&mut self, variable: usize, factor: BayesianFactor) -> Result<()> {
        self.model.set_factor(variable, factor)
    }

    /// Underlying point-factor model.
    pub fn model(&self) -> &GraphicalModel<BayesianFactor> {
        &self.model
    }

    pub fn endogenous(&self) -> Vec<usize> {
        self.endogenous.iter().copied().collect()
    }

    pub fn exogenous(&self) -> Vec<usize> {
        self.exogenous.iter().copied().collect()
    }

    pub fn is_exogenous(&self, variable: usize) -> bool {
        self.exogenous.contains(&variable)
    }

    pub fn exogenous_parents(&self, variable: usize) -> Vec<usize> {
        self.model
            .parents(variable)
            .into_iter()
            .filter(|p| self.exogenous.contains(p))
            .collect()
    }

    pub fn endogenous_parents(&self, variable: usize) -> Vec<usize> {
        self.model
            .parents(variable)
            .into_iter()
            .filter(|p| self.endogenous.contains(p))
            .collect()
    }

    /// Fill the model with random exogenous priors and deterministic
    /// equations, reproducibly from `seed`.
    ///
    /// Priors are rounded to `decimals` places. An endogenous variable whose
    /// only exogenous parent has the canonical cardinality gets the equation
    /// enumerating every function of its endogenous parents; other equations
    /// are drawn at random.
    pub fn fill_with_random_factors(&mut self, seed: u64, decimals: u32) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(seed);

        for u in self.exogenous() {
            let card = self.model.cardinality(u)?;
            let raw: Vec<f64> = (0..card)
                .map(|_| rng.random::<f64>() + f64::EPSILON)
                .collect();
            let total: f64 = raw.iter().sum();
            let prior = BayesianFactor::new(
                Domain::var(u, card),
                raw.into_iter().map(|v| v / total).collect(),
            )?
            .fix_precision(decimals, u)?;
            self.model.set_factor(u, prior)?;
        }

        for x in self.endogenous() {
            let equation = self.random_equation(x, &mut rng)?;
            self.model.set_factor(x, equation)?;
        }

        tracing::debug!(
            seed,
            endogenous = self.endogenous.len(),
            exogenous = self.exogenous.len(),
            "filled causal model with random factors"
        );
        Ok(())
    }

    fn random_equation(&self, x: usize, rng: &mut StdRng) -> Result<BayesianFactor> {
        let family = self.model.family_domain(x)?;
        let card = self.model.cardinality(x)?;
        let parents = family.remove(x);
        let endo = self.model.domain_of(&self.endogenous_parents(x))?;

        let canonical = match self.exogenous_parents(x).as_slice() {
            &[u] => {
                let size = self.model.cardinality(u)?;
                (Some(size) == canonical_size(card, endo.size())).then_some(u)
            }
            _ => None,
        };

        let choices: Vec<usize> = match canonical {
            Some(u) => {
                let u_states = parents.offset_map(&self.model.domain(u)?);
                let endo_configs = parents.offset_map(&endo);
                u_states
                    .into_iter()
                    .zip(endo_configs)
                    .map(|(mut s, j)| {
                        // digit j of s in base |X|
                        for _ in 0..j {
                            s /= card;
                        }
                        s % card
                    })
                    .collect()
            }
            None => (0..parents.size())
                .map(|_| rng.random_range(0..card))
                .collect(),
        };

        let states = family.offset_map(&Domain::var(x, card));
        let configs = family.offset_map(&parents);
        let data = states
            .into_iter()
            .zip(configs)
            .map(|(s, c)| if choices[c] == s { 1.0 } else { 0.0 })
            .collect();
        BayesianFactor::new(family, data)
    }

    /// Observational conditional `P(x | endogenous parents of x)`.
    ///
    /// Parent configurations with zero probability get a uniform column.
    pub fn empirical_conditional(&self, x: usize) -> Result<BayesianFactor> {
        let card = self.model.cardinality(x)?;
        if self.exogenous.contains(&x) {
            return Err(PgmError::UnsupportedOperation(format!(
                "variable {} is exogenous",
                x
            )));
        }

        let mut targets = self.endogenous_parents(x);
        targets.push(x);
        let order = self.model.dag().topological_order();
        let joint = VariableElimination::from_model(&self.model, order)?
            .with_normalize(false)
            .run(&targets)?
            .into_result()?;

        let marginal = joint.marginalize(x)?;
        let mass = marginal.data();
        let data = joint
            .domain()
            .offset_map(marginal.domain())
            .into_iter()
            .zip(joint.data())
            .map(|(j, p)| {
                if mass[j] > 0.0 {
                    p / mass[j]
                } else {
                    1.0 / card as f64
                }
            })
            .collect();
        BayesianFactor::new(joint.domain().clone(), data)
    }

    /// Graph surgery `do(variable = state)` returning a new model.
    pub fn intervention(&self, variable: usize, state: usize) -> Result<Self> {
        Ok(Self {
            model: self.model.intervention(variable, state)?,
            endogenous: self.endogenous.clone(),
            exogenous: self.exogenous.clone(),
        })
    }

    /// Credal network whose exogenous priors range over every distribution
    /// compatible with the local models `P(X | endogenous parents)`.
    ///
    /// Missing local models default to [`Self::empirical_conditional`]. With
    /// `use_vertex` the sets are enumerated as vertices, otherwise they stay
    /// as linear constraints.
    pub fn to_credal_network(
        &self,
        use_vertex: bool,
        local_models: Option<&BTreeMap<usize, BayesianFactor>>,
    ) -> Result<CredalNetwork> {
        let priors = self.prior_polytopes(local_models)?;

        let network = if use_vertex {
            let solver = SimplexSolver::default();
            CredalNetwork::Vertex(self.model.map_factors(|v, f| match priors.get(&v) {
                Some(polytope) => self.prior_vertices(v, polytope, &solver),
                None => point_to_vertex(f, v),
            })?)
        } else {
            CredalNetwork::Linear(self.model.map_factors(|v, f| match priors.get(&v) {
                Some(polytope) => Ok(polytope.clone()),
                None => point_to_halfspace(f, v),
            })?)
        };

        tracing::debug!(
            use_vertex,
            exogenous = priors.len(),
            "converted causal model to credal network"
        );
        Ok(network)
    }

    /// Interval relaxation of [`Self::to_credal_network`]: every exogenous
    /// prior is replaced by its coordinate-wise bounds.
    pub fn to_interval_network(
        &self,
        local_models: Option<&BTreeMap<usize, BayesianFactor>>,
        solver: &dyn LinearSolver,
    ) -> Result<GraphicalModel<IntervalFactor>> {
        let priors = self.prior_polytopes(local_models)?;
        self.model.map_factors(|v, f| match priors.get(&v) {
            Some(polytope) => halfspace_to_interval(polytope, solver),
            None => point_to_interval(f, v),
        })
    }

    fn prior_polytopes(
        &self,
        local_models: Option<&BTreeMap<usize, BayesianFactor>>,
    ) -> Result<BTreeMap<usize, HalfspaceFactor>> {
        if !self.model.is_complete() {
            return Err(PgmError::InvalidGraph(
                "every variable needs a factor before credal conversion".to_string(),
            ));
        }

        let mut locals = BTreeMap::new();
        for x in self.endogenous() {
            if self.exogenous_parents(x).is_empty() {
                continue;
            }
            let local = match local_models.and_then(|m| m.get(&x)) {
                Some(given) => {
                    let mut vars = self.endogenous_parents(x);
                    vars.push(x);
                    let expected = self.model.domain_of(&vars)?;
                    if given.domain() != &expected {
                        return Err(PgmError::DomainMismatch {
                            variable: x,
                            expected: expected.variables().to_vec(),
                            got: given.domain().variables().to_vec(),
                        });
                    }
                    given.clone()
                }
                None => self.empirical_conditional(x)?,
            };
            locals.insert(x, local);
        }

        self.exogenous()
            .into_iter()
            .map(|u| Ok((u, self.prior_polytope(u, &locals)?)))
            .collect()
    }

    /// Vertex form of an exogenous prior, reduced to what its children see.
    ///
    /// Queries on endogenous variables depend on `P(u)` only through the
    /// response `r(a₁, …, aₖ) = Σ_u P(u) Πᵢ fᵢ(aᵢ, u)`, where `aᵢ` ranges over
    /// the configurations of child `i` and its endogenous parents, taken
    /// independently per child. Evidence and interventions on the children
    /// act linearly on `r`, so one prior per extreme response suffices. When
    /// the local models pin the response, a single prior is kept.
    fn prior_vertices(
        &self,
        u: usize,
        polytope: &HalfspaceFactor,
        solver: &SimplexSolver,
    ) -> Result<VertexFactor> {
        let card = self.model.cardinality(u)?;
        let constraints = polytope.constraints().into_owned();
        let response = self.response_map(u)?;

        let feasible = solver.solve(&LinearProblem::new(
            vec![0.0; card],
            Goal::Minimize,
            constraints.clone(),
        ))?;
        let mut pinned = true;
        for row in &response {
            let [low, high] = [Goal::Minimize, Goal::Maximize].map(|goal| {
                solver.solve(&LinearProblem::new(row.clone(), goal, constraints.clone()))
            });
            if high?.value - low?.value > PROBABILITY_TOLERANCE {
                pinned = false;
                break;
            }
        }
        if pinned {
            tracing::trace!(exogenous = u, card, "prior identified up to its response");
            return VertexFactor::new(
                polytope.domain().clone(),
                Domain::empty(),
                vec![vec![feasible.point]],
            );
        }

        let mut images: Vec<Vec<f64>> = Vec::new();
        let mut priors: Vec<Vec<f64>> = Vec::new();
        for vertex in solver.vertices(card, &constraints)? {
            let image: Vec<f64> = response
                .iter()
                .map(|row| row.iter().zip(&vertex).map(|(a, p)| a * p).sum())
                .collect();
            if !images.iter().any(|i| close(i, &image)) {
                images.push(image);
                priors.push(vertex);
            }
        }
        let mut extreme = images.clone();
        prune_set(&mut extreme, solver)?;
        let kept: Vec<Vec<f64>> = priors
            .into_iter()
            .zip(&images)
            .filter(|(_, image)| extreme.iter().any(|e| close(e, image)))
            .map(|(prior, _)| prior)
            .collect();

        tracing::debug!(
            exogenous = u,
            responses = images.len(),
            kept = kept.len(),
            "reduced exogenous prior to extreme responses"
        );
        VertexFactor::new(polytope.domain().clone(), Domain::empty(), vec![kept])
    }

    /// Rows of the linear map `P(u) ↦ r`, one per combination of child configurations.
    fn response_map(&self, u: usize) -> Result<Vec<Vec<f64>>> {
        let card = self.model.cardinality(u)?;
        let prior_domain = Domain::var(u, card);
        let mut rows = vec![vec![1.0; card]];

        for child in self.model.children(u) {
            let equation = self.model.factor(child).ok_or_else(|| {
                PgmError::InvalidGraph(format!("variable {} has no factor", child))
            })?;
            let family = equation.domain();
            let rest = family.remove(u);
            let mut local = vec![vec![0.0; card]; rest.size()];
            for ((k, s), p) in family
                .offset_map(&rest)
                .into_iter()
                .zip(family.offset_map(&prior_domain))
                .zip(equation.data())
            {
                local[k][s] += p;
            }
            rows = rows
                .iter()
                .flat_map(|row| {
                    local
                        .iter()
                        .map(move |m| row.iter().zip(m).map(|(a, b)| a * b).collect::<Vec<f64>>())
                })
                .collect();
        }
        Ok(rows)
    }

    /// Priors `P(u)` with `Σ_u P(u) f(x | u, pa) = P(x | pa)` for every child.
    fn prior_polytope(
        &self,
        u: usize,
        locals: &BTreeMap<usize, BayesianFactor>,
    ) -> Result<HalfspaceFactor> {
        let card = self.model.cardinality(u)?;
        let prior_domain = Domain::var(u, card);
        let mut constraints = Vec::new();

        for child in self.model.children(u) {
            if self.exogenous_parents(child).len() > 1 {
                return Err(PgmError::UnsupportedOperation(format!(
                    "variable {} has more than one exogenous parent",
                    child
                )));
            }
            let equation = self.model.factor(child).ok_or_else(|| {
                PgmError::InvalidGraph(format!("variable {} has no factor", child))
            })?;
            let local = locals.get(&child).ok_or(PgmError::VariableNotFound(child))?;

            let family = equation.domain();
            let mut rows = vec![vec![0.0; card]; local.domain().size()];
            for ((k, s), p) in family
                .offset_map(local.domain())
                .into_iter()
                .zip(family.offset_map(&prior_domain))
                .zip(equation.data())
            {
                rows[k][s] += p;
            }
            constraints.extend(
                rows.into_iter()
                    .zip(local.data())
                    .map(|(row, target)| LinearConstraint::eq(row, target)),
            );
        }
        constraints.push(LinearConstraint::eq(vec![1.0; card], 1.0));

        HalfspaceFactor::new(prior_domain, constraints)
    }
}

fn close(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= 1e-7)
}

fn lookup(map: &BTreeMap<usize, usize>, variable: usize) -> Result<usize> {
    map.get(&variable)
        .copied()
        .ok_or(PgmError::VariableNotFound(variable))
}

/// `card^configs`, if it fits.
fn canonical_size(card: usize, configs: usize) -> Option<usize> {
    u32::try_from(configs).ok().and_then(|e| card.checked_pow(e))
}
