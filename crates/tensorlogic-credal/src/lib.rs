//! Causal and credal inference over discrete graphical models.
//!
//! This crate provides a factor algebra over several kinds of (imprecise)
//! probability tables and the inference engines built on top of it.
//!
//! # Core Concepts
//!
//! - **Factors**: point ([`BayesianFactor`]), interval ([`IntervalFactor`]),
//!   vertex ([`VertexFactor`]) and halfspace ([`HalfspaceFactor`]) tables
//!   sharing the [`FactorOps`] algebra
//! - **Models**: DAG-structured [`GraphicalModel`]s and
//!   [`StructuralCausalModel`]s with exogenous noise variables
//! - **Inference**: generic [`VariableElimination`], credal vertex
//!   enumeration and LP relaxation, loopy belief propagation
//! - **Causality**: `do(X = x)` by graph surgery, answered exactly or as
//!   credal bounds
//!
//! # Architecture
//!
//! ```text
//! StructuralCausalModel ──to_credal_network──► GraphicalModel<VertexFactor>    ──► CredalVariableElimination
//!        │                                 └─► GraphicalModel<HalfspaceFactor> ──► ApproxLp
//!        ▼
//! GraphicalModel<BayesianFactor> ──► VariableElimination / LoopyBeliefPropagation
//! ```
//!
//! Evidence and interventions are both maps from variable to observed state
//! ([`Evidence`]).

mod causal_inference;
mod credal;
mod domain;
mod elimination_ordering;
mod error;
pub mod factor;
pub mod lp;
mod message_passing;
pub mod model;
mod timeout;
mod variable_elimination;

pub use causal_inference::{CausalInference, CausalVE, CredalCausalApproxLp, CredalCausalVE};
pub use credal::{ApproxLp, CredalVariableElimination};
pub use domain::Domain;
pub use elimination_ordering::{EliminationOrdering, EliminationStrategy};
pub use error::{PgmError, Result};
pub use factor::{
    BayesianFactor, FactorOps, HalfspaceFactor, IntervalFactor, PointMass, VertexFactor,
    PROBABILITY_TOLERANCE,
};
pub use lp::{LinearSolver, SimplexSolver};
pub use message_passing::{ConvergenceStats, LoopyBeliefPropagation, MessagePassingAlgorithm};
pub use model::{
    BayesianNetwork, CredalNetwork, DirectedAcyclicGraph, GraphicalModel, StructuralCausalModel,
};
pub use timeout::invoke_with_timeout;
pub use variable_elimination::{QueryResult, VariableElimination};

use std::collections::BTreeMap;

/// Observed (or intervened) states keyed by variable.
pub type Evidence = BTreeMap<usize, usize>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    // A → B, the smallest model that exercises every engine
    fn pair() -> BayesianNetwork {
        let mut model = BayesianNetwork::new();
        let a = model.add_variable(2).unwrap();
        let b = model.add_variable(2).unwrap();
        model.add_link(a, b).unwrap();
        model
            .set_factors(vec![
                BayesianFactor::new(Domain::var(a, 2), vec![0.4, 0.6]).unwrap(),
                BayesianFactor::new(model.family_domain(b).unwrap(), vec![0.3, 0.9, 0.7, 0.1])
                    .unwrap(),
            ])
            .unwrap();
        model
    }

    #[test]
    fn test_engines_agree_on_tree() {
        let model = pair();
        let evidence = Evidence::from([(1, 0)]);
        let exact = VariableElimination::from_model(&model, vec![])
            .unwrap()
            .with_evidence(evidence.clone())
            .run(&[0])
            .unwrap()
            .into_result()
            .unwrap();
        let lbp = LoopyBeliefPropagation::default()
            .query(&model, &evidence, 0)
            .unwrap();
        for (a, b) in exact.data().iter().zip(lbp.data()) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
        }
    }
}
