//! Causal query front-ends.
//!
//! Each engine answers `P(targets | evidence, do(intervention))` on a
//! structural causal model: interventions are applied by graph surgery on a
//! copy of the model, then the query runs on the mutilated copy.

use std::collections::BTreeMap;

use crate::credal::{ApproxLp, CredalVariableElimination};
use crate::elimination_ordering::EliminationOrdering;
use crate::error::{PgmError, Result};
use crate::factor::{
    BayesianFactor, FactorOps, HalfspaceFactor, IntervalFactor, PointMass, VertexFactor,
};
use crate::model::{CredalNetwork, GraphicalModel, StructuralCausalModel};
use crate::variable_elimination::VariableElimination;
use crate::Evidence;

/// Interventional / observational queries on a causal model.
pub trait CausalInference {
    /// Factor kind of the answer.
    type Output;

    /// Distribution (or credal set) of `targets` given `evidence` after
    /// `do(intervention)`.
    fn query(
        &self,
        targets: &[usize],
        evidence: &Evidence,
        intervention: &Evidence,
    ) -> Result<Self::Output>;

    /// Engine name.
    fn name(&self) -> &str;
}

fn intervene<F: FactorOps + PointMass>(
    model: &GraphicalModel<F>,
    intervention: &Evidence,
) -> Result<GraphicalModel<F>> {
    intervention
        .iter()
        .try_fold(model.clone(), |acc, (&var, &state)| acc.intervention(var, state))
}

/// Exact causal inference on the precise model.
#[derive(Clone, Debug)]
pub struct CausalVE {
    model: StructuralCausalModel,
    ordering: EliminationOrdering,
}

impl CausalVE {
    pub fn new(model: StructuralCausalModel) -> Self {
        Self {
            model,
            ordering: EliminationOrdering::default(),
        }
    }

    pub fn with_ordering(mut self, ordering: EliminationOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn model(&self) -> &StructuralCausalModel {
        &self.model
    }
}

impl CausalInference for CausalVE {
    type Output = BayesianFactor;

    fn query(
        &self,
        targets: &[usize],
        evidence: &Evidence,
        intervention: &Evidence,
    ) -> Result<BayesianFactor> {
        let model = intervene(self.model.model(), intervention)?;
        let mut keep = targets.to_vec();
        keep.extend(evidence.keys());
        let order = self.ordering.for_model(&model, &keep)?;

        VariableElimination::from_model(&model, order)?
            .with_evidence(evidence.clone())
            .run(targets)?
            .into_result()
    }

    fn name(&self) -> &str {
        "CausalVE"
    }
}

/// Exact credal causal inference by vertex enumeration.
///
/// Exogenous priors range over every distribution compatible with the local
/// models of the endogenous variables. Each prior keeps only the vertices
/// that change what its children see, so targets and evidence must be
/// endogenous.
#[derive(Clone, Debug)]
pub struct CredalCausalVE {
    network: GraphicalModel<VertexFactor>,
    exogenous: Vec<usize>,
    engine: CredalVariableElimination,
}

impl CredalCausalVE {
    /// Credal network built from the model's own observational conditionals.
    pub fn new(model: &StructuralCausalModel) -> Result<Self> {
        Self::with_local_models(model, None)
    }

    pub fn with_local_models(
        model: &StructuralCausalModel,
        local_models: Option<&BTreeMap<usize, BayesianFactor>>,
    ) -> Result<Self> {
        match model.to_credal_network(true, local_models)? {
            CredalNetwork::Vertex(network) => Ok(Self {
                network,
                exogenous: model.exogenous(),
                engine: CredalVariableElimination::default(),
            }),
            CredalNetwork::Linear(_) => Err(PgmError::UnsupportedOperation(
                "expected a vertex credal network".to_string(),
            )),
        }
    }

    pub fn with_engine(mut self, engine: CredalVariableElimination) -> Self {
        self.engine = engine;
        self
    }

    pub fn network(&self) -> &GraphicalModel<VertexFactor> {
        &self.network
    }
}

impl CausalInference for CredalCausalVE {
    type Output = VertexFactor;

    fn query(
        &self,
        targets: &[usize],
        evidence: &Evidence,
        intervention: &Evidence,
    ) -> Result<VertexFactor> {
        let queried = targets.iter().chain(evidence.keys());
        if let Some(u) = queried.copied().find(|v| self.exogenous.contains(v)) {
            return Err(PgmError::UnsupportedOperation(format!(
                "exogenous variable {} cannot be queried or observed",
                u
            )));
        }
        let network = intervene(&self.network, intervention)?;
        self.engine.query(&network, targets, evidence)
    }

    fn name(&self) -> &str {
        "CredalCausalVE"
    }
}

/// Approximate credal causal inference by linear programming.
#[derive(Clone, Debug)]
pub struct CredalCausalApproxLp {
    network: GraphicalModel<HalfspaceFactor>,
    engine: ApproxLp,
}

impl CredalCausalApproxLp {
    /// Linear credal network built from the model's own observational
    /// conditionals.
    pub fn new(model: &StructuralCausalModel) -> Result<Self> {
        Self::with_local_models(model, None)
    }

    pub fn with_local_models(
        model: &StructuralCausalModel,
        local_models: Option<&BTreeMap<usize, BayesianFactor>>,
    ) -> Result<Self> {
        match model.to_credal_network(false, local_models)? {
            CredalNetwork::Linear(network) => Ok(Self {
                network,
                engine: ApproxLp::default(),
            }),
            CredalNetwork::Vertex(_) => Err(PgmError::UnsupportedOperation(
                "expected a linear credal network".to_string(),
            )),
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.engine = self.engine.with_epsilon(epsilon);
        self
    }

    pub fn with_engine(mut self, engine: ApproxLp) -> Self {
        self.engine = engine;
        self
    }

    pub fn network(&self) -> &GraphicalModel<HalfspaceFactor> {
        &self.network
    }
}

impl CausalInference for CredalCausalApproxLp {
    type Output = IntervalFactor;

    fn query(
        &self,
        targets: &[usize],
        evidence: &Evidence,
        intervention: &Evidence,
    ) -> Result<IntervalFactor> {
        let network = intervene(&self.network, intervention)?;
        self.engine.query(&network, targets, evidence)
    }

    fn name(&self) -> &str {
        "CredalCausalApproxLp"
    }
}
