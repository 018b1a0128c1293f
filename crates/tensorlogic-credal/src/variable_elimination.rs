//! Variable Elimination algorithm for exact inference.
//!
//! The engine is generic over the factor kind: point factors give exact
//! marginals, vertex factors give exact (but exponential) credal marginals,
//! halfspace factors give a constraint system over the target joint.
//!
//! The elimination order is supplied by the caller; see
//! [`crate::elimination_ordering`] for heuristics.

use std::collections::BTreeSet;

use crate::error::{PgmError, Result};
use crate::factor::{combine_all, FactorOps};
use crate::model::GraphicalModel;
use crate::Evidence;

/// Answer of an elimination query.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult<F> {
    /// Factor over the target variables.
    pub factor: F,
    /// Set when evidence filtering left no probability mass.
    pub degenerate: bool,
}

impl<F> QueryResult<F> {
    /// The factor, or `InconsistentEvidence` when the query was degenerate.
    pub fn into_result(self) -> Result<F> {
        if self.degenerate {
            Err(PgmError::InconsistentEvidence)
        } else {
            Ok(self.factor)
        }
    }
}

/// Variable elimination over an explicit factor set.
///
/// ```text
/// for X in order:
///     ψ = Σₓ ∏ { φ : X ∈ dom(φ) }
///     replace those φ by ψ
/// answer = ∏ remaining φ, restricted to the targets
/// ```
#[derive(Clone, Debug)]
pub struct VariableElimination<F> {
    order: Vec<usize>,
    factors: Vec<F>,
    evidence: Evidence,
    normalize: bool,
}

impl<F: FactorOps> VariableElimination<F> {
    /// Create an engine with a fixed elimination order.
    pub fn new(order: Vec<usize>) -> Self {
        Self {
            order,
            factors: Vec::new(),
            evidence: Evidence::new(),
            normalize: true,
        }
    }

    /// Engine loaded with every factor of a complete model.
    pub fn from_model(model: &GraphicalModel<F>, order: Vec<usize>) -> Result<Self> {
        Ok(Self::new(order).with_factors(model.complete_factors()?))
    }

    /// Elimination order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn set_factors(&mut self, factors: Vec<F>) {
        self.factors = factors;
    }

    pub fn with_factors(mut self, factors: Vec<F>) -> Self {
        self.set_factors(factors);
        self
    }

    pub fn set_evidence(&mut self, evidence: Evidence) {
        self.evidence = evidence;
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.set_evidence(evidence);
        self
    }

    /// Whether the answer is rescaled to a distribution (default `true`).
    pub fn set_normalize(&mut self, normalize: bool) {
        self.normalize = normalize;
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.set_normalize(normalize);
        self
    }

    /// Compute the factor over `targets`.
    ///
    /// Variables that are neither targets nor observed but are missing from
    /// the order are summed out at the end.
    pub fn run(&self, targets: &[usize]) -> Result<QueryResult<F>> {
        if let Some(&t) = targets.iter().find(|t| self.evidence.contains_key(t)) {
            return Err(PgmError::UnsupportedOperation(format!(
                "variable {} is both a target and observed",
                t
            )));
        }
        let targets: BTreeSet<usize> = targets.iter().copied().collect();

        let filtered = self.apply_evidence()?;
        let mut degenerate = filtered
            .iter()
            .any(|(touched, f)| *touched && f.is_degenerate());
        let mut working: Vec<F> = filtered.into_iter().map(|(_, f)| f).collect();

        for &var in &self.order {
            if targets.contains(&var) || self.evidence.contains_key(&var) {
                continue;
            }
            working = eliminate_variable(working, var)?;
        }

        let mut result = combine_all(&working)?;
        let keep: Vec<usize> = targets.iter().copied().collect();
        result = result.marginalize_to(&keep)?;

        if let Some(&missing) = targets.iter().find(|t| !result.domain().contains(**t)) {
            return Err(PgmError::NotInDomain(missing));
        }

        degenerate |= !self.evidence.is_empty() && result.is_degenerate();
        if degenerate {
            tracing::warn!(
                evidence = ?self.evidence,
                "evidence has zero probability, returning unnormalized factor"
            );
        } else if self.normalize {
            result = result.normalize()?;
        }

        Ok(QueryResult {
            factor: result,
            degenerate,
        })
    }

    /// Filter every factor by the evidence, flagging the ones that changed.
    fn apply_evidence(&self) -> Result<Vec<(bool, F)>> {
        self.factors
            .iter()
            .map(|factor| {
                let mut touched = false;
                let mut current = factor.clone();
                for (&var, &state) in &self.evidence {
                    if current.domain().contains(var) {
                        current = current.filter(var, state)?;
                        touched = true;
                    }
                }
                Ok((touched, current))
            })
            .collect()
    }
}

/// Eliminate a single variable from a set of factors.
fn eliminate_variable<F: FactorOps>(factors: Vec<F>, var: usize) -> Result<Vec<F>> {
    let (containing, mut rest): (Vec<F>, Vec<F>) =
        factors.into_iter().partition(|f| f.domain().contains(var));

    if containing.is_empty() {
        return Ok(rest);
    }

    let product = combine_all(&containing)?;
    tracing::debug!(
        variable = var,
        factors = containing.len(),
        width = product.domain().len(),
        "eliminating variable"
    );
    rest.push(product.marginalize(var)?);
    Ok(rest)
}
