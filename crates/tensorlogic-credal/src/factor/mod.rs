//! Factor algebra over point, interval, vertex and halfspace factors.
//!
//! Every factor kind implements [`FactorOps`], the capability set the
//! elimination engine is written against:
//!
//! ```text
//! combine     φ₁(X₁) ⊗ φ₂(X₂)  → φ(X₁ ∪ X₂)
//! marginalize Σₓ φ(X, Y)       → φ(Y)
//! filter      φ(X = s, Y)      → φ(Y)
//! normalize   φ / Σφ
//! ```

mod bayesian;
pub mod convert;
mod halfspace;
mod interval;
mod vertex;

pub use bayesian::BayesianFactor;
pub use halfspace::HalfspaceFactor;
pub use interval::IntervalFactor;
pub use vertex::VertexFactor;

pub(crate) use vertex::prune_set;

use scirs2_core::ndarray::{ArrayD, Axis, IxDyn};
use std::fmt::Debug;

use crate::domain::Domain;
use crate::error::{PgmError, Result};

/// Tolerance used when comparing probabilities inside the factor algebra.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Capability set shared by all factor kinds.
pub trait FactorOps: Clone + Debug + Sized {
    /// Variables the factor is defined over.
    fn domain(&self) -> &Domain;

    /// Product of two factors over the union of their domains.
    fn combine(&self, other: &Self) -> Result<Self>;

    /// Sum out a variable.
    fn marginalize(&self, variable: usize) -> Result<Self>;

    /// Keep the slice where `variable == state` and drop the variable.
    fn filter(&self, variable: usize, state: usize) -> Result<Self>;

    /// Rescale so the represented distributions sum to one.
    fn normalize(&self) -> Result<Self>;

    /// Whether the factor carries no probability mass.
    fn is_degenerate(&self) -> bool;

    /// Neutral element of `combine` over the empty domain.
    fn unit() -> Self;

    /// Sum out every variable not in `keep`.
    fn marginalize_to(&self, keep: &[usize]) -> Result<Self> {
        let drop: Vec<usize> = self
            .domain()
            .variables()
            .iter()
            .copied()
            .filter(|v| !keep.contains(v))
            .collect();
        drop.into_iter()
            .try_fold(self.clone(), |acc, v| acc.marginalize(v))
    }
}

/// Factors that can represent a point mass on a single variable.
pub trait PointMass: Sized {
    /// Distribution over `variable` putting all mass on `state`.
    fn point_mass(variable: usize, cardinality: usize, state: usize) -> Result<Self>;
}

/// Combine a sequence of factors; the empty sequence yields [`FactorOps::unit`].
pub fn combine_all<'a, F, I>(factors: I) -> Result<F>
where
    F: FactorOps + 'a,
    I: IntoIterator<Item = &'a F>,
{
    let mut iter = factors.into_iter();
    let Some(first) = iter.next() else {
        return Ok(F::unit());
    };
    iter.try_fold(first.clone(), |acc, f| acc.combine(f))
}

pub(crate) fn one_hot(cardinality: usize, state: usize, variable: usize) -> Result<Vec<f64>> {
    if state >= cardinality {
        return Err(PgmError::OutOfRange(format!(
            "state {} of variable {} exceeds cardinality {}",
            state, variable, cardinality
        )));
    }
    let mut data = vec![0.0; cardinality];
    data[state] = 1.0;
    Ok(data)
}

// Tables keep their axes in reverse domain order so that the standard
// (row-major) iteration order is the domain's mixed-radix order.

pub(crate) fn table_from(domain: &Domain, data: Vec<f64>) -> Result<ArrayD<f64>> {
    if data.len() != domain.size() {
        return Err(PgmError::DimensionMismatch {
            expected: domain.size(),
            got: data.len(),
        });
    }
    let shape: Vec<usize> = domain.cardinalities().iter().rev().copied().collect();
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|_| PgmError::DimensionMismatch {
        expected: domain.size(),
        got: domain.size(),
    })
}

pub(crate) fn table_axis(domain: &Domain, variable: usize) -> Result<Axis> {
    let position = domain
        .position(variable)
        .ok_or(PgmError::NotInDomain(variable))?;
    Ok(Axis(domain.len() - 1 - position))
}

pub(crate) fn table_flat(values: &ArrayD<f64>) -> Vec<f64> {
    values.iter().copied().collect()
}

pub(crate) fn table_value(
    domain: &Domain,
    values: &ArrayD<f64>,
    assignment: &[usize],
) -> Result<f64> {
    domain.index_of(assignment)?;
    let index: Vec<usize> = assignment.iter().rev().copied().collect();
    Ok(values[IxDyn(&index)])
}

pub(crate) fn check_state(domain: &Domain, variable: usize, state: usize) -> Result<()> {
    let card = domain
        .cardinality(variable)
        .ok_or(PgmError::NotInDomain(variable))?;
    if state >= card {
        return Err(PgmError::OutOfRange(format!(
            "state {} of variable {} exceeds cardinality {}",
            state, variable, card
        )));
    }
    Ok(())
}

/// Check that `separating` is a sub-domain of `domain` with matching cardinalities.
pub(crate) fn check_subdomain(domain: &Domain, separating: &Domain) -> Result<()> {
    for (&var, &card) in separating.variables().iter().zip(separating.cardinalities()) {
        match domain.cardinality(var) {
            None => return Err(PgmError::NotInDomain(var)),
            Some(c) if c != card => {
                return Err(PgmError::DomainConflict {
                    variable: var,
                    left: c,
                    right: card,
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Group the flat indices of `domain` by their configuration over `separating`.
pub(crate) fn group_by(domain: &Domain, separating: &Domain) -> Vec<Vec<usize>> {
    let mut groups = vec![Vec::new(); separating.size()];
    for (idx, key) in domain.offset_map(separating).into_iter().enumerate() {
        groups[key].push(idx);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_layout() {
        let d = Domain::new(&[0, 1], &[2, 3]).unwrap();
        let t = table_from(&d, (0..6).map(f64::from).collect()).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(table_value(&d, &t, &[1, 2]).unwrap(), 5.0);
        assert_eq!(table_flat(&t), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(table_axis(&d, 0).unwrap(), Axis(1));
    }

    #[test]
    fn test_group_by() {
        let d = Domain::new(&[0, 1], &[2, 2]).unwrap();
        let groups = group_by(&d, &Domain::var(1, 2));
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_combine_all_empty() {
        let unit: BayesianFactor = combine_all(std::iter::empty::<&BayesianFactor>()).unwrap();
        assert!(unit.domain().is_empty());
        assert_eq!(unit.data(), vec![1.0]);
    }
}
