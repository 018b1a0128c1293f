//! Point-valued factors (conditional probability tables and potentials).

use scirs2_core::ndarray::{ArrayD, IxDyn};

use super::{
    check_state, group_by, one_hot, table_axis, table_flat, table_from, table_value, FactorOps,
    PointMass,
};
use crate::domain::Domain;
use crate::error::{PgmError, Result};

/// A point factor φ(X₁, ..., Xₖ) → ℝ⁺.
///
/// Values are stored in an `ArrayD` whose flat order is the domain's
/// mixed-radix order (first variable fastest).
#[derive(Clone, Debug, PartialEq)]
pub struct BayesianFactor {
    domain: Domain,
    values: ArrayD<f64>,
}

impl BayesianFactor {
    /// Create a factor from data in domain order.
    pub fn new(domain: Domain, data: Vec<f64>) -> Result<Self> {
        if let Some(bad) = data.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(PgmError::InvalidDistribution(format!(
                "factor values must be finite and non-negative, got {}",
                bad
            )));
        }
        let values = table_from(&domain, data)?;
        Ok(Self { domain, values })
    }

    /// Create a uniform factor.
    pub fn uniform(domain: Domain) -> Self {
        let value = 1.0 / domain.size() as f64;
        Self::filled(domain, value)
    }

    /// Zero-variable factor holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self::filled(Domain::empty(), value)
    }

    fn filled(domain: Domain, value: f64) -> Self {
        let shape: Vec<usize> = domain.cardinalities().iter().rev().copied().collect();
        Self {
            values: ArrayD::from_elem(IxDyn(&shape), value),
            domain,
        }
    }

    /// Values in domain order.
    pub fn data(&self) -> Vec<f64> {
        table_flat(&self.values)
    }

    /// Underlying table.
    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    /// Value at an assignment given in domain order.
    pub fn value(&self, assignment: &[usize]) -> Result<f64> {
        table_value(&self.domain, &self.values, assignment)
    }

    /// Value at a flat index.
    pub fn value_at(&self, index: usize) -> Result<f64> {
        let assignment = self.domain.assignment_of(index)?;
        self.value(&assignment)
    }

    /// Sum of all values.
    pub fn sum(&self) -> f64 {
        self.values.sum()
    }

    /// Round a conditional table to `decimals` places.
    ///
    /// Every column over `variable` is rounded and the rounding residual is
    /// added to its largest entry, so columns keep summing to exactly one.
    pub fn fix_precision(&self, decimals: u32, variable: usize) -> Result<Self> {
        if !self.domain.contains(variable) {
            return Err(PgmError::NotInDomain(variable));
        }
        let scale = 10f64.powi(decimals as i32);
        let round = |v: f64| (v * scale).round() / scale;

        let mut data = self.data();
        let conditioning = self.domain.remove(variable);
        for column in group_by(&self.domain, &conditioning) {
            let mut total = 0.0;
            for &idx in &column {
                data[idx] = round(data[idx]);
                total += data[idx];
            }
            let Some(&largest) = column
                .iter()
                .max_by(|a, b| data[**a].total_cmp(&data[**b]))
            else {
                continue;
            };
            data[largest] = round(data[largest] + 1.0 - total).max(0.0);
        }

        Self::new(self.domain.clone(), data)
    }

    /// Whether every column over `variable` sums to one within `tolerance`.
    pub fn is_conditional(&self, variable: usize, tolerance: f64) -> bool {
        if !self.domain.contains(variable) {
            return false;
        }
        let data = self.data();
        group_by(&self.domain, &self.domain.remove(variable))
            .iter()
            .all(|column| (column.iter().map(|&i| data[i]).sum::<f64>() - 1.0).abs() <= tolerance)
    }
}

impl FactorOps for BayesianFactor {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    /// φ₁(X₁) * φ₂(X₂) = φ(X₁ ∪ X₂)
    fn combine(&self, other: &Self) -> Result<Self> {
        let union = self.domain.union(&other.domain)?;
        let left = self.data();
        let right = other.data();

        let data = union
            .offset_map(&self.domain)
            .into_iter()
            .zip(union.offset_map(&other.domain))
            .map(|(i, j)| left[i] * right[j])
            .collect();

        let values = table_from(&union, data)?;
        Ok(Self {
            domain: union,
            values,
        })
    }

    /// ∑ₓ φ(X, Y) = φ(Y)
    fn marginalize(&self, variable: usize) -> Result<Self> {
        let axis = table_axis(&self.domain, variable)?;
        Ok(Self {
            domain: self.domain.remove(variable),
            values: self.values.sum_axis(axis),
        })
    }

    fn filter(&self, variable: usize, state: usize) -> Result<Self> {
        check_state(&self.domain, variable, state)?;
        let axis = table_axis(&self.domain, variable)?;
        Ok(Self {
            domain: self.domain.remove(variable),
            values: self.values.index_axis(axis, state).to_owned(),
        })
    }

    fn normalize(&self) -> Result<Self> {
        let sum = self.sum();
        let mut result = self.clone();
        if sum > 0.0 {
            result.values /= sum;
        }
        Ok(result)
    }

    fn is_degenerate(&self) -> bool {
        self.values.iter().all(|&v| v <= 0.0)
    }

    fn unit() -> Self {
        Self::scalar(1.0)
    }
}

impl PointMass for BayesianFactor {
    fn point_mass(variable: usize, cardinality: usize, state: usize) -> Result<Self> {
        let data = one_hot(cardinality, state, variable)?;
        Self::new(Domain::var(variable, cardinality), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn xy(data: Vec<f64>) -> BayesianFactor {
        BayesianFactor::new(Domain::new(&[0, 1], &[2, 2]).unwrap(), data).unwrap()
    }

    #[test]
    fn test_factor_creation() {
        let factor = xy(vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(factor.domain().len(), 2);
        assert_eq!(factor.values().ndim(), 2);
        assert_eq!(factor.value(&[1, 0]).unwrap(), 0.2);
        assert_eq!(factor.value_at(2).unwrap(), 0.3);
    }

    #[test]
    fn test_invalid_values() {
        let d = Domain::var(0, 2);
        assert!(matches!(
            BayesianFactor::new(d.clone(), vec![0.5, -0.1]),
            Err(PgmError::InvalidDistribution(_))
        ));
        assert!(matches!(
            BayesianFactor::new(d, vec![1.0]),
            Err(PgmError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_factor_normalize() {
        let factor = xy(vec![1.0, 2.0, 3.0, 4.0]).normalize().unwrap();
        assert_abs_diff_eq!(factor.sum(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_uniform_factor() {
        let factor = BayesianFactor::uniform(Domain::var(0, 3));
        assert_eq!(factor.data().len(), 3);
        assert_abs_diff_eq!(factor.sum(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_factor_combine_disjoint() {
        // φ₁(X) and φ₂(Y) → outer product φ(X,Y)
        let f1 = BayesianFactor::new(Domain::var(0, 2), vec![0.6, 0.4]).unwrap();
        let f2 = BayesianFactor::new(Domain::var(1, 2), vec![0.7, 0.3]).unwrap();

        let product = f1.combine(&f2).unwrap();
        assert_eq!(product.domain().variables(), &[0, 1]);
        let expected = [0.6 * 0.7, 0.4 * 0.7, 0.6 * 0.3, 0.4 * 0.3];
        for (a, b) in product.data().iter().zip(expected) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_factor_combine_shared() {
        // φ₁(X,Y) and φ₂(Y,Z) → φ(X,Y,Z)
        let f1 = xy(vec![0.1, 0.2, 0.3, 0.4]);
        let f2 = BayesianFactor::new(
            Domain::new(&[1, 2], &[2, 2]).unwrap(),
            vec![0.5, 0.25, 0.5, 0.75],
        )
        .unwrap();
        let product = f1.combine(&f2).unwrap();
        assert_eq!(product.domain().variables(), &[0, 1, 2]);
        // x=1, y=1, z=1: 0.4 * 0.75
        assert_abs_diff_eq!(product.value(&[1, 1, 1]).unwrap(), 0.3, epsilon = 1e-12);
        // x=0, y=1, z=0: 0.3 * 0.25
        assert_abs_diff_eq!(product.value(&[0, 1, 0]).unwrap(), 0.075, epsilon = 1e-12);
    }

    #[test]
    fn test_factor_marginalize() {
        let factor = xy(vec![0.1, 0.2, 0.3, 0.4]);
        let marginal = factor.marginalize(1).unwrap();
        assert_eq!(marginal.domain().variables(), &[0]);
        assert_abs_diff_eq!(marginal.value(&[0]).unwrap(), 0.4, epsilon = 1e-10);
        assert_abs_diff_eq!(marginal.value(&[1]).unwrap(), 0.6, epsilon = 1e-10);

        let scalar = marginal.marginalize(0).unwrap();
        assert!(scalar.domain().is_empty());
        assert_abs_diff_eq!(scalar.data()[0], 1.0, epsilon = 1e-10);

        assert_eq!(factor.marginalize(7), Err(PgmError::NotInDomain(7)));
    }

    #[test]
    fn test_factor_filter() {
        // Y=1 slice: [0.3, 0.4]
        let reduced = xy(vec![0.1, 0.2, 0.3, 0.4]).filter(1, 1).unwrap();
        assert_eq!(reduced.domain().variables(), &[0]);
        assert_eq!(reduced.data(), vec![0.3, 0.4]);

        assert!(matches!(
            xy(vec![0.1, 0.2, 0.3, 0.4]).filter(1, 2),
            Err(PgmError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_filter_to_zero_is_degenerate() {
        let reduced = xy(vec![0.5, 0.5, 0.0, 0.0]).filter(1, 1).unwrap();
        assert!(reduced.is_degenerate());
        assert_eq!(reduced.normalize().unwrap().data(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_fix_precision() {
        let factor = xy(vec![0.3333, 0.6667, 0.12345, 0.87655]);
        let fixed = factor.fix_precision(2, 0).unwrap();
        assert_eq!(fixed.data()[0], 0.33);
        assert_abs_diff_eq!(fixed.data()[1], 0.67, epsilon = 1e-12);
        assert!(fixed.is_conditional(0, 1e-12));
    }

    #[test]
    fn test_point_mass() {
        let f = BayesianFactor::point_mass(3, 3, 2).unwrap();
        assert_eq!(f.data(), vec![0.0, 0.0, 1.0]);
        assert!(BayesianFactor::point_mass(3, 3, 3).is_err());
    }

    #[test]
    fn test_marginalize_to() {
        let f = xy(vec![0.1, 0.2, 0.3, 0.4]);
        let m = f.marginalize_to(&[1]).unwrap();
        assert_eq!(m.domain().variables(), &[1]);
        assert_abs_diff_eq!(m.data()[0], 0.3, epsilon = 1e-12);
    }
}
