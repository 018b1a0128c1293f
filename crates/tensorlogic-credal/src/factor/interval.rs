//! Interval-valued factors: `[lower, upper]` per joint state.

use scirs2_core::ndarray::{ArrayD, IxDyn, Zip};

use super::{
    check_state, check_subdomain, group_by, one_hot, table_axis, table_flat, table_from,
    table_value, BayesianFactor, FactorOps, PointMass, PROBABILITY_TOLERANCE,
};
use crate::domain::Domain;
use crate::error::{PgmError, Result};
use crate::lp::{Goal, LinearConstraint, LinearProblem, LinearSolver};

/// A credal factor bounding each joint state by an interval.
///
/// The domain splits into data variables and a separating domain: intervals
/// are specified independently for every configuration of the separating
/// variables (typically the parents of a conditional).
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalFactor {
    domain: Domain,
    separating: Domain,
    lower: ArrayD<f64>,
    upper: ArrayD<f64>,
}

impl IntervalFactor {
    /// Create from bounds in domain order.
    pub fn new(
        domain: Domain,
        separating: Domain,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Result<Self> {
        check_subdomain(&domain, &separating)?;
        for (l, u) in lower.iter().zip(&upper) {
            if !(l.is_finite() && u.is_finite())
                || *l < -PROBABILITY_TOLERANCE
                || *u > 1.0 + PROBABILITY_TOLERANCE
                || *l > *u + PROBABILITY_TOLERANCE
            {
                return Err(PgmError::InvalidDistribution(format!(
                    "interval [{}, {}] is not a sub-interval of [0, 1]",
                    l, u
                )));
            }
        }
        let lower = table_from(&domain, lower)?;
        let upper = table_from(&domain, upper)?;
        Ok(Self {
            domain,
            separating,
            lower: lower.mapv(|v| v.clamp(0.0, 1.0)),
            upper: upper.mapv(|v| v.clamp(0.0, 1.0)),
        })
    }

    /// Degenerate intervals around a point factor.
    pub fn from_point(factor: &BayesianFactor, separating: Domain) -> Result<Self> {
        let data = factor.data();
        Self::new(factor.domain().clone(), separating, data.clone(), data)
    }

    /// Conditioning variables.
    pub fn separating(&self) -> &Domain {
        &self.separating
    }

    /// Variables the intervals range over.
    pub fn data_domain(&self) -> Domain {
        self.domain.subtract(&self.separating)
    }

    /// Lower bound at an assignment given in domain order.
    pub fn lower(&self, assignment: &[usize]) -> Result<f64> {
        table_value(&self.domain, &self.lower, assignment)
    }

    /// Upper bound at an assignment given in domain order.
    pub fn upper(&self, assignment: &[usize]) -> Result<f64> {
        table_value(&self.domain, &self.upper, assignment)
    }

    /// All lower bounds in domain order.
    pub fn lower_data(&self) -> Vec<f64> {
        table_flat(&self.lower)
    }

    /// All upper bounds in domain order.
    pub fn upper_data(&self) -> Vec<f64> {
        table_flat(&self.upper)
    }

    /// Whether `Σ lower ≤ 1 ≤ Σ upper` for every separating configuration.
    pub fn is_proper(&self) -> bool {
        let lower = self.lower_data();
        let upper = self.upper_data();
        group_by(&self.domain, &self.separating).iter().all(|group| {
            let l: f64 = group.iter().map(|&i| lower[i]).sum();
            let u: f64 = group.iter().map(|&i| upper[i]).sum();
            l <= 1.0 + PROBABILITY_TOLERANCE && u >= 1.0 - PROBABILITY_TOLERANCE
        })
    }

    /// Marginalize by solving one pair of linear programs per remaining state.
    ///
    /// For every separating configuration the distributions compatible with
    /// `l ≤ p ≤ u, Σp = 1` are optimized directly, so the result is tight
    /// where [`FactorOps::marginalize`] only sums bounds.
    pub fn marginalize_exact(&self, variable: usize, solver: &dyn LinearSolver) -> Result<Self> {
        self.check_data_variable(variable)?;

        let data_domain = self.data_domain();
        let remaining_data = data_domain.remove(variable);
        let result_domain = self.domain.remove(variable);

        let lower = self.lower_data();
        let upper = self.upper_data();
        let data_of = self.domain.offset_map(&data_domain);
        let groups = group_by(&self.domain, &self.separating);

        // Bounds per (separating configuration, remaining data state).
        let mut bounds = vec![(0.0, 0.0); self.separating.size() * remaining_data.size()];
        let collapse = data_domain.offset_map(&remaining_data);

        for (sep, group) in groups.iter().enumerate() {
            let n = data_domain.size();
            let mut l = vec![0.0; n];
            let mut u = vec![0.0; n];
            for &idx in group {
                l[data_of[idx]] = lower[idx];
                u[data_of[idx]] = upper[idx];
            }

            let mut constraints = Vec::with_capacity(2 * n + 1);
            for d in 0..n {
                let mut row = vec![0.0; n];
                row[d] = 1.0;
                constraints.push(LinearConstraint::geq(row.clone(), l[d]));
                constraints.push(LinearConstraint::leq(row, u[d]));
            }
            constraints.push(LinearConstraint::eq(vec![1.0; n], 1.0));

            for r in 0..remaining_data.size() {
                let objective: Vec<f64> = collapse
                    .iter()
                    .map(|&target| if target == r { 1.0 } else { 0.0 })
                    .collect();
                let min = solver.solve(&LinearProblem::new(
                    objective.clone(),
                    Goal::Minimize,
                    constraints.clone(),
                ))?;
                let max = solver.solve(&LinearProblem::new(
                    objective,
                    Goal::Maximize,
                    constraints.clone(),
                ))?;
                bounds[sep * remaining_data.size() + r] = (min.value, max.value);
            }
        }

        let sep_of = result_domain.offset_map(&self.separating);
        let rem_of = result_domain.offset_map(&remaining_data);
        let (lower, upper): (Vec<f64>, Vec<f64>) = sep_of
            .iter()
            .zip(&rem_of)
            .map(|(&s, &r)| bounds[s * remaining_data.size() + r])
            .map(|(l, u)| (l.clamp(0.0, 1.0), u.clamp(0.0, 1.0)))
            .unzip();

        tracing::trace!(variable, solver = solver.name(), "exact interval marginalization");
        Self::new(result_domain, self.separating.clone(), lower, upper)
    }

    /// Widest gap between an upper and a lower bound.
    pub fn max_width(&self) -> f64 {
        let mut width = 0.0f64;
        Zip::from(&self.lower)
            .and(&self.upper)
            .for_each(|l, u| width = width.max(u - l));
        width
    }

    fn check_data_variable(&self, variable: usize) -> Result<()> {
        if !self.domain.contains(variable) {
            return Err(PgmError::NotInDomain(variable));
        }
        if self.separating.contains(variable) {
            return Err(PgmError::UnsupportedOperation(format!(
                "cannot sum out conditioning variable {}",
                variable
            )));
        }
        Ok(())
    }
}

impl FactorOps for IntervalFactor {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    /// `[l₁, u₁] · [l₂, u₂] = [l₁l₂, u₁u₂]` on the union domain.
    fn combine(&self, other: &Self) -> Result<Self> {
        let union = self.domain.union(&other.domain)?;
        let data = self.data_domain().union(&other.data_domain())?;
        let separating = self.separating.union(&other.separating)?.subtract(&data);

        let map_a = union.offset_map(&self.domain);
        let map_b = union.offset_map(&other.domain);

        let (la, ua) = (self.lower_data(), self.upper_data());
        let (lb, ub) = (other.lower_data(), other.upper_data());
        let lower = map_a.iter().zip(&map_b).map(|(&i, &j)| la[i] * lb[j]).collect();
        let upper = map_a.iter().zip(&map_b).map(|(&i, &j)| ua[i] * ub[j]).collect();

        Ok(Self {
            lower: table_from(&union, lower)?,
            upper: table_from(&union, upper)?,
            domain: union,
            separating,
        })
    }

    /// Sums lower and upper bounds, capped at 1. The bounds are not tightened
    /// by the complementary mass, since VE passes unnormalized products here.
    /// This is an outer approximation; see
    /// [`IntervalFactor::marginalize_exact`] for tight bounds.
    fn marginalize(&self, variable: usize) -> Result<Self> {
        self.check_data_variable(variable)?;
        let axis = table_axis(&self.domain, variable)?;
        Ok(Self {
            domain: self.domain.remove(variable),
            separating: self.separating.clone(),
            lower: self.lower.sum_axis(axis).mapv(|v| v.min(1.0)),
            upper: self.upper.sum_axis(axis).mapv(|v| v.min(1.0)),
        })
    }

    fn filter(&self, variable: usize, state: usize) -> Result<Self> {
        check_state(&self.domain, variable, state)?;
        let axis = table_axis(&self.domain, variable)?;
        Ok(Self {
            domain: self.domain.remove(variable),
            separating: self.separating.remove(variable),
            lower: self.lower.index_axis(axis, state).to_owned(),
            upper: self.upper.index_axis(axis, state).to_owned(),
        })
    }

    /// Bounds on `pᵢ / Σⱼ pⱼ` within each separating configuration:
    /// `[lᵢ / (lᵢ + Σⱼ≠ᵢ uⱼ), uᵢ / (uᵢ + Σⱼ≠ᵢ lⱼ)]`.
    fn normalize(&self) -> Result<Self> {
        let lower = self.lower_data();
        let upper = self.upper_data();
        let mut new_lower = vec![0.0; lower.len()];
        let mut new_upper = vec![0.0; upper.len()];

        for group in group_by(&self.domain, &self.separating) {
            let sum_l: f64 = group.iter().map(|&i| lower[i]).sum();
            let sum_u: f64 = group.iter().map(|&i| upper[i]).sum();
            for &i in &group {
                let lo_den = lower[i] + (sum_u - upper[i]);
                let up_den = upper[i] + (sum_l - lower[i]);
                new_lower[i] = if lo_den > 0.0 { lower[i] / lo_den } else { 0.0 };
                new_upper[i] = if up_den > 0.0 { upper[i] / up_den } else { 1.0 };
                if upper[i] <= 0.0 {
                    new_upper[i] = 0.0;
                }
            }
        }

        Self::new(
            self.domain.clone(),
            self.separating.clone(),
            new_lower,
            new_upper,
        )
    }

    fn is_degenerate(&self) -> bool {
        self.upper.iter().all(|&u| u <= 0.0)
    }

    fn unit() -> Self {
        let one = ArrayD::from_elem(IxDyn(&[]), 1.0);
        Self {
            domain: Domain::empty(),
            separating: Domain::empty(),
            lower: one.clone(),
            upper: one,
        }
    }
}

impl PointMass for IntervalFactor {
    fn point_mass(variable: usize, cardinality: usize, state: usize) -> Result<Self> {
        let data = one_hot(cardinality, state, variable)?;
        Self::new(
            Domain::var(variable, cardinality),
            Domain::empty(),
            data.clone(),
            data,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::SimplexSolver;
    use approx::assert_abs_diff_eq;

    fn root() -> IntervalFactor {
        IntervalFactor::new(
            Domain::var(0, 2),
            Domain::empty(),
            vec![0.2, 0.5],
            vec![0.5, 0.8],
        )
        .unwrap()
    }

    fn conditional() -> IntervalFactor {
        // P(X1 | X0), columns over X0
        IntervalFactor::new(
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
            Domain::var(0, 2),
            vec![0.1, 0.6, 0.7, 0.2],
            vec![0.3, 0.8, 0.9, 0.4],
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_interval() {
        let err = IntervalFactor::new(
            Domain::var(0, 2),
            Domain::empty(),
            vec![0.6, 0.1],
            vec![0.5, 0.2],
        );
        assert!(matches!(err, Err(PgmError::InvalidDistribution(_))));
    }

    #[test]
    fn test_combine_makes_parent_data() {
        let joint = root().combine(&conditional()).unwrap();
        assert_eq!(joint.domain().variables(), &[0, 1]);
        assert!(joint.separating().is_empty());
        // x0 = 1, x1 = 0: [0.5 * 0.6, 0.8 * 0.8]
        assert_abs_diff_eq!(joint.lower(&[1, 0]).unwrap(), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(joint.upper(&[1, 0]).unwrap(), 0.64, epsilon = 1e-12);
    }

    #[test]
    fn test_marginalize_bounds_ordered() {
        let m = root().combine(&conditional()).unwrap().marginalize(0).unwrap();
        for (l, u) in m.lower_data().iter().zip(m.upper_data()) {
            assert!(*l <= u);
            assert!((0.0..=1.0).contains(l) && (0.0..=1.0).contains(&u));
        }
        assert!(matches!(
            conditional().marginalize(0),
            Err(PgmError::UnsupportedOperation(_))
        ));
        assert_eq!(root().marginalize(4), Err(PgmError::NotInDomain(4)));
    }

    #[test]
    fn test_filter_separating() {
        let sliced = conditional().filter(0, 1).unwrap();
        assert!(sliced.separating().is_empty());
        assert_eq!(sliced.lower_data(), vec![0.6, 0.2]);
        assert_eq!(sliced.upper_data(), vec![0.8, 0.4]);
    }

    #[test]
    fn test_normalize_ratio_bounds() {
        let f = IntervalFactor::new(
            Domain::var(0, 2),
            Domain::empty(),
            vec![0.1, 0.2],
            vec![0.2, 0.4],
        )
        .unwrap();
        let n = f.normalize().unwrap();
        assert_abs_diff_eq!(n.lower_data()[0], 0.1 / 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(n.upper_data()[0], 0.2 / 0.4, epsilon = 1e-12);
        assert!(n.is_proper());
    }

    #[test]
    fn test_marginalize_exact_is_tighter() {
        let f = IntervalFactor::new(
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
            Domain::empty(),
            vec![0.1, 0.1, 0.1, 0.1],
            vec![0.6, 0.6, 0.6, 0.6],
        )
        .unwrap();
        let loose = f.marginalize(1).unwrap();
        let tight = f.marginalize_exact(1, &SimplexSolver::default()).unwrap();
        // x0 = 0 collects two states; the other two keep at least 0.2 of the mass
        assert_abs_diff_eq!(loose.lower_data()[0], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(tight.lower_data()[0], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(loose.upper_data()[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(tight.upper_data()[0], 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_width() {
        assert_abs_diff_eq!(root().max_width(), 0.3, epsilon = 1e-12);
    }
}
