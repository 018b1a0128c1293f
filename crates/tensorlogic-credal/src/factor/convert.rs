//! Conversions between factor kinds.
//!
//! Conditional factors carry the child variable explicitly: the remaining
//! variables of the domain become the separating (conditioning) domain.

use std::collections::BTreeSet;

use super::{
    BayesianFactor, FactorOps, HalfspaceFactor, IntervalFactor, VertexFactor,
    PROBABILITY_TOLERANCE,
};
use crate::domain::Domain;
use crate::error::{PgmError, Result};
use crate::lp::{LinearConstraint, LinearSolver, SimplexSolver};

fn conditioning(domain: &Domain, variable: usize) -> Result<Domain> {
    if !domain.contains(variable) {
        return Err(PgmError::NotInDomain(variable));
    }
    Ok(domain.remove(variable))
}

/// Precise conditional `P(variable | rest)` as a single-vertex credal factor.
pub fn point_to_vertex(factor: &BayesianFactor, variable: usize) -> Result<VertexFactor> {
    let separating = conditioning(factor.domain(), variable)?;
    VertexFactor::from_point(factor, separating)
}

/// Precise conditional as degenerate intervals.
pub fn point_to_interval(factor: &BayesianFactor, variable: usize) -> Result<IntervalFactor> {
    let separating = conditioning(factor.domain(), variable)?;
    IntervalFactor::from_point(factor, separating)
}

/// Coordinate-wise bounds of a vertex factor.
pub fn vertex_to_interval(factor: &VertexFactor) -> Result<IntervalFactor> {
    factor.to_interval()
}

/// Interval factor as linear constraints on its table.
///
/// Every separating configuration is specified separately: the column of
/// `P(x | pa)` gets its box and sums to one.
///
/// ```text
/// l(x|pa) ≤ p(x|pa) ≤ u(x|pa),   Σₓ p(x|pa) = 1
/// ```
pub fn interval_to_halfspace(factor: &IntervalFactor) -> Result<HalfspaceFactor> {
    let domain = factor.domain().clone();
    let n = domain.size();
    let lower = factor.lower_data();
    let upper = factor.upper_data();
    let groups = super::group_by(&domain, factor.separating());
    let mut constraints = Vec::with_capacity(2 * n + groups.len());

    for group in groups {
        let mut total = vec![0.0; n];
        for &i in &group {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            constraints.push(LinearConstraint::geq(row.clone(), lower[i]));
            constraints.push(LinearConstraint::leq(row, upper[i]));
            total[i] = 1.0;
        }
        constraints.push(LinearConstraint::eq(total, 1.0));
    }

    HalfspaceFactor::conditional(domain, factor.separating().clone(), constraints)
}

/// Precise conditional `P(variable | rest)` as a single-table halfspace factor.
pub fn point_to_halfspace(factor: &BayesianFactor, variable: usize) -> Result<HalfspaceFactor> {
    let separating = conditioning(factor.domain(), variable)?;
    HalfspaceFactor::from_point(factor, separating)
}

/// Enumerate the vertices of a halfspace factor, per separating configuration.
///
/// A conditional polytope must be separately specified: a constraint that
/// mixes entries of different separating configurations has no vertex-factor
/// counterpart.
pub fn halfspace_to_vertex(factor: &HalfspaceFactor) -> Result<VertexFactor> {
    let domain = factor.domain().clone();
    let separating = factor.separating().clone();
    if let Some(values) = factor.point() {
        let point = BayesianFactor::new(domain, values.to_vec())?;
        return VertexFactor::from_point(&point, separating);
    }
    if separating.is_empty() {
        return VertexFactor::new(domain, separating, vec![factor.vertices()?]);
    }

    let explicit = factor.project()?;
    let groups = super::group_by(&domain, &separating);
    let mut owner = vec![0; domain.size()];
    let mut column = vec![0; domain.size()];
    for (g, group) in groups.iter().enumerate() {
        for (k, &i) in group.iter().enumerate() {
            owner[i] = g;
            column[i] = k;
        }
    }

    let mut local: Vec<Vec<LinearConstraint>> = vec![Vec::new(); groups.len()];
    for c in explicit.constraints().iter() {
        let touched: BTreeSet<usize> = c
            .coefficients
            .iter()
            .enumerate()
            .filter(|(_, a)| a.abs() > PROBABILITY_TOLERANCE)
            .map(|(i, _)| owner[i])
            .collect();
        match touched.len() {
            0 if c.is_satisfied(&vec![0.0; domain.size()], PROBABILITY_TOLERANCE) => {}
            0 => {
                return Err(PgmError::InfeasibleQuery(
                    "polytope contains an unsatisfiable constant row".to_string(),
                ))
            }
            1 => {
                let Some(&g) = touched.first() else { continue };
                let mut coefficients = vec![0.0; groups[g].len()];
                for &i in &groups[g] {
                    coefficients[column[i]] = c.coefficients[i];
                }
                local[g].push(LinearConstraint::new(coefficients, c.relation, c.value));
            }
            _ => {
                return Err(PgmError::UnsupportedOperation(
                    "constraint couples separating configurations".to_string(),
                ))
            }
        }
    }

    let solver = SimplexSolver::default();
    let sets = groups
        .iter()
        .zip(&local)
        .map(|(group, rows)| solver.vertices(group.len(), rows))
        .collect::<Result<Vec<_>>>()?;
    VertexFactor::new(domain, separating, sets)
}

/// Coordinate-wise bounds of a halfspace factor.
pub fn halfspace_to_interval(
    factor: &HalfspaceFactor,
    solver: &dyn LinearSolver,
) -> Result<IntervalFactor> {
    factor.to_interval(solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{Goal, LinearProblem};
    use approx::assert_abs_diff_eq;

    fn chain_cpt() -> BayesianFactor {
        // P(X1 | X0) with columns [.3, .7] and [.9, .1]
        BayesianFactor::new(
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
            vec![0.3, 0.9, 0.7, 0.1],
        )
        .unwrap()
    }

    #[test]
    fn test_root_interval_to_halfspace() {
        let interval = IntervalFactor::new(
            Domain::var(0, 4),
            Domain::empty(),
            vec![0.1, 0.3, 0.3, 0.1],
            vec![0.2, 0.4, 0.4, 0.2],
        )
        .unwrap();
        let h = interval_to_halfspace(&interval).unwrap();
        let problem = LinearProblem::new(
            vec![1.0, 1.0, 0.0, 0.0],
            Goal::Maximize,
            h.constraints().into_owned(),
        );
        let solution = SimplexSolver::default().solve(&problem).unwrap();
        assert_abs_diff_eq!(solution.value, 0.6, epsilon = 1e-9);
        let expected = [0.2, 0.4, 0.3, 0.1];
        for (x, e) in solution.point.iter().zip(expected) {
            assert_abs_diff_eq!(*x, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_point_to_vertex_and_interval() {
        let v = point_to_vertex(&chain_cpt(), 1).unwrap();
        assert_eq!(v.separating().variables(), &[0]);
        let i = vertex_to_interval(&v).unwrap();
        assert_eq!(i.lower_data(), i.upper_data());
        assert_eq!(point_to_interval(&chain_cpt(), 1).unwrap(), i);
        assert_eq!(point_to_vertex(&chain_cpt(), 5), Err(PgmError::NotInDomain(5)));
    }

    #[test]
    fn test_point_to_halfspace_pins_conditional() {
        let h = point_to_halfspace(&chain_cpt(), 1).unwrap();
        let root = point_to_halfspace(
            &BayesianFactor::new(Domain::var(0, 2), vec![0.4, 0.6]).unwrap(),
            0,
        )
        .unwrap();
        let joint = root.combine(&h).unwrap();
        let bounds = halfspace_to_interval(&joint, &SimplexSolver::default()).unwrap();
        // P(x0 = 1, x1 = 0) = 0.6 * 0.9
        assert_abs_diff_eq!(bounds.lower_data()[1], 0.54, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.upper_data()[1], 0.54, epsilon = 1e-9);
    }

    #[test]
    fn test_conditional_interval_halfspace() {
        let interval = IntervalFactor::new(
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
            Domain::var(0, 2),
            vec![0.2, 0.5, 0.6, 0.3],
            vec![0.4, 0.7, 0.8, 0.5],
        )
        .unwrap();
        let h = interval_to_halfspace(&interval).unwrap();
        let root = point_to_halfspace(
            &BayesianFactor::new(Domain::var(0, 2), vec![1.0, 0.0]).unwrap(),
            0,
        )
        .unwrap();
        let bounds = root
            .combine(&h)
            .unwrap()
            .to_interval(&SimplexSolver::default())
            .unwrap();
        // x0 = 0 with certainty, so P(x1 = 0) ranges over [0.2, 0.4]
        assert_abs_diff_eq!(bounds.lower_data()[0], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.upper_data()[0], 0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_halfspace_to_vertex() {
        let interval = IntervalFactor::new(
            Domain::var(2, 3),
            Domain::empty(),
            vec![0.2, 0.2, 0.2],
            vec![0.6, 0.6, 0.6],
        )
        .unwrap();
        let v = halfspace_to_vertex(&interval_to_halfspace(&interval).unwrap()).unwrap();
        // permutations of (0.6, 0.2, 0.2)
        assert_eq!(v.num_vertices(), 3);
    }

    #[test]
    fn test_conditional_halfspace_to_vertex() {
        let interval = IntervalFactor::new(
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
            Domain::var(0, 2),
            vec![0.2, 0.5, 0.6, 0.3],
            vec![0.4, 0.7, 0.8, 0.5],
        )
        .unwrap();
        let v = halfspace_to_vertex(&interval_to_halfspace(&interval).unwrap()).unwrap();
        assert_eq!(v.separating().variables(), &[0]);
        // x0 = 0: (.2, .8) and (.4, .6); x0 = 1: (.5, .5) and (.7, .3)
        let first = v.vertices(&[0]).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().any(|p| (p[0] - 0.2).abs() < 1e-9 && (p[1] - 0.8).abs() < 1e-9));
        let second = v.vertices(&[1]).unwrap();
        assert!(second.iter().any(|p| (p[0] - 0.7).abs() < 1e-9 && (p[1] - 0.3).abs() < 1e-9));
        let bounds = vertex_to_interval(&v).unwrap();
        assert_eq!(bounds.lower_data().len(), 4);
        assert_abs_diff_eq!(bounds.upper_data()[3], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_coupled_halfspace_has_no_vertex_factor() {
        let domain = Domain::new(&[0, 1], &[2, 2]).unwrap();
        let coupled = HalfspaceFactor::conditional(
            domain,
            Domain::var(0, 2),
            vec![LinearConstraint::eq(vec![1.0, 1.0, 1.0, 1.0], 2.0)],
        )
        .unwrap();
        assert!(matches!(
            halfspace_to_vertex(&coupled),
            Err(PgmError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_point_halfspace_to_vertex() {
        let v = halfspace_to_vertex(&point_to_halfspace(&chain_cpt(), 1).unwrap()).unwrap();
        assert_eq!(v, point_to_vertex(&chain_cpt(), 1).unwrap());
    }
}
