//! Linear programming boundary.
//!
//! Credal solvers talk to an LP backend only through [`LinearSolver`]:
//! a set of linear constraints over non-negative variables plus an objective
//! direction goes in, an optimal vertex or an infeasibility signal comes out.
//! [`SimplexSolver`] is the bundled dense two-phase simplex.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::error::{PgmError, Result};

/// Relation of a linear constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// a·x ≤ b
    LessOrEqual,
    /// a·x ≥ b
    GreaterOrEqual,
    /// a·x = b
    Equal,
}

impl Relation {
    /// Relation after multiplying both sides by -1.
    pub fn flipped(self) -> Self {
        match self {
            Self::LessOrEqual => Self::GreaterOrEqual,
            Self::GreaterOrEqual => Self::LessOrEqual,
            Self::Equal => Self::Equal,
        }
    }
}

/// A linear constraint `coefficients · x (relation) value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub relation: Relation,
    pub value: f64,
}

impl LinearConstraint {
    /// Create a new constraint.
    pub fn new(coefficients: Vec<f64>, relation: Relation, value: f64) -> Self {
        Self {
            coefficients,
            relation,
            value,
        }
    }

    /// `coefficients · x ≤ value`
    pub fn leq(coefficients: Vec<f64>, value: f64) -> Self {
        Self::new(coefficients, Relation::LessOrEqual, value)
    }

    /// `coefficients · x ≥ value`
    pub fn geq(coefficients: Vec<f64>, value: f64) -> Self {
        Self::new(coefficients, Relation::GreaterOrEqual, value)
    }

    /// `coefficients · x = value`
    pub fn eq(coefficients: Vec<f64>, value: f64) -> Self {
        Self::new(coefficients, Relation::Equal, value)
    }

    /// Left-hand side evaluated at a point.
    pub fn evaluate(&self, point: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(point)
            .map(|(a, x)| a * x)
            .sum()
    }

    /// Whether the point satisfies the constraint up to `tolerance`.
    pub fn is_satisfied(&self, point: &[f64], tolerance: f64) -> bool {
        let lhs = self.evaluate(point);
        match self.relation {
            Relation::LessOrEqual => lhs <= self.value + tolerance,
            Relation::GreaterOrEqual => lhs >= self.value - tolerance,
            Relation::Equal => (lhs - self.value).abs() <= tolerance,
        }
    }

    /// Loosen the constraint by an additive slack.
    ///
    /// Equalities become a pair of inequalities `value ± epsilon`; with
    /// `epsilon == 0` the constraint is returned unchanged.
    pub fn relaxed(&self, epsilon: f64) -> Vec<LinearConstraint> {
        if epsilon <= 0.0 {
            return vec![self.clone()];
        }
        match self.relation {
            Relation::LessOrEqual => vec![Self::leq(
                self.coefficients.clone(),
                self.value + epsilon,
            )],
            Relation::GreaterOrEqual => vec![Self::geq(
                self.coefficients.clone(),
                self.value - epsilon,
            )],
            Relation::Equal => vec![
                Self::leq(self.coefficients.clone(), self.value + epsilon),
                Self::geq(self.coefficients.clone(), self.value - epsilon),
            ],
        }
    }
}

/// Objective direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goal {
    Minimize,
    Maximize,
}

/// A linear program over non-negative variables.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearProblem {
    pub num_variables: usize,
    pub objective: Vec<f64>,
    pub goal: Goal,
    pub constraints: Vec<LinearConstraint>,
}

impl LinearProblem {
    /// Create a problem; the objective length fixes the number of variables.
    pub fn new(objective: Vec<f64>, goal: Goal, constraints: Vec<LinearConstraint>) -> Self {
        Self {
            num_variables: objective.len(),
            objective,
            goal,
            constraints,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.objective.len() != self.num_variables {
            return Err(PgmError::DimensionMismatch {
                expected: self.num_variables,
                got: self.objective.len(),
            });
        }
        for constraint in &self.constraints {
            if constraint.coefficients.len() != self.num_variables {
                return Err(PgmError::DimensionMismatch {
                    expected: self.num_variables,
                    got: constraint.coefficients.len(),
                });
            }
        }
        Ok(())
    }
}

/// Optimal vertex of a linear program.
#[derive(Clone, Debug, PartialEq)]
pub struct LpSolution {
    pub point: Vec<f64>,
    pub value: f64,
}

/// LP backend contract.
pub trait LinearSolver: Send + Sync {
    /// Solve the problem, returning an optimal vertex.
    ///
    /// Must return [`PgmError::InfeasibleQuery`] when no feasible point exists.
    fn solve(&self, problem: &LinearProblem) -> Result<LpSolution>;

    /// Solver name.
    fn name(&self) -> &str;
}

/// A linear-fractional program `goal (n·x) / (d·x)` over a polyhedron.
///
/// Solved through the Charnes–Cooper transformation `y = t·x`, `d·y = 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearFractionalProblem {
    pub numerator: Vec<f64>,
    pub denominator: Vec<f64>,
    pub goal: Goal,
    pub constraints: Vec<LinearConstraint>,
}

impl LinearFractionalProblem {
    /// Solve with the given backend. The returned point is in the original space.
    pub fn solve(&self, solver: &dyn LinearSolver) -> Result<LpSolution> {
        let n = self.numerator.len();
        if self.denominator.len() != n {
            return Err(PgmError::DimensionMismatch {
                expected: n,
                got: self.denominator.len(),
            });
        }

        let mut constraints = Vec::with_capacity(self.constraints.len() + 1);
        for c in &self.constraints {
            let mut coefficients = c.coefficients.clone();
            coefficients.push(-c.value);
            constraints.push(LinearConstraint::new(coefficients, c.relation, 0.0));
        }
        let mut normalizer = self.denominator.clone();
        normalizer.push(0.0);
        constraints.push(LinearConstraint::eq(normalizer, 1.0));

        let mut objective = self.numerator.clone();
        objective.push(0.0);

        let solution = solver.solve(&LinearProblem::new(objective, self.goal, constraints))?;
        let scale = solution.point[n];
        if scale <= f64::EPSILON {
            return Err(PgmError::InfeasibleQuery(
                "denominator vanishes on the feasible set".to_string(),
            ));
        }

        Ok(LpSolution {
            point: solution.point[..n].iter().map(|y| y / scale).collect(),
            value: solution.value,
        })
    }
}

/// Dense two-phase simplex with Bland's anti-cycling rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimplexSolver {
    /// Pivot and feasibility tolerance
    pub tolerance: f64,
    /// Maximum pivots per phase
    pub max_pivots: usize,
}

impl Default for SimplexSolver {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_pivots: 50_000,
        }
    }
}

impl SimplexSolver {
    /// Create with custom parameters.
    pub fn new(tolerance: f64, max_pivots: usize) -> Self {
        Self {
            tolerance,
            max_pivots,
        }
    }
}

impl SimplexSolver {
    /// Every vertex of `{x ≥ 0 : constraints}` by a breadth-first walk over
    /// adjacent feasible bases.
    ///
    /// Each visited basis yields one vertex; degenerate vertices reached
    /// through several bases are reported once. Fails with
    /// [`PgmError::InfeasibleQuery`] on an empty set, with
    /// [`PgmError::Unbounded`] when the set has a recession direction, and
    /// with [`PgmError::UnsupportedOperation`] past `max_pivots` bases.
    pub fn vertices(
        &self,
        num_variables: usize,
        constraints: &[LinearConstraint],
    ) -> Result<Vec<Vec<f64>>> {
        LinearProblem::new(vec![0.0; num_variables], Goal::Minimize, constraints.to_vec())
            .validate()?;
        let tol = self.tolerance;
        let (start, art_start) = self.feasible_tableau(num_variables, constraints)?;

        let mut seen: BTreeSet<Vec<usize>> = BTreeSet::new();
        seen.insert(start.basis_key());
        let mut queue = VecDeque::from([start]);
        let mut found: Vec<Vec<f64>> = Vec::new();

        while let Some(tableau) = queue.pop_front() {
            let point = tableau.solution(num_variables);
            if !found
                .iter()
                .any(|v| v.iter().zip(&point).all(|(a, b)| (a - b).abs() <= 1e-7))
            {
                found.push(point);
            }

            for col in (0..art_start).filter(|j| !tableau.basis.contains(j)) {
                let ratios: Vec<(usize, f64)> = (0..tableau.rows.len())
                    .filter(|&i| tableau.rows[i][col] > tol)
                    .map(|i| (i, tableau.rhs(i).max(0.0) / tableau.rows[i][col]))
                    .collect();
                let Some(best) = ratios.iter().map(|&(_, r)| r).reduce(f64::min) else {
                    return Err(PgmError::Unbounded(format!(
                        "column {} is a recession direction of the polyhedron",
                        col
                    )));
                };
                for &(row, ratio) in &ratios {
                    if ratio > best + tol {
                        continue;
                    }
                    let mut next = tableau.clone();
                    next.pivot(row, col);
                    if seen.insert(next.basis_key()) {
                        if seen.len() > self.max_pivots {
                            return Err(PgmError::UnsupportedOperation(format!(
                                "vertex enumeration exceeded {} bases",
                                self.max_pivots
                            )));
                        }
                        queue.push_back(next);
                    }
                }
            }
        }

        tracing::trace!(
            variables = num_variables,
            bases = seen.len(),
            vertices = found.len(),
            "vertex enumeration finished"
        );
        Ok(found)
    }

    /// Phase one: a feasible basis over the structural and slack columns.
    ///
    /// Returns the tableau and the index of the first artificial column.
    fn feasible_tableau(
        &self,
        n: usize,
        constraints: &[LinearConstraint],
    ) -> Result<(Tableau, usize)> {
        let tol = self.tolerance;
        let num_slack = constraints
            .iter()
            .filter(|c| c.relation != Relation::Equal)
            .count();
        let art_start = n + num_slack;

        // Rows are normalized to a non-negative right-hand side first.
        let mut tableau = Tableau::default();
        let mut slack = n;
        let mut artificials = 0;
        let normalized: Vec<(Vec<f64>, Relation, f64)> = constraints
            .iter()
            .map(|c| {
                if c.value < 0.0 {
                    (
                        c.coefficients.iter().map(|a| -a).collect(),
                        c.relation.flipped(),
                        -c.value,
                    )
                } else {
                    (c.coefficients.clone(), c.relation, c.value)
                }
            })
            .collect();
        let num_art = normalized
            .iter()
            .filter(|(_, rel, _)| *rel != Relation::LessOrEqual)
            .count();
        tableau.width = art_start + num_art;

        for (coefficients, relation, value) in normalized {
            let mut row = vec![0.0; tableau.width + 1];
            row[..n].copy_from_slice(&coefficients);
            row[tableau.width] = value;
            let basic = match relation {
                Relation::LessOrEqual => {
                    row[slack] = 1.0;
                    slack += 1;
                    slack - 1
                }
                Relation::GreaterOrEqual => {
                    row[slack] = -1.0;
                    slack += 1;
                    row[art_start + artificials] = 1.0;
                    artificials += 1;
                    art_start + artificials - 1
                }
                Relation::Equal => {
                    row[art_start + artificials] = 1.0;
                    artificials += 1;
                    art_start + artificials - 1
                }
            };
            tableau.rows.push(row);
            tableau.basis.push(basic);
        }

        if num_art > 0 {
            let cost: Vec<f64> = (0..tableau.width)
                .map(|j| if j >= art_start { 1.0 } else { 0.0 })
                .collect();
            tableau.minimize(&cost, |_| true, tol, self.max_pivots)?;
            let infeasibility = tableau.objective_value(&cost);
            if infeasibility > tol.max(1e-7) {
                tracing::debug!(infeasibility, "simplex phase one found no feasible point");
                return Err(PgmError::InfeasibleQuery(format!(
                    "no point satisfies the {} constraints (residual {:.3e})",
                    constraints.len(),
                    infeasibility
                )));
            }
            tableau.drive_out_artificials(art_start, tol);
        }
        Ok((tableau, art_start))
    }
}

impl LinearSolver for SimplexSolver {
    fn solve(&self, problem: &LinearProblem) -> Result<LpSolution> {
        problem.validate()?;
        let n = problem.num_variables;
        let (mut tableau, art_start) = self.feasible_tableau(n, &problem.constraints)?;

        let mut cost = vec![0.0; tableau.width];
        for (j, &c) in problem.objective.iter().enumerate() {
            cost[j] = match problem.goal {
                Goal::Minimize => c,
                Goal::Maximize => -c,
            };
        }
        tableau.minimize(&cost, |j| j < art_start, self.tolerance, self.max_pivots)?;

        let point = tableau.solution(n);
        let value = problem
            .objective
            .iter()
            .zip(&point)
            .map(|(c, x)| c * x)
            .sum();

        tracing::trace!(
            variables = n,
            constraints = problem.constraints.len(),
            value,
            "simplex solved"
        );
        Ok(LpSolution { point, value })
    }

    fn name(&self) -> &str {
        "Simplex"
    }
}

/// Dense simplex tableau; the last entry of each row is the right-hand side.
#[derive(Clone, Debug, Default)]
struct Tableau {
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    width: usize,
}

impl Tableau {
    fn basis_key(&self) -> Vec<usize> {
        let mut key = self.basis.clone();
        key.sort_unstable();
        key
    }

    fn rhs(&self, row: usize) -> f64 {
        self.rows[row][self.width]
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let p = self.rows[row][col];
        for v in self.rows[row].iter_mut() {
            *v /= p;
        }
        let pivot_row = self.rows[row].clone();
        for (i, other) in self.rows.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = other[col];
            if factor != 0.0 {
                for (v, pv) in other.iter_mut().zip(&pivot_row) {
                    *v -= factor * pv;
                }
            }
        }
        self.basis[row] = col;
    }

    fn reduced_cost(&self, cost: &[f64], col: usize) -> f64 {
        cost[col]
            - self
                .basis
                .iter()
                .zip(&self.rows)
                .map(|(&b, row)| cost[b] * row[col])
                .sum::<f64>()
    }

    fn objective_value(&self, cost: &[f64]) -> f64 {
        self.basis
            .iter()
            .enumerate()
            .map(|(i, &b)| cost[b] * self.rhs(i))
            .sum()
    }

    fn minimize(
        &mut self,
        cost: &[f64],
        allowed: impl Fn(usize) -> bool,
        tol: f64,
        max_pivots: usize,
    ) -> Result<()> {
        for _ in 0..max_pivots {
            let entering = (0..self.width)
                .filter(|&j| allowed(j) && !self.basis.contains(&j))
                .find(|&j| self.reduced_cost(cost, j) < -tol);
            let Some(col) = entering else {
                return Ok(());
            };

            let mut leaving: Option<(usize, f64)> = None;
            for i in 0..self.rows.len() {
                let a = self.rows[i][col];
                if a <= tol {
                    continue;
                }
                let ratio = self.rhs(i).max(0.0) / a;
                leaving = match leaving {
                    None => Some((i, ratio)),
                    Some((r, best)) => {
                        if ratio < best - tol
                            || (ratio <= best + tol && self.basis[i] < self.basis[r])
                        {
                            Some((i, ratio))
                        } else {
                            Some((r, best))
                        }
                    }
                };
            }

            let Some((row, _)) = leaving else {
                return Err(PgmError::Unbounded(format!(
                    "column {} can grow without limit",
                    col
                )));
            };
            self.pivot(row, col);
        }

        Err(PgmError::UnsupportedOperation(format!(
            "simplex exceeded {} pivots",
            max_pivots
        )))
    }

    /// Replace basic artificials after phase one; rows with no structural
    /// entry are linearly dependent and dropped.
    fn drive_out_artificials(&mut self, art_start: usize, tol: f64) {
        let mut i = 0;
        while i < self.rows.len() {
            if self.basis[i] < art_start {
                i += 1;
                continue;
            }
            match (0..art_start).find(|&j| self.rows[i][j].abs() > tol) {
                Some(col) => {
                    self.pivot(i, col);
                    i += 1;
                }
                None => {
                    self.rows.remove(i);
                    self.basis.remove(i);
                }
            }
        }
    }

    fn solution(&self, n: usize) -> Vec<f64> {
        let mut x = vec![0.0; n];
        for (i, &b) in self.basis.iter().enumerate() {
            if b < n {
                x[b] = self.rhs(i).max(0.0);
            }
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_maximize_simple() {
        // max 3x + 2y s.t. x + y ≤ 4, x + 3y ≤ 6, x ≤ 3
        let problem = LinearProblem::new(
            vec![3.0, 2.0],
            Goal::Maximize,
            vec![
                LinearConstraint::leq(vec![1.0, 1.0], 4.0),
                LinearConstraint::leq(vec![1.0, 3.0], 6.0),
                LinearConstraint::leq(vec![1.0, 0.0], 3.0),
            ],
        );
        let solution = SimplexSolver::default().solve(&problem).unwrap();
        assert_abs_diff_eq!(solution.value, 11.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.point[0], 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.point[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_equality_and_geq() {
        // min x0 s.t. x0 + x1 = 1, x0 ≥ 0.25
        let problem = LinearProblem::new(
            vec![1.0, 0.0],
            Goal::Minimize,
            vec![
                LinearConstraint::eq(vec![1.0, 1.0], 1.0),
                LinearConstraint::geq(vec![1.0, 0.0], 0.25),
            ],
        );
        let solution = SimplexSolver::default().solve(&problem).unwrap();
        assert_abs_diff_eq!(solution.value, 0.25, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.point[1], 0.75, epsilon = 1e-9);
    }

    #[test]
    fn test_infeasible() {
        let problem = LinearProblem::new(
            vec![1.0],
            Goal::Minimize,
            vec![
                LinearConstraint::geq(vec![1.0], 2.0),
                LinearConstraint::leq(vec![1.0], 1.0),
            ],
        );
        let err = SimplexSolver::default().solve(&problem).unwrap_err();
        assert!(matches!(err, PgmError::InfeasibleQuery(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unbounded() {
        let problem = LinearProblem::new(
            vec![1.0],
            Goal::Maximize,
            vec![LinearConstraint::geq(vec![1.0], 1.0)],
        );
        let err = SimplexSolver::default().solve(&problem).unwrap_err();
        assert!(matches!(err, PgmError::Unbounded(_)));
    }

    #[test]
    fn test_redundant_equalities() {
        let problem = LinearProblem::new(
            vec![0.0, 1.0],
            Goal::Maximize,
            vec![
                LinearConstraint::eq(vec![1.0, 1.0], 1.0),
                LinearConstraint::eq(vec![2.0, 2.0], 2.0),
                LinearConstraint::leq(vec![0.0, 1.0], 0.4),
            ],
        );
        let solution = SimplexSolver::default().solve(&problem).unwrap();
        assert_abs_diff_eq!(solution.value, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_linear_fractional() {
        // max x0 / (x0 + x1) with x0 ∈ [0.1, 0.2], x1 ∈ [0.3, 0.5]
        let problem = LinearFractionalProblem {
            numerator: vec![1.0, 0.0],
            denominator: vec![1.0, 1.0],
            goal: Goal::Maximize,
            constraints: vec![
                LinearConstraint::geq(vec![1.0, 0.0], 0.1),
                LinearConstraint::leq(vec![1.0, 0.0], 0.2),
                LinearConstraint::geq(vec![0.0, 1.0], 0.3),
                LinearConstraint::leq(vec![0.0, 1.0], 0.5),
            ],
        };
        let solution = problem.solve(&SimplexSolver::default()).unwrap();
        assert_abs_diff_eq!(solution.value, 0.2 / 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.point[0], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.point[1], 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_relaxed_constraint() {
        let c = LinearConstraint::eq(vec![1.0, 1.0], 1.0);
        assert_eq!(c.relaxed(0.0), vec![c.clone()]);
        let relaxed = c.relaxed(1e-3);
        assert_eq!(relaxed.len(), 2);
        assert!(relaxed.iter().all(|r| r.is_satisfied(&[0.5, 0.5005], 0.0)));
    }

    #[test]
    fn test_vertices_of_square() {
        let constraints = vec![
            LinearConstraint::leq(vec![1.0, 0.0], 1.0),
            LinearConstraint::leq(vec![0.0, 1.0], 1.0),
        ];
        let mut vertices = SimplexSolver::default().vertices(2, &constraints).unwrap();
        vertices.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
        assert_eq!(
            vertices,
            vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]]
        );
    }

    #[test]
    fn test_vertices_of_degenerate_simplex() {
        // the apex (0, 0, 1) is shared by several bases
        let constraints = vec![
            LinearConstraint::eq(vec![1.0, 1.0, 1.0], 1.0),
            LinearConstraint::leq(vec![1.0, -1.0, 0.0], 0.0),
            LinearConstraint::leq(vec![-1.0, 1.0, 0.0], 0.0),
        ];
        let vertices = SimplexSolver::default().vertices(3, &constraints).unwrap();
        assert_eq!(vertices.len(), 2);
        assert!(vertices
            .iter()
            .any(|v| (v[2] - 1.0).abs() < 1e-9 && v[0].abs() < 1e-9));
        assert!(vertices
            .iter()
            .any(|v| (v[0] - 0.5).abs() < 1e-9 && (v[1] - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_vertices_of_unbounded_set() {
        let constraints = vec![LinearConstraint::leq(vec![1.0, -1.0], 1.0)];
        let result = SimplexSolver::default().vertices(2, &constraints);
        assert!(matches!(result, Err(PgmError::Unbounded(_))));
    }

    #[test]
    fn test_vertices_of_empty_set() {
        let constraints = vec![
            LinearConstraint::geq(vec![1.0], 2.0),
            LinearConstraint::leq(vec![1.0], 1.0),
        ];
        let result = SimplexSolver::default().vertices(1, &constraints);
        assert!(matches!(result, Err(PgmError::InfeasibleQuery(_))));
    }
}
