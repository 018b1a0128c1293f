//! Halfspace (H-representation) credal factors.
//!
//! A halfspace factor is a polytope of non-negative tables over the joint
//! states of its domain, described by linear constraints. Constraints may
//! also mention auxiliary columns that are existentially quantified:
//!
//! ```text
//! P = { y ∈ ℝⁿ₊ : ∃ z ∈ ℝᵐ₊,  A·[y; z] (≤ | ≥ | =) b }
//! ```
//!
//! Like the other credal kinds the factor is a set of tables, and `combine`
//! is the pointwise product `y(u) = p(u_A) · q(u_B)`. The product is exact
//! when either side is a single table; two genuine polytopes combine through
//! the McCormick envelope of every product term. Marginalization and
//! filtering demote the old columns to auxiliaries, and
//! [`HalfspaceFactor::project`] eliminates auxiliaries by Fourier–Motzkin
//! when an explicit form is needed.
//!
//! Precise tables are stored as a point and never materialize constraints
//! until asked to.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::vertex::prune_set;
use super::{check_state, check_subdomain, BayesianFactor, FactorOps, IntervalFactor, PointMass};
use crate::domain::Domain;
use crate::error::{PgmError, Result};
use crate::lp::{Goal, LinearConstraint, LinearProblem, LinearSolver, Relation, SimplexSolver};

const TOLERANCE: f64 = 1e-9;

/// Rows beyond this multiple of the column count trigger LP redundancy removal.
const REDUNDANCY_FACTOR: usize = 4;

/// Credal factor in halfspace representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HalfspaceFactor {
    domain: Domain,
    separating: Domain,
    auxiliary: usize,
    constraints: Vec<LinearConstraint>,
    point: Option<Vec<f64>>,
}

impl HalfspaceFactor {
    /// Create from constraints over the joint states of `domain` (non-negativity is implicit).
    pub fn new(domain: Domain, constraints: Vec<LinearConstraint>) -> Result<Self> {
        Self::with_auxiliary(domain, 0, constraints)
    }

    /// Create with `auxiliary` extra columns following the domain columns.
    pub fn with_auxiliary(
        domain: Domain,
        auxiliary: usize,
        constraints: Vec<LinearConstraint>,
    ) -> Result<Self> {
        let columns = domain.size() + auxiliary;
        for c in &constraints {
            if c.coefficients.len() != columns {
                return Err(PgmError::DimensionMismatch {
                    expected: columns,
                    got: c.coefficients.len(),
                });
            }
        }
        Ok(Self {
            domain,
            separating: Domain::empty(),
            auxiliary,
            constraints,
            point: None,
        })
    }

    /// A conditional polytope: the tables hold `P(data | separating)` per
    /// separating configuration.
    pub fn conditional(
        domain: Domain,
        separating: Domain,
        constraints: Vec<LinearConstraint>,
    ) -> Result<Self> {
        check_subdomain(&domain, &separating)?;
        let mut factor = Self::new(domain, constraints)?;
        factor.separating = separating;
        Ok(factor)
    }

    /// The single table of a point factor.
    pub fn from_point(factor: &BayesianFactor, separating: Domain) -> Result<Self> {
        check_subdomain(factor.domain(), &separating)?;
        Ok(Self {
            domain: factor.domain().clone(),
            separating,
            auxiliary: 0,
            constraints: Vec::new(),
            point: Some(factor.data()),
        })
    }

    fn from_table(domain: Domain, separating: Domain, table: Vec<f64>) -> Self {
        Self {
            domain,
            separating,
            auxiliary: 0,
            constraints: Vec::new(),
            point: Some(table),
        }
    }

    /// Conditioning variables.
    pub fn separating(&self) -> &Domain {
        &self.separating
    }

    /// Variables the tables range over.
    pub fn data_domain(&self) -> Domain {
        self.domain.subtract(&self.separating)
    }

    /// The table when the set holds exactly one.
    pub fn point(&self) -> Option<&[f64]> {
        self.point.as_deref()
    }

    /// Constraint rows over `[domain columns | auxiliary columns]`.
    ///
    /// A point factor reports one equality per joint state.
    pub fn constraints(&self) -> Cow<'_, [LinearConstraint]> {
        match &self.point {
            None => Cow::Borrowed(&self.constraints),
            Some(values) => {
                let n = values.len();
                Cow::Owned(
                    values
                        .iter()
                        .enumerate()
                        .map(|(i, &v)| {
                            let mut row = vec![0.0; n];
                            row[i] = 1.0;
                            LinearConstraint::eq(row, v)
                        })
                        .collect(),
                )
            }
        }
    }

    /// Number of auxiliary columns.
    pub fn auxiliary(&self) -> usize {
        self.auxiliary
    }

    /// Total number of LP columns.
    pub fn columns(&self) -> usize {
        self.domain.size() + self.auxiliary
    }

    /// `min/max yᵢ` for every domain column.
    pub fn column_bounds(&self, solver: &dyn LinearSolver) -> Result<(Vec<f64>, Vec<f64>)> {
        if let Some(values) = &self.point {
            return Ok((values.clone(), values.clone()));
        }
        let n = self.domain.size();
        let mut lower = Vec::with_capacity(n);
        let mut upper = Vec::with_capacity(n);
        for i in 0..n {
            let mut objective = vec![0.0; self.columns()];
            objective[i] = 1.0;
            let min = solver.solve(&LinearProblem::new(
                objective.clone(),
                Goal::Minimize,
                self.constraints.clone(),
            ))?;
            let max = solver.solve(&LinearProblem::new(
                objective,
                Goal::Maximize,
                self.constraints.clone(),
            ))?;
            lower.push(min.value);
            upper.push(max.value);
        }
        Ok((lower, upper))
    }

    /// Coordinate-wise bounds `min/max yᵢ` over the polytope.
    pub fn to_interval(&self, solver: &dyn LinearSolver) -> Result<IntervalFactor> {
        let (lower, upper) = self.column_bounds(solver)?;
        IntervalFactor::new(
            self.domain.clone(),
            self.separating.clone(),
            lower.into_iter().map(|v| v.clamp(0.0, 1.0)).collect(),
            upper.into_iter().map(|v| v.clamp(0.0, 1.0)).collect(),
        )
    }

    /// Eliminate auxiliary columns, yielding constraints over the domain columns only.
    pub fn project(&self) -> Result<Self> {
        if self.point.is_some() || self.auxiliary == 0 {
            return Ok(self.clone());
        }
        let n = self.domain.size();
        let mut rows: Vec<Row> = self.constraints.iter().map(Row::from).collect();
        let mut columns = self.columns();
        for j in n..columns {
            let mut coefficients = vec![0.0; columns];
            coefficients[j] = 1.0;
            rows.push(Row {
                coefficients,
                relation: Relation::GreaterOrEqual,
                value: 0.0,
            });
        }

        let solver = SimplexSolver::default();
        while columns > n {
            let column = pick_column(&rows, n, columns);
            rows = eliminate(rows, column);
            for row in &mut rows {
                row.coefficients.remove(column);
            }
            columns -= 1;
            rows = simplify(rows);
            if rows.len() > REDUNDANCY_FACTOR * columns.max(1) {
                rows = remove_redundant(rows, &solver)?;
            }
            tracing::trace!(columns, rows = rows.len(), "eliminated auxiliary column");
        }

        let constraints = rows.into_iter().map(LinearConstraint::from).collect();
        let mut projected = Self::new(self.domain.clone(), constraints)?;
        projected.separating = self.separating.clone();
        Ok(projected)
    }

    /// Extreme points of the (bounded) polytope over the domain columns.
    ///
    /// Vertices are found by walking adjacent feasible bases, so the cost
    /// follows the number of bases of the polytope rather than the number of
    /// ways to pick active rows. With auxiliary columns the lifted vertices
    /// are projected and the points that fall inside the hull are dropped.
    pub fn vertices(&self) -> Result<Vec<Vec<f64>>> {
        if let Some(values) = &self.point {
            return Ok(vec![values.clone()]);
        }
        let n = self.domain.size();
        let solver = SimplexSolver::default();
        let lifted = solver.vertices(self.columns(), &self.constraints)?;

        let mut found: Vec<Vec<f64>> = Vec::with_capacity(lifted.len());
        for vertex in lifted {
            let point = vertex[..n].to_vec();
            if !found
                .iter()
                .any(|v| v.iter().zip(&point).all(|(a, b)| (a - b).abs() <= 1e-7))
            {
                found.push(point);
            }
        }
        if self.auxiliary > 0 {
            prune_set(&mut found, &solver)?;
        }
        Ok(found)
    }

    /// Columns `[y (n) | own columns]` with `y(u) = scale(u) · own(map(u))`.
    fn scaled(&self, domain: Domain, separating: Domain, map: &[usize], scale: &[f64]) -> Self {
        let n = domain.size();
        let own = self.columns();
        let columns = n + own;
        let mut constraints: Vec<LinearConstraint> = self
            .constraints
            .iter()
            .map(|c| shifted(c, n, columns))
            .collect();
        for (u, (&j, &s)) in map.iter().zip(scale).enumerate() {
            let mut row = vec![0.0; columns];
            row[u] = 1.0;
            row[n + j] -= s;
            constraints.push(LinearConstraint::eq(row, 0.0));
        }
        Self {
            domain,
            separating,
            auxiliary: own,
            constraints,
            point: None,
        }
    }

    /// McCormick envelope of `y(u) = p(map_a(u)) · q(map_b(u))` over the
    /// coordinate bounds of both polytopes.
    fn envelope(
        &self,
        other: &Self,
        domain: Domain,
        separating: Domain,
        map_a: &[usize],
        map_b: &[usize],
    ) -> Result<Self> {
        let solver = SimplexSolver::default();
        let (la, ua) = self.column_bounds(&solver)?;
        let (lb, ub) = other.column_bounds(&solver)?;

        let n = domain.size();
        let (ca, cb) = (self.columns(), other.columns());
        let columns = n + ca + cb;
        let mut constraints: Vec<LinearConstraint> = self
            .constraints
            .iter()
            .map(|c| shifted(c, n, columns))
            .chain(other.constraints.iter().map(|c| shifted(c, n + ca, columns)))
            .collect();

        for (u, (&i, &j)) in map_a.iter().zip(map_b).enumerate() {
            let term = |kp: f64, kq: f64| {
                let mut row = vec![0.0; columns];
                row[u] = 1.0;
                row[n + i] -= kp;
                row[n + ca + j] -= kq;
                row
            };
            constraints.push(LinearConstraint::geq(term(lb[j], la[i]), -la[i] * lb[j]));
            constraints.push(LinearConstraint::geq(term(ub[j], ua[i]), -ua[i] * ub[j]));
            constraints.push(LinearConstraint::leq(term(ub[j], la[i]), -la[i] * ub[j]));
            constraints.push(LinearConstraint::leq(term(lb[j], ua[i]), -ua[i] * lb[j]));
        }

        Ok(Self {
            domain,
            separating,
            auxiliary: ca + cb,
            constraints,
            point: None,
        })
    }
}

fn shifted(c: &LinearConstraint, offset: usize, columns: usize) -> LinearConstraint {
    let mut coefficients = vec![0.0; columns];
    coefficients[offset..offset + c.coefficients.len()].copy_from_slice(&c.coefficients);
    LinearConstraint::new(coefficients, c.relation, c.value)
}

impl FactorOps for HalfspaceFactor {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Pointwise product of the two sets of tables.
    fn combine(&self, other: &Self) -> Result<Self> {
        let domain = self.domain.union(&other.domain)?;
        let data = self.data_domain().union(&other.data_domain())?;
        let separating = self.separating.union(&other.separating)?.subtract(&data);
        let map_a = domain.offset_map(&self.domain);
        let map_b = domain.offset_map(&other.domain);

        Ok(match (&self.point, &other.point) {
            (Some(p), Some(q)) => {
                let table = map_a.iter().zip(&map_b).map(|(&i, &j)| p[i] * q[j]).collect();
                Self::from_table(domain, separating, table)
            }
            (None, Some(q)) => {
                let scale: Vec<f64> = map_b.iter().map(|&j| q[j]).collect();
                self.scaled(domain, separating, &map_a, &scale)
            }
            (Some(p), None) => {
                let scale: Vec<f64> = map_a.iter().map(|&i| p[i]).collect();
                other.scaled(domain, separating, &map_b, &scale)
            }
            (None, None) => self.envelope(other, domain, separating, &map_a, &map_b)?,
        })
    }

    /// New columns `m(r) = Σᵥ y(r, v)`; the old columns become auxiliary.
    fn marginalize(&self, variable: usize) -> Result<Self> {
        if !self.domain.contains(variable) {
            return Err(PgmError::NotInDomain(variable));
        }
        let domain = self.domain.remove(variable);
        let separating = self.separating.remove(variable);
        if let Some(values) = &self.point {
            let summed = BayesianFactor::new(self.domain.clone(), values.clone())?
                .marginalize(variable)?;
            return Ok(Self::from_table(domain, separating, summed.data()));
        }

        let (m, n) = (domain.size(), self.domain.size());
        let columns = m + self.columns();
        let collapse = self.domain.offset_map(&domain);

        let mut constraints: Vec<LinearConstraint> = self
            .constraints
            .iter()
            .map(|c| shifted(c, m, columns))
            .collect();

        for r in 0..m {
            let mut coefficients = vec![0.0; columns];
            coefficients[r] = 1.0;
            for (i, &target) in collapse.iter().enumerate() {
                if target == r {
                    coefficients[m + i] = -1.0;
                }
            }
            constraints.push(LinearConstraint::eq(coefficients, 0.0));
        }

        Ok(Self {
            domain,
            separating,
            auxiliary: n + self.auxiliary,
            constraints,
            point: None,
        })
    }

    /// The slice `y(·, v = s)` becomes the new domain columns; the rest become auxiliary.
    fn filter(&self, variable: usize, state: usize) -> Result<Self> {
        check_state(&self.domain, variable, state)?;
        let domain = self.domain.remove(variable);
        let separating = self.separating.remove(variable);
        if let Some(values) = &self.point {
            let slice = BayesianFactor::new(self.domain.clone(), values.clone())?
                .filter(variable, state)?;
            return Ok(Self::from_table(domain, separating, slice.data()));
        }

        let pos = self
            .domain
            .position(variable)
            .ok_or(PgmError::NotInDomain(variable))?;
        let stride = self.domain.strides()[pos];
        let card = self.domain.cardinalities()[pos];
        let n = self.domain.size();

        let (kept, rest): (Vec<usize>, Vec<usize>) =
            (0..n).partition(|i| (i / stride) % card == state);
        let order: Vec<usize> = kept
            .into_iter()
            .chain(rest)
            .chain(n..self.columns())
            .collect();

        let constraints = self
            .constraints
            .iter()
            .map(|c| {
                LinearConstraint::new(
                    order.iter().map(|&j| c.coefficients[j]).collect(),
                    c.relation,
                    c.value,
                )
            })
            .collect();

        Ok(Self {
            auxiliary: self.columns() - domain.size(),
            domain,
            separating,
            constraints,
            point: None,
        })
    }

    /// Normalization of a set of tables is a linear-fractional query; it is
    /// applied when the query's program is solved, so the set stays as it is.
    fn normalize(&self) -> Result<Self> {
        Ok(self.clone())
    }

    /// Empty polytope, or no table in it with positive mass.
    fn is_degenerate(&self) -> bool {
        if let Some(values) = &self.point {
            return values.iter().all(|&v| v <= 0.0);
        }
        let mut objective = vec![1.0; self.domain.size()];
        objective.resize(self.columns(), 0.0);
        let problem = LinearProblem::new(objective, Goal::Maximize, self.constraints.clone());
        match SimplexSolver::default().solve(&problem) {
            Ok(solution) => solution.value <= TOLERANCE,
            Err(PgmError::InfeasibleQuery(_)) => true,
            Err(_) => false,
        }
    }

    fn unit() -> Self {
        Self::from_table(Domain::empty(), Domain::empty(), vec![1.0])
    }
}

impl PointMass for HalfspaceFactor {
    fn point_mass(variable: usize, cardinality: usize, state: usize) -> Result<Self> {
        let values = super::one_hot(cardinality, state, variable)?;
        Ok(Self::from_table(
            Domain::var(variable, cardinality),
            Domain::empty(),
            values,
        ))
    }
}

/// Working row for Fourier–Motzkin elimination.
#[derive(Clone, Debug)]
struct Row {
    coefficients: Vec<f64>,
    relation: Relation,
    value: f64,
}

impl From<&LinearConstraint> for Row {
    fn from(c: &LinearConstraint) -> Self {
        Self {
            coefficients: c.coefficients.clone(),
            relation: c.relation,
            value: c.value,
        }
    }
}

impl From<Row> for LinearConstraint {
    fn from(row: Row) -> Self {
        LinearConstraint::new(row.coefficients, row.relation, row.value)
    }
}

impl Row {
    /// Same halfspace written as `a·x ≤ b` (equalities are left alone).
    fn as_leq(mut self) -> Self {
        if self.relation == Relation::GreaterOrEqual {
            for a in &mut self.coefficients {
                *a = -*a;
            }
            self.value = -self.value;
            self.relation = Relation::LessOrEqual;
        }
        self
    }

    fn axpy(&self, scale: f64, other: &Row, other_scale: f64) -> Row {
        Row {
            coefficients: self
                .coefficients
                .iter()
                .zip(&other.coefficients)
                .map(|(a, b)| scale * a + other_scale * b)
                .collect(),
            relation: self.relation,
            value: scale * self.value + other_scale * other.value,
        }
    }
}

/// Prefer a column with an equality pivot, otherwise the smallest FM product.
fn pick_column(rows: &[Row], first: usize, end: usize) -> usize {
    let with_pivot = (first..end).find(|&c| {
        rows.iter()
            .any(|r| r.relation == Relation::Equal && r.coefficients[c].abs() > TOLERANCE)
    });
    if let Some(c) = with_pivot {
        return c;
    }
    (first..end)
        .min_by_key(|&c| {
            let pos = rows.iter().filter(|r| r.coefficients[c] > TOLERANCE).count();
            let neg = rows.iter().filter(|r| r.coefficients[c] < -TOLERANCE).count();
            pos * neg
        })
        .unwrap_or(first)
}

fn eliminate(rows: Vec<Row>, column: usize) -> Vec<Row> {
    // Gaussian substitution through an equality.
    if let Some(p) = rows
        .iter()
        .position(|r| r.relation == Relation::Equal && r.coefficients[column].abs() > TOLERANCE)
    {
        let pivot = rows[p].clone();
        let a = pivot.coefficients[column];
        return rows
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != p)
            .map(|(_, row)| {
                let c = row.coefficients[column];
                if c.abs() > 0.0 {
                    row.axpy(1.0, &pivot, -c / a)
                } else {
                    row
                }
            })
            .collect();
    }

    let mut keep = Vec::new();
    let mut pos = Vec::new();
    let mut neg = Vec::new();
    for row in rows.into_iter().map(Row::as_leq) {
        let c = row.coefficients[column];
        if c > TOLERANCE {
            pos.push(row);
        } else if c < -TOLERANCE {
            neg.push(row);
        } else {
            keep.push(row);
        }
    }
    for p in &pos {
        for q in &neg {
            let combined = p.axpy(-q.coefficients[column], q, p.coefficients[column]);
            keep.push(combined);
        }
    }
    keep
}

/// Scale rows, drop trivial ones and keep the tightest of parallel rows.
fn simplify(rows: Vec<Row>) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());
    for row in rows {
        let mut row = if row.relation == Relation::Equal {
            row
        } else {
            row.as_leq()
        };
        let scale = row
            .coefficients
            .iter()
            .fold(0.0f64, |m, a| m.max(a.abs()));
        if scale <= TOLERANCE {
            let trivial = match row.relation {
                Relation::Equal => row.value.abs() <= TOLERANCE,
                _ => row.value >= -TOLERANCE,
            };
            // An infeasible `0 ≤ -1` row is kept so emptiness survives projection.
            if trivial {
                continue;
            }
            row.coefficients.iter_mut().for_each(|a| *a = 0.0);
            out.push(row);
            continue;
        }
        for a in &mut row.coefficients {
            *a /= scale;
        }
        row.value /= scale;

        // Implied by non-negativity of every column.
        if row.relation == Relation::LessOrEqual
            && row.value >= -TOLERANCE
            && row.coefficients.iter().all(|&a| a <= TOLERANCE)
        {
            continue;
        }

        let parallel = out.iter_mut().find(|r| {
            r.relation == row.relation
                && r.coefficients
                    .iter()
                    .zip(&row.coefficients)
                    .all(|(a, b)| (a - b).abs() <= TOLERANCE)
        });
        match parallel {
            Some(existing) if row.relation == Relation::LessOrEqual => {
                existing.value = existing.value.min(row.value);
            }
            Some(existing) if (existing.value - row.value).abs() <= TOLERANCE => {}
            _ => out.push(row),
        }
    }
    out
}

/// Drop inequality rows implied by the others.
fn remove_redundant(rows: Vec<Row>, solver: &dyn LinearSolver) -> Result<Vec<Row>> {
    let mut rows = rows;
    let mut i = 0;
    while i < rows.len() {
        if rows[i].relation != Relation::LessOrEqual {
            i += 1;
            continue;
        }
        let others: Vec<LinearConstraint> = rows
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, r)| LinearConstraint::from(r.clone()))
            .collect();
        let problem = LinearProblem::new(rows[i].coefficients.clone(), Goal::Maximize, others);
        let redundant = match solver.solve(&problem) {
            Ok(solution) => solution.value <= rows[i].value + TOLERANCE,
            Err(PgmError::Unbounded(_)) => false,
            Err(e) => return Err(e),
        };
        if redundant {
            rows.remove(i);
        } else {
            i += 1;
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// `l ≤ y ≤ u, Σ y = 1`
    fn boxed(domain: Domain, lower: &[f64], upper: &[f64]) -> HalfspaceFactor {
        let n = domain.size();
        let mut constraints = Vec::new();
        for i in 0..n {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            constraints.push(LinearConstraint::geq(row.clone(), lower[i]));
            constraints.push(LinearConstraint::leq(row, upper[i]));
        }
        constraints.push(LinearConstraint::eq(vec![1.0; n], 1.0));
        HalfspaceFactor::new(domain, constraints).unwrap()
    }

    fn precise(domain: Domain, values: Vec<f64>) -> HalfspaceFactor {
        HalfspaceFactor::from_point(&BayesianFactor::new(domain, values).unwrap(), Domain::empty())
            .unwrap()
    }

    #[test]
    fn test_vertices_of_box() {
        let f = boxed(Domain::var(0, 2), &[0.2, 0.3], &[0.7, 0.8]);
        let mut vertices = f.vertices().unwrap();
        vertices.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(vertices.len(), 2);
        assert_abs_diff_eq!(vertices[0][0], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(vertices[1][0], 0.7, epsilon = 1e-9);
    }

    #[test]
    fn test_vertices_of_large_simplex() {
        // the 256-state probability simplex has 256 vertices and a single
        // equality row, far out of reach for subset-of-rows enumeration
        let n = 256;
        let f = HalfspaceFactor::new(
            Domain::var(0, n),
            vec![LinearConstraint::eq(vec![1.0; n], 1.0)],
        )
        .unwrap();
        let vertices = f.vertices().unwrap();
        assert_eq!(vertices.len(), n);
        assert!(vertices
            .iter()
            .all(|v| v.iter().filter(|&&x| (x - 1.0).abs() < 1e-9).count() == 1));
    }

    #[test]
    fn test_marginalize_then_project() {
        let joint = boxed(
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
            &[0.1, 0.1, 0.1, 0.1],
            &[0.6, 0.6, 0.6, 0.6],
        );
        let marginal = joint.marginalize(1).unwrap();
        assert_eq!(marginal.domain().variables(), &[0]);
        assert_eq!(marginal.auxiliary(), 4);

        let solver = SimplexSolver::default();
        let bounds = marginal.to_interval(&solver).unwrap();
        assert_abs_diff_eq!(bounds.lower_data()[0], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.upper_data()[0], 0.8, epsilon = 1e-9);

        // lifted vertices project onto the same two extremes
        let mut lifted = marginal.vertices().unwrap();
        lifted.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(lifted.len(), 2);

        let explicit = marginal.project().unwrap();
        assert_eq!(explicit.auxiliary(), 0);
        let mut vertices = explicit.vertices().unwrap();
        vertices.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(vertices.len(), 2);
        assert_abs_diff_eq!(vertices[0][0], 0.2, epsilon = 1e-7);
        assert_abs_diff_eq!(vertices[1][0], 0.8, epsilon = 1e-7);
        assert_abs_diff_eq!(lifted[0][0], 0.2, epsilon = 1e-7);
        assert_abs_diff_eq!(lifted[1][0], 0.8, epsilon = 1e-7);
    }

    #[test]
    fn test_filter_slices_columns() {
        let joint = boxed(
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
            &[0.1, 0.2, 0.3, 0.0],
            &[0.2, 0.3, 0.5, 0.4],
        );
        let sliced = joint.filter(1, 1).unwrap();
        assert_eq!(sliced.domain().variables(), &[0]);
        let bounds = sliced.to_interval(&SimplexSolver::default()).unwrap();
        // y(x0 = 0, x1 = 1) keeps its own box
        assert_abs_diff_eq!(bounds.lower_data()[0], 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.upper_data()[0], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_combine_scales_by_point() {
        let a = boxed(Domain::var(0, 2), &[0.3, 0.3], &[0.7, 0.7]);
        let b = HalfspaceFactor::point_mass(1, 2, 1).unwrap();
        let joint = a.combine(&b).unwrap();
        assert_eq!(joint.domain().variables(), &[0, 1]);
        let bounds = joint.to_interval(&SimplexSolver::default()).unwrap();
        // all mass sits on x1 = 1
        assert_abs_diff_eq!(bounds.upper_data()[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.lower_data()[3], 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.upper_data()[3], 0.7, epsilon = 1e-9);
    }

    #[test]
    fn test_combine_keeps_product_structure() {
        // C = 1[A ≠ B] with uniform A and B: the joint over C is exactly (.5, .5)
        let a = precise(Domain::var(0, 2), vec![0.5, 0.5]);
        let b = precise(Domain::var(1, 2), vec![0.5, 0.5]);
        let xor = HalfspaceFactor::from_point(
            &BayesianFactor::new(
                Domain::new(&[0, 1, 2], &[2, 2, 2]).unwrap(),
                vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
            )
            .unwrap(),
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
        )
        .unwrap();
        let joint = a.combine(&b).unwrap().combine(&xor).unwrap();
        assert!(joint.separating().is_empty());
        let marginal = joint.marginalize_to(&[2]).unwrap();
        let values = marginal.point().unwrap();
        assert_abs_diff_eq!(values[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_envelope_contains_products() {
        let a = boxed(Domain::var(0, 2), &[0.2, 0.5], &[0.5, 0.8]);
        let b = boxed(Domain::var(1, 2), &[0.4, 0.4], &[0.6, 0.6]);
        let joint = a.combine(&b).unwrap();
        let bounds = joint.to_interval(&SimplexSolver::default()).unwrap();
        // y(0, 0) = p(0) q(0) ranges over [0.08, 0.30]; the envelope is exact at the corners
        assert_abs_diff_eq!(bounds.lower_data()[0], 0.08, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.upper_data()[0], 0.30, epsilon = 1e-9);
    }

    #[test]
    fn test_point_operations_stay_points() {
        let joint = precise(
            Domain::new(&[0, 1], &[2, 2]).unwrap(),
            vec![0.1, 0.2, 0.3, 0.4],
        );
        let marginal = joint.marginalize(1).unwrap();
        assert_eq!(marginal.point().unwrap().len(), 2);
        assert_abs_diff_eq!(marginal.point().unwrap()[0], 0.4, epsilon = 1e-12);
        let slice = joint.filter(0, 1).unwrap();
        assert_eq!(slice.point().unwrap(), &[0.2, 0.4]);
        assert_eq!(slice.constraints().len(), 2);
        assert_eq!(slice.vertices().unwrap(), vec![vec![0.2, 0.4]]);
    }

    #[test]
    fn test_degenerate_detection() {
        let empty = boxed(Domain::var(0, 2), &[0.6, 0.6], &[0.9, 0.9]);
        assert!(empty.is_degenerate());

        let zero = HalfspaceFactor::new(
            Domain::var(0, 2),
            vec![LinearConstraint::leq(vec![1.0, 1.0], 0.0)],
        )
        .unwrap();
        assert!(zero.is_degenerate());

        let proper = boxed(Domain::var(0, 2), &[0.2, 0.3], &[0.7, 0.8]);
        assert!(!proper.is_degenerate());
        assert!(precise(Domain::var(0, 2), vec![0.0, 0.0]).is_degenerate());
        assert!(!HalfspaceFactor::unit().is_degenerate());
    }

    #[test]
    fn test_infeasible_has_no_vertex() {
        let f = boxed(Domain::var(0, 2), &[0.6, 0.6], &[0.9, 0.9]);
        assert!(matches!(f.vertices(), Err(PgmError::InfeasibleQuery(_))));
    }
}
