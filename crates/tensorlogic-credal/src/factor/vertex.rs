//! Vertex-enumerated credal factors.

use serde::{Deserialize, Serialize};

use super::{
    check_state, check_subdomain, one_hot, BayesianFactor, FactorOps, IntervalFactor,
    PointMass, PROBABILITY_TOLERANCE,
};
use crate::domain::Domain;
use crate::error::{PgmError, Result};
use crate::lp::{Goal, LinearConstraint, LinearProblem, LinearSolver};

/// A credal set given by its extreme points.
///
/// For every configuration of the separating domain the factor holds a finite
/// set of vertices, each a point function over the data domain
/// (`domain \ separating`). Vertices are indexed
/// `vertices[separating offset][k][data offset]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexFactor {
    domain: Domain,
    separating: Domain,
    data: Domain,
    vertices: Vec<Vec<Vec<f64>>>,
}

impl VertexFactor {
    /// Create a vertex factor; every separating configuration needs at least one vertex.
    pub fn new(domain: Domain, separating: Domain, vertices: Vec<Vec<Vec<f64>>>) -> Result<Self> {
        check_subdomain(&domain, &separating)?;
        let data = domain.subtract(&separating);

        if vertices.len() != separating.size() {
            return Err(PgmError::DimensionMismatch {
                expected: separating.size(),
                got: vertices.len(),
            });
        }
        for set in &vertices {
            if set.is_empty() {
                return Err(PgmError::InvalidDistribution(
                    "every separating configuration needs at least one vertex".to_string(),
                ));
            }
            for vertex in set {
                if vertex.len() != data.size() {
                    return Err(PgmError::DimensionMismatch {
                        expected: data.size(),
                        got: vertex.len(),
                    });
                }
                if vertex.iter().any(|v| !v.is_finite() || *v < -PROBABILITY_TOLERANCE) {
                    return Err(PgmError::InvalidDistribution(
                        "vertex coordinates must be finite and non-negative".to_string(),
                    ));
                }
            }
        }

        let mut factor = Self {
            domain,
            separating,
            data,
            vertices,
        };
        for set in &mut factor.vertices {
            dedup_vertices(set);
        }
        Ok(factor)
    }

    /// Single-vertex credal set for a precise factor.
    pub fn from_point(factor: &BayesianFactor, separating: Domain) -> Result<Self> {
        let domain = factor.domain().clone();
        check_subdomain(&domain, &separating)?;
        let data = domain.subtract(&separating);
        let values = factor.data();

        let mut vertices = vec![vec![vec![0.0; data.size()]]; separating.size()];
        let sep_of = domain.offset_map(&separating);
        let data_of = domain.offset_map(&data);
        for (i, v) in values.into_iter().enumerate() {
            vertices[sep_of[i]][0][data_of[i]] = v;
        }

        Self::new(domain, separating, vertices)
    }

    /// Conditioning variables.
    pub fn separating(&self) -> &Domain {
        &self.separating
    }

    /// Variables the vertices range over.
    pub fn data_domain(&self) -> &Domain {
        &self.data
    }

    /// Vertex sets, one per separating configuration.
    pub fn vertex_sets(&self) -> &[Vec<Vec<f64>>] {
        &self.vertices
    }

    /// Vertices for one separating assignment (in separating-domain order).
    pub fn vertices(&self, separating: &[usize]) -> Result<&[Vec<f64>]> {
        let offset = self.separating.index_of(separating)?;
        Ok(&self.vertices[offset])
    }

    /// Total number of stored vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.iter().map(Vec::len).sum()
    }

    /// Drop vertices that are convex combinations of the remaining ones.
    pub fn prune(&self, solver: &dyn LinearSolver) -> Result<Self> {
        let mut result = self.clone();
        for set in &mut result.vertices {
            prune_set(set, solver)?;
        }
        tracing::trace!(
            before = self.num_vertices(),
            after = result.num_vertices(),
            "pruned vertex factor"
        );
        Ok(result)
    }

    /// Coordinate-wise bounds of the credal set as an interval factor.
    pub fn to_interval(&self) -> Result<IntervalFactor> {
        let sep_of = self.domain.offset_map(&self.separating);
        let data_of = self.domain.offset_map(&self.data);

        let (lower, upper): (Vec<f64>, Vec<f64>) = sep_of
            .iter()
            .zip(&data_of)
            .map(|(&s, &d)| {
                self.vertices[s].iter().map(|v| v[d]).fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), x| (lo.min(x), hi.max(x)),
                )
            })
            .map(|(lo, hi)| (lo.clamp(0.0, 1.0), hi.clamp(0.0, 1.0)))
            .unzip();

        IntervalFactor::new(self.domain.clone(), self.separating.clone(), lower, upper)
    }

    /// Every way of picking one vertex per inner separating configuration,
    /// expanded to vectors over `data`.
    fn expand(&self, outer: &Domain, data: &Domain, outer_state: usize) -> Vec<Vec<f64>> {
        let inner = self.separating.intersection(data);
        let outer_offset = outer.offset_map(&self.separating)[outer_state];
        let inner_offsets = inner.offset_map(&self.separating);
        let inner_of = data.offset_map(&inner);
        let own_data_of = data.offset_map(&self.data);

        let sets: Vec<&Vec<Vec<f64>>> = inner_offsets
            .iter()
            .map(|&c| &self.vertices[outer_offset + c])
            .collect();

        let mut choice = vec![0usize; sets.len()];
        let mut expanded = Vec::new();
        loop {
            let vertex = (0..data.size())
                .map(|d| {
                    let c = inner_of[d];
                    sets[c][choice[c]][own_data_of[d]]
                })
                .collect();
            expanded.push(vertex);

            // Odometer over vertex choices.
            let mut i = 0;
            loop {
                if i == choice.len() {
                    return expanded;
                }
                choice[i] += 1;
                if choice[i] < sets[i].len() {
                    break;
                }
                choice[i] = 0;
                i += 1;
            }
        }
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

impl FactorOps for VertexFactor {
    fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Cartesian product of the vertex sets, taken per configuration of the
    /// remaining separating variables.
    fn combine(&self, other: &Self) -> Result<Self> {
        let domain = self.domain.union(&other.domain)?;
        let data = self.data.union(&other.data)?;
        let separating = self.separating.union(&other.separating)?.subtract(&data);

        let mut vertices = Vec::with_capacity(separating.size());
        for s in 0..separating.size() {
            let left = self.expand(&separating, &data, s);
            let right = other.expand(&separating, &data, s);

            let mut set = Vec::with_capacity(left.len() * right.len());
            for a in &left {
                for b in &right {
                    set.push(a.iter().zip(b).map(|(x, y)| x * y).collect());
                }
            }
            dedup_vertices(&mut set);
            vertices.push(set);
        }

        tracing::trace!(
            domain = ?domain.variables(),
            vertices = vertices.iter().map(Vec::len).sum::<usize>(),
            "combined vertex factors"
        );
        Ok(Self {
            domain,
            separating,
            data,
            vertices,
        })
    }

    fn marginalize(&self, variable: usize) -> Result<Self> {
        self.check_data_variable(variable)?;
        let data = self.data.remove(variable);
        let collapse = self.data.offset_map(&data);

        let vertices = self
            .vertices
            .iter()
            .map(|set| {
                let mut reduced: Vec<Vec<f64>> = set
                    .iter()
                    .map(|vertex| {
                        let mut out = vec![0.0; data.size()];
                        for (d, v) in vertex.iter().enumerate() {
                            out[collapse[d]] += v;
                        }
                        out
                    })
                    .collect();
                dedup_vertices(&mut reduced);
                reduced
            })
            .collect();

        Ok(Self {
            domain: self.domain.remove(variable),
            separating: self.separating.clone(),
            data,
            vertices,
        })
    }

    fn filter(&self, variable: usize, state: usize) -> Result<Self> {
        check_state(&self.domain, variable, state)?;
        let domain = self.domain.remove(variable);

        if let Some(pos) = self.separating.position(variable) {
            let separating = self.separating.remove(variable);
            let shift = state * self.separating.strides()[pos];
            let vertices = separating
                .offset_map(&self.separating)
                .into_iter()
                .map(|offset| self.vertices[offset + shift].clone())
                .collect();
            return Ok(Self {
                domain,
                separating,
                data: self.data.clone(),
                vertices,
            });
        }

        let pos = self
            .data
            .position(variable)
            .ok_or(PgmError::NotInDomain(variable))?;
        let stride = self.data.strides()[pos];
        let card = self.data.cardinalities()[pos];
        let keep: Vec<usize> = (0..self.data.size())
            .filter(|d| (d / stride) % card == state)
            .collect();

        let vertices = self
            .vertices
            .iter()
            .map(|set| {
                let mut sliced: Vec<Vec<f64>> = set
                    .iter()
                    .map(|vertex| keep.iter().map(|&d| vertex[d]).collect())
                    .collect();
                dedup_vertices(&mut sliced);
                sliced
            })
            .collect();

        Ok(Self {
            domain,
            separating: self.separating.clone(),
            data: self.data.remove(variable),
            vertices,
        })
    }

    /// Rescale every vertex to sum to one; vertices with no mass are dropped
    /// unless the whole set is massless.
    fn normalize(&self) -> Result<Self> {
        let vertices = self
            .vertices
            .iter()
            .map(|set| {
                let mut scaled: Vec<Vec<f64>> = set
                    .iter()
                    .filter_map(|vertex| {
                        let sum: f64 = vertex.iter().sum();
                        (sum > 0.0).then(|| vertex.iter().map(|v| v / sum).collect())
                    })
                    .collect();
                if scaled.is_empty() {
                    scaled = set.clone();
                }
                dedup_vertices(&mut scaled);
                scaled
            })
            .collect();

        Ok(Self {
            domain: self.domain.clone(),
            separating: self.separating.clone(),
            data: self.data.clone(),
            vertices,
        })
    }

    fn is_degenerate(&self) -> bool {
        self.vertices
            .iter()
            .any(|set| set.iter().all(|vertex| vertex.iter().all(|&v| v <= 0.0)))
    }

    fn unit() -> Self {
        Self {
            domain: Domain::empty(),
            separating: Domain::empty(),
            data: Domain::empty(),
            vertices: vec![vec![vec![1.0]]],
        }
    }
}

impl PointMass for VertexFactor {
    fn point_mass(variable: usize, cardinality: usize, state: usize) -> Result<Self> {
        let vertex = one_hot(cardinality, state, variable)?;
        Self::new(
            Domain::var(variable, cardinality),
            Domain::empty(),
            vec![vec![vertex]],
        )
    }
}

/// Remove duplicate vertices (coordinate-wise within tolerance), keeping first occurrences.
pub(crate) fn dedup_vertices(set: &mut Vec<Vec<f64>>) {
    let mut unique: Vec<Vec<f64>> = Vec::with_capacity(set.len());
    for vertex in set.drain(..) {
        let seen = unique.iter().any(|u| {
            u.iter()
                .zip(&vertex)
                .all(|(a, b)| (a - b).abs() <= PROBABILITY_TOLERANCE)
        });
        if !seen {
            unique.push(vertex);
        }
    }
    *set = unique;
}

/// Drop points that are convex combinations of the remaining ones.
pub(crate) fn prune_set(set: &mut Vec<Vec<f64>>, solver: &dyn LinearSolver) -> Result<()> {
    let mut k = 0;
    while k < set.len() && set.len() > 1 {
        if is_convex_combination(&set[k], set, k, solver)? {
            set.remove(k);
        } else {
            k += 1;
        }
    }
    Ok(())
}

/// Whether `set[skip]` lies in the convex hull of the other vertices.
fn is_convex_combination(
    target: &[f64],
    set: &[Vec<f64>],
    skip: usize,
    solver: &dyn LinearSolver,
) -> Result<bool> {
    let others: Vec<&Vec<f64>> = set
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .map(|(_, v)| v)
        .collect();

    let mut constraints = Vec::with_capacity(target.len() + 1);
    for (d, &value) in target.iter().enumerate() {
        constraints.push(LinearConstraint::eq(
            others.iter().map(|v| v[d]).collect(),
            value,
        ));
    }
    constraints.push(LinearConstraint::eq(vec![1.0; others.len()], 1.0));

    let problem = LinearProblem::new(vec![0.0; others.len()], Goal::Minimize, constraints);
    match solver.solve(&problem) {
        Ok(_) => Ok(true),
        Err(PgmError::InfeasibleQuery(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
