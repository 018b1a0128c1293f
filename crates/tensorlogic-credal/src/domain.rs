//! Domain indexing: mixed-radix addressing over ordered variable sets.
//!
//! A [`Domain`] is an ordered set of distinct variables with their
//! cardinalities. Variables are kept sorted by identifier, and the first
//! variable varies fastest in the flat layout:
//!
//! ```text
//! offset = Σᵢ stateᵢ · strideᵢ,   stride₀ = 1,   strideᵢ = strideᵢ₋₁ · cardᵢ₋₁
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{PgmError, Result};

/// An ordered set of variables with cardinalities and strides.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain {
    variables: Vec<usize>,
    cardinalities: Vec<usize>,
    strides: Vec<usize>,
    size: usize,
}

impl Domain {
    /// Create a domain from parallel slices of variables and cardinalities.
    ///
    /// Variables are sorted; a repeated variable must carry the same cardinality.
    pub fn new(variables: &[usize], cardinalities: &[usize]) -> Result<Self> {
        if variables.len() != cardinalities.len() {
            return Err(PgmError::DimensionMismatch {
                expected: variables.len(),
                got: cardinalities.len(),
            });
        }

        let mut pairs: Vec<(usize, usize)> = variables
            .iter()
            .copied()
            .zip(cardinalities.iter().copied())
            .collect();
        pairs.sort_unstable();

        let mut vars = Vec::with_capacity(pairs.len());
        let mut cards = Vec::with_capacity(pairs.len());
        for (var, card) in pairs {
            if card == 0 {
                return Err(PgmError::OutOfRange(format!(
                    "variable {} has zero cardinality",
                    var
                )));
            }
            if let Some(&last) = vars.last() {
                if last == var {
                    let previous: usize = cards[cards.len() - 1];
                    if previous != card {
                        return Err(PgmError::DomainConflict {
                            variable: var,
                            left: previous,
                            right: card,
                        });
                    }
                    continue;
                }
            }
            vars.push(var);
            cards.push(card);
        }

        Ok(Self::from_sorted(vars, cards))
    }

    /// The zero-variable domain (a single joint state).
    pub fn empty() -> Self {
        Self::from_sorted(Vec::new(), Vec::new())
    }

    /// Single-variable domain.
    ///
    /// Infallible counterpart of [`Domain::new`]: a zero cardinality is
    /// clamped to one state instead of rejected. Models validate
    /// cardinalities when variables are added, so callers holding a model
    /// cardinality never hit the clamp.
    pub fn var(variable: usize, cardinality: usize) -> Self {
        Self::from_sorted(vec![variable], vec![cardinality.max(1)])
    }

    fn from_sorted(variables: Vec<usize>, cardinalities: Vec<usize>) -> Self {
        let mut strides = Vec::with_capacity(variables.len());
        let mut size = 1;
        for &card in &cardinalities {
            strides.push(size);
            size *= card;
        }
        Self {
            variables,
            cardinalities,
            strides,
            size,
        }
    }

    /// Variables in domain order.
    pub fn variables(&self) -> &[usize] {
        &self.variables
    }

    /// Cardinalities in domain order.
    pub fn cardinalities(&self) -> &[usize] {
        &self.cardinalities
    }

    /// Strides in domain order.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of joint states.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the domain has no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Position of a variable within the domain.
    pub fn position(&self, variable: usize) -> Option<usize> {
        self.variables.binary_search(&variable).ok()
    }

    /// Whether the variable belongs to the domain.
    pub fn contains(&self, variable: usize) -> bool {
        self.position(variable).is_some()
    }

    /// Cardinality of a variable, if present.
    pub fn cardinality(&self, variable: usize) -> Option<usize> {
        self.position(variable).map(|idx| self.cardinalities[idx])
    }

    /// Union of two domains.
    pub fn union(&self, other: &Domain) -> Result<Domain> {
        let mut vars = Vec::with_capacity(self.len() + other.len());
        let mut cards = Vec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);

        while i < self.len() || j < other.len() {
            let order = match (self.variables.get(i), other.variables.get(j)) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                _ => Ordering::Greater,
            };
            match order {
                Ordering::Less => {
                    vars.push(self.variables[i]);
                    cards.push(self.cardinalities[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    vars.push(other.variables[j]);
                    cards.push(other.cardinalities[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    if self.cardinalities[i] != other.cardinalities[j] {
                        return Err(PgmError::DomainConflict {
                            variable: self.variables[i],
                            left: self.cardinalities[i],
                            right: other.cardinalities[j],
                        });
                    }
                    vars.push(self.variables[i]);
                    cards.push(self.cardinalities[i]);
                    i += 1;
                    j += 1;
                }
            }
        }

        Ok(Self::from_sorted(vars, cards))
    }

    /// Union of any number of domains.
    pub fn union_all<'a>(domains: impl IntoIterator<Item = &'a Domain>) -> Result<Domain> {
        domains
            .into_iter()
            .try_fold(Domain::empty(), |acc, d| acc.union(d))
    }

    /// Variables shared with another domain.
    pub fn intersection(&self, other: &Domain) -> Domain {
        self.retain(|v| other.contains(v))
    }

    /// Keep only the named variables, preserving domain order.
    pub fn project(&self, subset: &[usize]) -> Domain {
        self.retain(|v| subset.contains(&v))
    }

    /// Domain without one variable.
    pub fn remove(&self, variable: usize) -> Domain {
        self.retain(|v| v != variable)
    }

    /// Domain without the variables of another domain.
    pub fn subtract(&self, other: &Domain) -> Domain {
        self.retain(|v| !other.contains(v))
    }

    fn retain(&self, keep: impl Fn(usize) -> bool) -> Domain {
        let (vars, cards): (Vec<usize>, Vec<usize>) = self
            .variables
            .iter()
            .zip(&self.cardinalities)
            .filter(|(v, _)| keep(**v))
            .map(|(v, c)| (*v, *c))
            .unzip();
        Self::from_sorted(vars, cards)
    }

    /// Mixed-radix encode of a full assignment (states in domain order).
    pub fn index_of(&self, assignment: &[usize]) -> Result<usize> {
        if assignment.len() != self.len() {
            return Err(PgmError::OutOfRange(format!(
                "assignment has {} states but the domain has {} variables",
                assignment.len(),
                self.len()
            )));
        }

        let mut offset = 0;
        for (idx, &state) in assignment.iter().enumerate() {
            if state >= self.cardinalities[idx] {
                return Err(PgmError::OutOfRange(format!(
                    "state {} of variable {} exceeds cardinality {}",
                    state, self.variables[idx], self.cardinalities[idx]
                )));
            }
            offset += state * self.strides[idx];
        }
        Ok(offset)
    }

    /// Inverse of [`Domain::index_of`].
    pub fn assignment_of(&self, index: usize) -> Result<Vec<usize>> {
        if index >= self.size {
            return Err(PgmError::OutOfRange(format!(
                "index {} exceeds domain size {}",
                index, self.size
            )));
        }
        Ok(self
            .strides
            .iter()
            .zip(&self.cardinalities)
            .map(|(&stride, &card)| (index / stride) % card)
            .collect())
    }

    /// For every flat index of `self`, the flat index of its restriction in `target`.
    ///
    /// Variables of `target` missing from `self` contribute state zero.
    pub fn offset_map(&self, target: &Domain) -> Vec<usize> {
        let steps: Vec<usize> = self
            .variables
            .iter()
            .map(|&v| target.position(v).map_or(0, |p| target.strides[p]))
            .collect();

        let mut offsets = Vec::with_capacity(self.size);
        let mut assignment = vec![0; self.len()];
        let mut offset = 0;

        for _ in 0..self.size {
            offsets.push(offset);
            for i in 0..self.len() {
                assignment[i] += 1;
                offset += steps[i];
                if assignment[i] < self.cardinalities[i] {
                    break;
                }
                offset -= steps[i] * self.cardinalities[i];
                assignment[i] = 0;
            }
        }

        offsets
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_cardinality() {
        assert!(Domain::new(&[3], &[0]).is_err());
        let clamped = Domain::var(3, 0);
        assert_eq!(clamped.cardinalities(), &[1]);
        assert_eq!(clamped.size(), 1);
        assert_eq!(clamped, Domain::new(&[3], &[1]).unwrap());
    }

    #[test]
    fn test_sorted_strides() {
        let d = Domain::new(&[5, 1, 3], &[2, 3, 4]).unwrap();
        assert_eq!(d.variables(), &[1, 3, 5]);
        assert_eq!(d.cardinalities(), &[3, 4, 2]);
        assert_eq!(d.strides(), &[1, 3, 12]);
        assert_eq!(d.size(), 24);
    }

    #[test]
    fn test_index_round_trip() {
        let d = Domain::new(&[0, 1, 2], &[2, 3, 2]).unwrap();
        for idx in 0..d.size() {
            let assignment = d.assignment_of(idx).unwrap();
            assert_eq!(d.index_of(&assignment).unwrap(), idx);
        }
        assert_eq!(d.index_of(&[1, 2, 1]).unwrap(), 1 + 2 * 2 + 6);
    }

    #[test]
    fn test_out_of_range() {
        let d = Domain::new(&[0, 1], &[2, 2]).unwrap();
        assert!(matches!(d.index_of(&[2, 0]), Err(PgmError::OutOfRange(_))));
        assert!(matches!(d.assignment_of(4), Err(PgmError::OutOfRange(_))));
        assert!(matches!(d.index_of(&[0]), Err(PgmError::OutOfRange(_))));
    }

    #[test]
    fn test_union_conflict() {
        let a = Domain::new(&[0, 1], &[2, 2]).unwrap();
        let b = Domain::new(&[1, 2], &[3, 2]).unwrap();
        assert_eq!(
            a.union(&b),
            Err(PgmError::DomainConflict {
                variable: 1,
                left: 2,
                right: 3
            })
        );
    }

    #[test]
    fn test_union_and_project() {
        let a = Domain::new(&[0, 4], &[2, 3]).unwrap();
        let b = Domain::new(&[2, 4], &[2, 3]).unwrap();
        let u = a.union(&b).unwrap();
        assert_eq!(u.variables(), &[0, 2, 4]);
        assert_eq!(u.project(&[4, 0]).variables(), &[0, 4]);
        assert_eq!(u.remove(2), a);
        assert_eq!(a.intersection(&b).variables(), &[4]);
        assert_eq!(u.subtract(&a).variables(), &[2]);
    }

    #[test]
    fn test_offset_map() {
        let full = Domain::new(&[0, 1], &[2, 3]).unwrap();
        let sub = Domain::var(1, 3);
        assert_eq!(full.offset_map(&sub), vec![0, 0, 1, 1, 2, 2]);

        let other = Domain::var(0, 2);
        assert_eq!(full.offset_map(&other), vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(Domain::empty().offset_map(&full), vec![0]);
    }

    #[test]
    fn test_empty_domain() {
        let d = Domain::empty();
        assert_eq!(d.size(), 1);
        assert_eq!(d.index_of(&[]).unwrap(), 0);
        assert!(d.is_empty());
    }
}
