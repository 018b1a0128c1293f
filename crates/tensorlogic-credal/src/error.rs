//! Error types for factor algebra, model construction and inference.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in PGM operations.
///
/// Structural errors (`DomainConflict`, `OutOfRange`, `NotInDomain`,
/// `DomainMismatch`, `CycleDetected`) abort the call that raised them and leave
/// any model untouched. Query-level errors (`InconsistentEvidence`,
/// `InfeasibleQuery`, `TimeoutExceeded`) are recoverable by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PgmError {
    /// The same variable appears with two different cardinalities
    #[error("Domain conflict: variable {variable} has cardinality {left} and {right}")]
    DomainConflict {
        variable: usize,
        left: usize,
        right: usize,
    },

    /// A state or flat index exceeds the declared cardinality
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// An operation references a variable absent from the factor
    #[error("Variable {0} is not in the factor domain")]
    NotInDomain(usize),

    /// Factor assigned to a node does not match {node} ∪ parents
    #[error("Domain mismatch for variable {variable}: expected {expected:?}, got {got:?}")]
    DomainMismatch {
        variable: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Adding the edge would break acyclicity
    #[error("Adding link {parent} -> {child} would create a cycle")]
    CycleDetected { parent: usize, child: usize },

    /// Evidence filtering produced an all-zero factor
    #[error("Inconsistent evidence: the observed configuration has zero probability")]
    InconsistentEvidence,

    /// The linear program has no feasible solution
    #[error("Infeasible query: {0}")]
    InfeasibleQuery(String),

    /// A time-bounded invocation did not complete
    #[error("Timeout exceeded after {0:?}")]
    TimeoutExceeded(Duration),

    /// Variable not present in the model
    #[error("Variable not found: {0}")]
    VariableNotFound(usize),

    /// Table size does not match the domain
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Invalid probability values
    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    /// Invalid model structure
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Operation not defined for this factor kind or configuration
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The linear program objective is unbounded
    #[error("Unbounded linear program: {0}")]
    Unbounded(String),

    /// A worker thread terminated without producing a result
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

impl PgmError {
    /// Whether a batch of experiments may record this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InconsistentEvidence | Self::InfeasibleQuery(_) | Self::TimeoutExceeded(_)
        )
    }
}

/// Result type for PGM operations.
pub type Result<T> = std::result::Result<T, PgmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_split() {
        assert!(PgmError::InconsistentEvidence.is_recoverable());
        assert!(PgmError::InfeasibleQuery("empty".into()).is_recoverable());
        assert!(PgmError::TimeoutExceeded(Duration::from_millis(5)).is_recoverable());
        assert!(!PgmError::CycleDetected {
            parent: 0,
            child: 1
        }
        .is_recoverable());
        assert!(!PgmError::NotInDomain(3).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = PgmError::DomainConflict {
            variable: 2,
            left: 3,
            right: 4,
        };
        assert_eq!(
            err.to_string(),
            "Domain conflict: variable 2 has cardinality 3 and 4"
        );
    }
}
