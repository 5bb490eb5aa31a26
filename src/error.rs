//! Error types for vicinity-temporal.

use thiserror::Error;

/// Errors that can occur during indexing, search and maintenance.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrieveError {
    /// Empty query provided.
    #[error("Query is empty")]
    EmptyQuery,
    /// Empty index (no points indexed).
    #[error("Index is empty")]
    EmptyIndex,
    /// Invalid parameter value.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Dimension mismatch between query and indexed points.
    #[error("Dimension mismatch: query has {query_dim} dimensions, document has {doc_dim}")]
    DimensionMismatch { query_dim: usize, doc_dim: usize },
    /// A maintenance step was requested in a state that does not allow it.
    #[error("Cannot {operation} while maintenance is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
    /// Identity is not part of the indexed dataset.
    #[error("Unknown identity {0}")]
    UnknownIdentity(u32),
    /// Other error (for extensibility).
    #[error("Error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RetrieveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = RetrieveError::DimensionMismatch {
            query_dim: 3,
            doc_dim: 4,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: query has 3 dimensions, document has 4"
        );

        let err = RetrieveError::InvalidState {
            operation: "consolidate",
            state: "steady".into(),
        };
        assert_eq!(err.to_string(), "Cannot consolidate while maintenance is steady");
    }
}
