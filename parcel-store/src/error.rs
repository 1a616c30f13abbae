//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<duckdb::Error> for StoreError {
    fn from(err: duckdb::Error) -> Self {
        let msg = err.to_string();
        // DuckDB reports PK violations as constraint errors; surface those
        // distinctly so callers can treat a lost grant race as a conflict.
        if msg.contains("Constraint Error") || msg.contains("Duplicate key") {
            StoreError::Conflict(msg)
        } else {
            StoreError::Storage(msg)
        }
    }
}
