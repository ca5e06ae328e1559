//! Error types for query executions

use thiserror::Error;

/// Result type for execution operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors a query execution can surface while producing blocks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Runtime failure inside the engine (conflict, bad input, storage fault)
    #[error("query execution failed: {0}")]
    Execution(String),

    /// The execution observed a kill request at a checkpoint
    #[error("query killed")]
    Killed,
}

impl From<&str> for QueryError {
    fn from(s: &str) -> Self {
        QueryError::Execution(s.to_string())
    }
}

impl From<String> for QueryError {
    fn from(s: String) -> Self {
        QueryError::Execution(s)
    }
}
