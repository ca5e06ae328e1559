//! Error types for the cursor subsystem

use quarry_engine::QueryError;
use thiserror::Error;

/// Result type for cursor operations
pub type Result<T> = std::result::Result<T, CursorError>;

/// Errors that can occur while working with cursors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// The cursor does not exist, has expired, was already removed, or is
    /// owned by someone else. Callers cannot tell these apart: probing
    /// must not reveal whether a foreign cursor exists.
    #[error("cursor not found")]
    NotFound,

    /// Another request holds the cursor right now; retry later
    #[error("cursor busy")]
    Busy,

    /// A soft shutdown is in progress; no new cursors are created
    #[error("shutting down")]
    ShuttingDown,

    /// The underlying query failed. The error is cached on the cursor and
    /// every later access fails the same way until the cursor is removed.
    #[error(transparent)]
    Execution(QueryError),

    /// The cursor's query was killed
    #[error("query killed")]
    Killed,

    /// Building the batch exceeded the memory budget. The batch is
    /// aborted; the cursor itself stays usable.
    #[error("out of memory while building batch")]
    OutOfMemory,
}

impl From<QueryError> for CursorError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Killed => CursorError::Killed,
            other => CursorError::Execution(other),
        }
    }
}
