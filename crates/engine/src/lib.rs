//! Query execution interface for Quarry
//!
//! The cursor subsystem pulls result blocks out of a running query through
//! the [`QueryExecution`] trait; the real implementations live in the query
//! engine. This crate also provides [`MockQuery`], a fully scripted
//! execution (blocks, suspension points, injected failures) used by tests
//! across the workspace.

mod block;
mod error;
mod execution;
mod mock;

pub use block::{ItemBlock, estimated_size};
pub use error::{QueryError, Result};
pub use execution::{QueryExecution, Step};
pub use mock::{MockQuery, MockQueryHandle, ScriptedStep};
