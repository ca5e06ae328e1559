//! Query execution trait that engines must implement
//!
//! This trait is the seam between the cursor subsystem and the query
//! engine: cursors pull blocks, engines report exhaustion or ask the
//! caller to come back later via the registered wakeup.

use crate::{ItemBlock, Result};
use std::sync::Arc;
use tokio::sync::Notify;

/// Outcome of asking an execution for its next block
#[derive(Debug)]
pub enum Step {
    /// A block of rows is ready
    Block(ItemBlock),

    /// No progress is possible right now (waiting on I/O or a remote
    /// participant). The registered wakeup fires when stepping is
    /// worthwhile again.
    Waiting,

    /// All rows have been produced
    Exhausted,
}

/// A running query, pulled one block at a time
///
/// Implementations never see concurrent calls: the cursor holding an
/// execution is leased to at most one task at a time, and the lease covers
/// the whole batch.
pub trait QueryExecution: Send {
    /// Attempt to produce the next block of rows
    ///
    /// Must not block the calling thread. When no progress is possible the
    /// implementation returns [`Step::Waiting`] and signals the registered
    /// wakeup once stepping is worthwhile again.
    fn step(&mut self) -> Result<Step>;

    /// Ask the execution to stop at its next checkpoint
    ///
    /// Idempotent. A killed execution fails subsequent steps with
    /// [`QueryError::Killed`](crate::QueryError::Killed) and signals the
    /// wakeup so that suspended callers observe the kill.
    fn kill(&mut self);

    /// Register the wakeup signalled when a suspended execution can make
    /// progress again
    ///
    /// At most one wakeup is registered at a time; registering a new one
    /// replaces the previous.
    fn set_wakeup(&mut self, wakeup: Arc<Notify>);
}
