//! Batch sequence numbers
//!
//! Batches produced by a cursor are numbered 1, 2, 3, ... in delivery
//! order. Clients echo the number back when fetching, which lets a
//! retriable cursor distinguish "give me the next batch" from "I never
//! received the current one, send it again".

use serde::{Deserialize, Serialize};
use std::fmt;

/// 1-based position of a batch in a cursor's delivery order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(u64);

impl BatchId {
    /// Create from a raw sequence number (as received on the wire)
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The first batch a cursor ever produces
    pub fn first() -> Self {
        Self(1)
    }

    /// The batch that follows this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw sequence number
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
