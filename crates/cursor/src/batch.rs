//! Batches and batch assembly

use crate::{CursorError, Result};
use quarry_common::BatchId;
use quarry_engine::estimated_size;
use serde::Serialize;
use serde_json::Value;

/// One delivered batch of results
///
/// `count` is present when the cursor was created with `has_count`;
/// `extra` rides on the final batch only. Retriable cursors cache their
/// most recent `Batch` so a repeat request is answered byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub rows: Vec<Value>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Collects rows for the batch being built
///
/// The sink outlives individual `poll_dump` calls: while a streaming
/// cursor is suspended the rows collected so far stay here and the next
/// poll continues the same batch. The optional byte budget is enforced on
/// every append.
#[derive(Debug, Default)]
pub struct BatchSink {
    rows: Vec<Value>,
    bytes: usize,
    limit: Option<usize>,
}

impl BatchSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink with an optional byte budget
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            rows: Vec::new(),
            bytes: 0,
            limit,
        }
    }

    /// Rows collected so far
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Estimated bytes collected so far
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Whether a row of `size` estimated bytes still fits the budget
    pub fn fits(&self, size: usize) -> bool {
        match self.limit {
            Some(limit) => self.bytes + size <= limit,
            None => true,
        }
    }

    /// Append a row; fails with `OutOfMemory` when the budget is exhausted
    pub(crate) fn push(&mut self, row: Value) -> Result<()> {
        let size = estimated_size(&row);
        if !self.fits(size) {
            return Err(CursorError::OutOfMemory);
        }
        self.bytes += size;
        self.rows.push(row);
        Ok(())
    }

    /// Take the collected rows, leaving the sink empty for reuse
    pub(crate) fn take_rows(&mut self) -> Vec<Value> {
        self.bytes = 0;
        std::mem::take(&mut self.rows)
    }
}
