//! Cursors over fully materialized results

use crate::Result;
use crate::batch::BatchSink;
use quarry_engine::estimated_size;
use serde_json::Value;

/// Cursor over a result that was complete before the cursor existed
///
/// Dumping never suspends: each batch is a straight slice of the stored
/// rows. The whole result stays in memory until the cursor is destroyed.
pub struct MaterializedCursor {
    rows: Vec<Value>,
    pos: usize,
    /// Estimated, fixed at creation
    memory: usize,
}

impl MaterializedCursor {
    pub fn new(rows: Vec<Value>) -> Self {
        let memory = rows.iter().map(estimated_size).sum();
        Self {
            rows,
            pos: 0,
            memory,
        }
    }

    /// Total number of rows in the result
    pub fn total(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn memory_usage(&self) -> usize {
        self.memory
    }

    /// Fill one batch worth of rows; returns whether rows remain after it
    ///
    /// On a budget failure the position is rolled back to the start of the
    /// batch and the partial batch leaves the sink, so a retry (or a
    /// dispose) sees the cursor unchanged and the sink holds nothing.
    pub(crate) fn fill(&mut self, sink: &mut BatchSink, batch_size: usize) -> Result<bool> {
        let start = self.pos;
        let end = self.rows.len().min(self.pos + batch_size);

        while self.pos < end {
            if let Err(err) = sink.push(self.rows[self.pos].clone()) {
                sink.take_rows();
                self.pos = start;
                return Err(err);
            }
            self.pos += 1;
        }

        Ok(self.pos < self.rows.len())
    }

    /// Step the position back over the last `n` delivered rows
    ///
    /// For a built batch that was abandoned before delivery; the next
    /// fill hands the same rows out again.
    pub(crate) fn rewind(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }
}
