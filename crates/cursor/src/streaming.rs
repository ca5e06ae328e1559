//! Cursors over still-executing queries
//!
//! A streaming cursor owns its execution exclusively for the cursor's
//! whole lifetime. Blocks are pulled on demand while a batch is being
//! built; rows the engine produced beyond the batch boundary wait in the
//! spillover queue for the next batch.

use crate::batch::BatchSink;
use crate::{CursorError, Result};
use quarry_engine::{QueryError, QueryExecution, Step, estimated_size};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Execution status of a streaming cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, the execution has not been stepped yet
    Preparing,
    /// Actively producing blocks
    Executing,
    /// The execution reported `Waiting`; resume after the wakeup fires
    Suspended,
    /// All blocks produced; undelivered rows may remain queued
    Exhausted,
    /// Terminal failure; the error is cached and re-reported
    Failed,
    /// A kill was requested
    Killed,
}

/// Result of one cooperative fill attempt
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamFill {
    /// The batch is complete (possibly short, on exhaustion)
    Filled { has_more: bool },
    /// Execution suspended; continue the same batch after the wakeup
    Waiting,
}

/// Cursor over a query that is still running
pub struct StreamingCursor {
    execution: Box<dyn QueryExecution>,
    state: StreamState,

    /// Rows produced but not yet handed to a batch
    queue: VecDeque<Value>,
    queued_bytes: usize,

    /// Registered with the execution at construction; fires when a
    /// suspended execution can make progress again
    wakeup: Arc<Notify>,

    /// Set when `state` is `Failed`
    error: Option<QueryError>,
}

impl StreamingCursor {
    pub fn new(mut execution: Box<dyn QueryExecution>) -> Self {
        let wakeup = Arc::new(Notify::new());
        execution.set_wakeup(wakeup.clone());
        Self {
            execution,
            state: StreamState::Preparing,
            queue: VecDeque::new(),
            queued_bytes: 0,
            wakeup,
            error: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Estimated bytes in the spillover queue
    pub fn memory_usage(&self) -> usize {
        self.queued_bytes
    }

    pub(crate) fn wakeup(&self) -> Arc<Notify> {
        self.wakeup.clone()
    }

    /// Ask the execution to stop; later fills fail with `Killed`
    pub(crate) fn kill(&mut self) {
        self.execution.kill();
        self.state = StreamState::Killed;
    }

    /// Fill one batch worth of rows, stepping the execution as needed
    ///
    /// Never blocks: a suspended execution yields [`StreamFill::Waiting`]
    /// and the sink keeps the rows collected so far. On a budget failure
    /// those rows go back to the queue, so nothing is lost. A full batch
    /// is only reported once the execution has revealed whether rows
    /// follow it, so `has_more` never promises data that does not exist.
    pub(crate) fn fill(&mut self, sink: &mut BatchSink, batch_size: usize) -> Result<StreamFill> {
        match self.state {
            StreamState::Failed => return Err(self.cached_error()),
            StreamState::Killed => return Err(CursorError::Killed),
            StreamState::Preparing => self.state = StreamState::Executing,
            _ => {}
        }

        loop {
            if let Err(err) = self.drain_queue(sink, batch_size) {
                self.reclaim(sink);
                return Err(err);
            }

            // A batch is reported only once has_more is decided: rows
            // remain queued behind it, or the execution is exhausted.
            if self.state == StreamState::Exhausted
                || (sink.len() >= batch_size && !self.queue.is_empty())
            {
                return Ok(StreamFill::Filled {
                    has_more: self.has_more(),
                });
            }

            match self.execution.step() {
                Ok(Step::Block(block)) => {
                    self.state = StreamState::Executing;
                    self.queued_bytes += block.memory_usage();
                    self.queue.extend(block.into_rows());
                }
                Ok(Step::Waiting) => {
                    self.state = StreamState::Suspended;
                    return Ok(StreamFill::Waiting);
                }
                Ok(Step::Exhausted) => {
                    self.state = StreamState::Exhausted;
                }
                Err(QueryError::Killed) => {
                    self.state = StreamState::Killed;
                    return Err(CursorError::Killed);
                }
                Err(err) => {
                    self.state = StreamState::Failed;
                    self.error = Some(err.clone());
                    return Err(CursorError::Execution(err));
                }
            }
        }
    }

    /// Move queued rows into the sink up to the batch size
    fn drain_queue(&mut self, sink: &mut BatchSink, batch_size: usize) -> Result<()> {
        while sink.len() < batch_size {
            let Some(row) = self.queue.front() else {
                return Ok(());
            };

            let size = estimated_size(row);
            if !sink.fits(size) {
                // Leave the row queued; the caller aborts the batch
                return Err(CursorError::OutOfMemory);
            }

            if let Some(row) = self.queue.pop_front() {
                self.queued_bytes = self.queued_bytes.saturating_sub(size);
                sink.push(row)?;
            }
        }
        Ok(())
    }

    /// Give the rows of an aborted batch back to the queue
    pub(crate) fn reclaim(&mut self, sink: &mut BatchSink) {
        let rows = sink.take_rows();
        self.queued_bytes += rows.iter().map(estimated_size).sum::<usize>();
        for row in rows.into_iter().rev() {
            self.queue.push_front(row);
        }
    }

    fn has_more(&self) -> bool {
        !(self.queue.is_empty() && self.state == StreamState::Exhausted)
    }

    fn cached_error(&self) -> CursorError {
        match &self.error {
            Some(err) => CursorError::Execution(err.clone()),
            None => CursorError::Execution(QueryError::Execution("query failed".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_engine::{MockQuery, ScriptedStep};
    use serde_json::json;

    #[test]
    fn test_drains_blocks_across_batches() {
        let query = MockQuery::new(vec![
            ScriptedStep::Block(vec![json!(1), json!(2)]),
            ScriptedStep::Block(vec![json!(3), json!(4)]),
        ]);
        let mut cursor = StreamingCursor::new(Box::new(query));
        let mut sink = BatchSink::new();

        // First batch takes one row beyond the first block
        match cursor.fill(&mut sink, 3).unwrap() {
            StreamFill::Filled { has_more } => assert!(has_more),
            StreamFill::Waiting => panic!("unexpected suspension"),
        }
        assert_eq!(sink.take_rows(), vec![json!(1), json!(2), json!(3)]);

        // Second batch drains the leftover row and observes exhaustion
        match cursor.fill(&mut sink, 3).unwrap() {
            StreamFill::Filled { has_more } => assert!(!has_more),
            StreamFill::Waiting => panic!("unexpected suspension"),
        }
        assert_eq!(sink.take_rows(), vec![json!(4)]);
        assert_eq!(cursor.state(), StreamState::Exhausted);
    }

    #[test]
    fn test_exact_multiple_ends_without_extra_batch() {
        let query = MockQuery::from_rows(vec![json!(1), json!(2), json!(3), json!(4)], 2);
        let mut cursor = StreamingCursor::new(Box::new(query));
        let mut sink = BatchSink::new();

        match cursor.fill(&mut sink, 2).unwrap() {
            StreamFill::Filled { has_more } => assert!(has_more),
            StreamFill::Waiting => panic!("unexpected suspension"),
        }
        assert_eq!(sink.take_rows(), vec![json!(1), json!(2)]);

        // The last row-bearing batch already knows it is final
        match cursor.fill(&mut sink, 2).unwrap() {
            StreamFill::Filled { has_more } => assert!(!has_more),
            StreamFill::Waiting => panic!("unexpected suspension"),
        }
        assert_eq!(sink.take_rows(), vec![json!(3), json!(4)]);
        assert_eq!(cursor.state(), StreamState::Exhausted);
    }

    #[test]
    fn test_full_batch_waits_for_exhaustion_verdict() {
        let query = MockQuery::new(vec![
            ScriptedStep::Block(vec![json!(1), json!(2)]),
            ScriptedStep::Suspend,
        ]);
        let handle = query.handle();
        let mut cursor = StreamingCursor::new(Box::new(query));
        let mut sink = BatchSink::new();

        // The batch is full, but whether rows follow it is not yet known
        assert!(matches!(
            cursor.fill(&mut sink, 2).unwrap(),
            StreamFill::Waiting
        ));
        assert_eq!(cursor.state(), StreamState::Suspended);
        assert_eq!(sink.len(), 2);

        handle.resume();
        match cursor.fill(&mut sink, 2).unwrap() {
            StreamFill::Filled { has_more } => assert!(!has_more),
            StreamFill::Waiting => panic!("resume should settle the batch"),
        }
        assert_eq!(sink.take_rows(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_suspension_keeps_partial_batch() {
        let query = MockQuery::new(vec![
            ScriptedStep::Block(vec![json!(1)]),
            ScriptedStep::Suspend,
            ScriptedStep::Block(vec![json!(2)]),
        ]);
        let handle = query.handle();
        let mut cursor = StreamingCursor::new(Box::new(query));
        let mut sink = BatchSink::new();

        assert!(matches!(
            cursor.fill(&mut sink, 4).unwrap(),
            StreamFill::Waiting
        ));
        assert_eq!(cursor.state(), StreamState::Suspended);
        assert_eq!(sink.len(), 1);

        handle.resume();
        match cursor.fill(&mut sink, 4).unwrap() {
            StreamFill::Filled { has_more } => assert!(!has_more),
            StreamFill::Waiting => panic!("resume should unblock the fill"),
        }
        assert_eq!(sink.take_rows(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_failure_is_cached() {
        let query = MockQuery::new(vec![ScriptedStep::Fail("conflict".to_string())]);
        let handle = query.handle();
        let mut cursor = StreamingCursor::new(Box::new(query));
        let mut sink = BatchSink::new();

        let err = cursor.fill(&mut sink, 2).unwrap_err();
        assert_eq!(
            err,
            CursorError::Execution(QueryError::Execution("conflict".to_string()))
        );
        assert_eq!(cursor.state(), StreamState::Failed);

        // Re-reported without stepping the execution again
        let again = cursor.fill(&mut sink, 2).unwrap_err();
        assert_eq!(again, err);
        assert_eq!(handle.steps(), 1);
    }

    #[test]
    fn test_kill_stops_fills() {
        let query = MockQuery::new(vec![ScriptedStep::Block(vec![json!(1)])]);
        let handle = query.handle();
        let mut cursor = StreamingCursor::new(Box::new(query));

        cursor.kill();
        assert_eq!(cursor.state(), StreamState::Killed);
        assert!(handle.was_killed());

        let mut sink = BatchSink::new();
        assert_eq!(cursor.fill(&mut sink, 1), Err(CursorError::Killed));
    }

    #[test]
    fn test_budget_failure_requeues_rows() {
        let rows = vec![
            json!("aaaaaaaaaaaaaaaa"),
            json!("bbbbbbbbbbbbbbbb"),
            json!("cccccccccccccccc"),
        ];
        let query = MockQuery::new(vec![ScriptedStep::Block(rows.clone())]);
        let mut cursor = StreamingCursor::new(Box::new(query));

        // Budget fits roughly one row
        let mut sink = BatchSink::with_limit(Some(estimated_size(&rows[0])));
        assert_eq!(
            cursor.fill(&mut sink, 3),
            Err(CursorError::OutOfMemory)
        );
        assert!(sink.is_empty());

        // Nothing was lost: an unbudgeted retry sees every row
        let mut sink = BatchSink::new();
        match cursor.fill(&mut sink, 3).unwrap() {
            StreamFill::Filled { .. } => {}
            StreamFill::Waiting => panic!("unexpected suspension"),
        }
        assert_eq!(sink.take_rows(), rows);
    }
}
