//! The cursor proper: batch accounting over either result variant
//!
//! A cursor hands out numbered batches of rows. Batch ids start at 1 and
//! advance by one per produced batch; a retriable cursor additionally
//! keeps the most recent batch so a client can re-fetch it after a lost
//! response.

use crate::batch::{Batch, BatchSink};
use crate::config::CursorOptions;
use crate::materialized::MaterializedCursor;
use crate::streaming::{StreamFill, StreamState, StreamingCursor};
use crate::Result;
use quarry_common::{BatchId, CursorId};
use quarry_engine::QueryExecution;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Outcome of a single non-blocking dump attempt
#[derive(Debug, PartialEq)]
pub enum DumpState {
    /// A complete batch was produced
    Done(Batch),
    /// The underlying execution is suspended; retry after its wakeup
    Waiting,
}

enum Variant {
    Materialized(MaterializedCursor),
    Streaming(StreamingCursor),
}

/// A registered query result with batched, ordered delivery
pub struct Cursor {
    id: CursorId,
    batch_size: usize,
    ttl: Duration,
    has_count: bool,
    retriable: bool,

    /// Id of the most recently produced batch; 0 before the first dump
    current_batch_id: u64,
    /// Only kept on retriable cursors
    last_batch: Option<Batch>,
    /// Set once the final batch has been produced
    finished: bool,

    /// Reported alongside the final batch (statistics, warnings)
    extra: Option<Value>,

    variant: Variant,
}

impl Cursor {
    /// Cursor over a fully computed result set
    pub(crate) fn materialized(
        id: CursorId,
        rows: Vec<Value>,
        extra: Option<Value>,
        options: &CursorOptions,
    ) -> Self {
        Self::new(
            id,
            Variant::Materialized(MaterializedCursor::new(rows)),
            extra,
            options,
            options.has_count,
        )
    }

    /// Cursor over a query that produces rows as it runs
    pub(crate) fn streaming(
        id: CursorId,
        execution: Box<dyn QueryExecution>,
        extra: Option<Value>,
        options: &CursorOptions,
    ) -> Self {
        // The total row count is unknowable before the query finishes
        Self::new(
            id,
            Variant::Streaming(StreamingCursor::new(execution)),
            extra,
            options,
            false,
        )
    }

    fn new(
        id: CursorId,
        variant: Variant,
        extra: Option<Value>,
        options: &CursorOptions,
        has_count: bool,
    ) -> Self {
        Self {
            id,
            batch_size: options.batch_size.max(1),
            ttl: options.ttl,
            has_count,
            retriable: options.retriable,
            current_batch_id: 0,
            last_batch: None,
            finished: false,
            extra,
            variant,
        }
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_retriable(&self) -> bool {
        self.retriable
    }

    /// True once the final batch has been produced
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Total rows, if requested at creation and knowable
    pub fn count(&self) -> Option<u64> {
        match &self.variant {
            Variant::Materialized(cursor) if self.has_count => Some(cursor.total()),
            _ => None,
        }
    }

    /// Estimated bytes held by undelivered rows
    pub fn memory_usage(&self) -> usize {
        match &self.variant {
            Variant::Materialized(cursor) => cursor.memory_usage(),
            Variant::Streaming(cursor) => cursor.memory_usage(),
        }
    }

    /// Execution status, for streaming cursors
    pub fn stream_state(&self) -> Option<StreamState> {
        match &self.variant {
            Variant::Materialized(_) => None,
            Variant::Streaming(cursor) => Some(cursor.state()),
        }
    }

    /// Stop the underlying execution
    pub fn kill(&mut self) {
        match &mut self.variant {
            // Materialized cursors have no execution to stop
            Variant::Materialized(_) => {}
            Variant::Streaming(cursor) => cursor.kill(),
        }
    }

    /// Wakeup signal of the underlying execution, for poll-style callers
    ///
    /// After [`Cursor::poll_dump`] returns [`DumpState::Waiting`], this
    /// signal fires once the execution can make progress again. Create
    /// the `notified()` future before polling, or a resume landing in
    /// between goes unseen. `None` for materialized cursors, which never
    /// wait.
    pub fn wakeup(&self) -> Option<Arc<Notify>> {
        match &self.variant {
            Variant::Materialized(_) => None,
            Variant::Streaming(cursor) => Some(cursor.wakeup()),
        }
    }

    /// Hand the rows of an undelivered batch back to the variant
    ///
    /// The sink must hold exactly what the most recent unfinished fill
    /// drew from this cursor. The batch id has not advanced past those
    /// rows, so the next dump delivers them again.
    pub(crate) fn reclaim(&mut self, sink: &mut BatchSink) {
        match &mut self.variant {
            Variant::Materialized(cursor) => cursor.rewind(sink.take_rows().len()),
            Variant::Streaming(cursor) => cursor.reclaim(sink),
        }
    }

    /// Whether `batch_id` names the batch most recently produced
    ///
    /// Only retriable cursors keep that batch around, so this is always
    /// false on a non-retriable cursor.
    pub fn is_current_batch_id(&self, batch_id: BatchId) -> bool {
        self.retriable && batch_id.as_u64() == self.current_batch_id
    }

    /// Whether `batch_id` names the batch a dump would produce next
    pub fn is_next_batch_id(&self, batch_id: BatchId) -> bool {
        batch_id.as_u64() == self.current_batch_id + 1
    }

    /// The cached most recent batch, on retriable cursors
    pub fn last_batch(&self) -> Option<&Batch> {
        self.last_batch.as_ref()
    }

    /// Whether a release should destroy the cursor instead of keeping it
    ///
    /// A finished retriable cursor stays registered so the final batch
    /// can still be re-fetched; the client disposes it explicitly.
    pub(crate) fn discard_on_release(&self) -> bool {
        self.finished && !self.retriable
    }

    /// Produce the next batch without blocking
    ///
    /// Returns [`DumpState::Waiting`] when the execution is suspended;
    /// rows collected so far stay in the sink and the batch id does not
    /// advance until the batch completes.
    pub fn poll_dump(&mut self, sink: &mut BatchSink) -> Result<DumpState> {
        let has_more = match &mut self.variant {
            Variant::Materialized(cursor) => cursor.fill(sink, self.batch_size)?,
            Variant::Streaming(cursor) => match cursor.fill(sink, self.batch_size)? {
                StreamFill::Filled { has_more } => has_more,
                StreamFill::Waiting => return Ok(DumpState::Waiting),
            },
        };

        Ok(DumpState::Done(self.finish_batch(sink, has_more)))
    }

    /// Produce the next batch, waiting out suspensions of the execution
    pub async fn dump(&mut self, sink: &mut BatchSink) -> Result<Batch> {
        let wakeup = self.wakeup();

        loop {
            // CRITICAL: create the notified future BEFORE polling. A
            // resume that lands between the poll and the await is then
            // still observed. This prevents lost wakeups.
            let notified = wakeup.as_ref().map(|w| w.notified());

            match self.poll_dump(sink)? {
                DumpState::Done(batch) => return Ok(batch),
                DumpState::Waiting => match notified {
                    Some(notified) => notified.await,
                    None => unreachable!("materialized cursors never report waiting"),
                },
            }
        }
    }

    fn finish_batch(&mut self, sink: &mut BatchSink, has_more: bool) -> Batch {
        self.current_batch_id += 1;
        self.finished = !has_more;

        let batch = Batch {
            batch_id: BatchId::new(self.current_batch_id),
            rows: sink.take_rows(),
            has_more,
            count: self.count(),
            extra: if has_more { None } else { self.extra.clone() },
        };

        if self.retriable {
            self.last_batch = Some(batch.clone());
        }
        batch
    }
}
