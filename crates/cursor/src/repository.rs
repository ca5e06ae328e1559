//! Per-database cursor registry
//!
//! One repository exists per database. It owns every registered cursor,
//! enforces the single-holder rule through leases, expires idle cursors,
//! and defers removal of a leased cursor to the moment its lease comes
//! back. Destroying a cursor can stop a running query, so it always
//! happens outside the registry lock.

use crate::batch::{Batch, BatchSink};
use crate::config::{CursorOptions, RepositoryConfig};
use crate::cursor::Cursor;
use crate::lease::CursorLease;
use crate::metrics::{self, CURSOR_MEMORY_BYTES, OPEN_CURSORS};
use crate::{CursorError, Result};
use parking_lot::Mutex;
use quarry_common::{BatchId, CursorId, Principal};
use quarry_engine::QueryExecution;
use quarry_shutdown::{ResourceTracker, SoftShutdownFlag};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Registry slot for one cursor
struct CursorEntry {
    /// `None` while a lease is out
    cursor: Option<Box<Cursor>>,
    owner: String,
    /// Pushed forward on every check-in; leased cursors never expire
    expires_at: Instant,
    /// Removal arrived while the cursor was leased; applied on check-in
    marked_deleted: bool,
    /// Bytes currently charged to the memory gauge for this cursor
    charged_bytes: usize,
}

pub(crate) struct RepositoryInner {
    database: String,
    cursors: Mutex<HashMap<CursorId, CursorEntry>>,
    shutdown: SoftShutdownFlag,
    config: RepositoryConfig,
}

impl RepositoryInner {
    /// Return a leased cursor to its slot, applying deferred removal
    pub(crate) fn check_in(&self, id: CursorId, cursor: Box<Cursor>) {
        let ttl = cursor.ttl();
        let usage = cursor.memory_usage();
        let discard = cursor.discard_on_release();

        let mut cursors = self.cursors.lock();
        let Some(entry) = cursors.get_mut(&id) else {
            drop(cursors);
            tracing::warn!("cursor {} returned after forced cleanup", id);
            Self::destroy_cursor(cursor);
            return;
        };

        if entry.marked_deleted || discard {
            let charged = entry.charged_bytes;
            cursors.remove(&id);
            drop(cursors);

            OPEN_CURSORS.dec();
            CURSOR_MEMORY_BYTES.sub(charged as i64);
            Self::destroy_cursor(cursor);
            return;
        }

        CURSOR_MEMORY_BYTES.add(usage as i64 - entry.charged_bytes as i64);
        entry.charged_bytes = usage;
        entry.expires_at = Instant::now() + ttl;
        entry.cursor = Some(cursor);
    }

    /// Detach doomed cursors under the lock; destroying them is the
    /// caller's job
    fn collect_victims(&self, force: bool) -> Vec<Box<Cursor>> {
        let now = Instant::now();
        let limit = self.config.gc_scan_limit;

        let mut cursors = self.cursors.lock();

        let mut doomed = Vec::new();
        for (id, entry) in cursors.iter() {
            if doomed.len() >= limit {
                break;
            }
            // A leased cursor is the holder's business until check-in
            if entry.cursor.is_none() {
                continue;
            }
            if force || entry.marked_deleted || entry.expires_at <= now {
                doomed.push(*id);
            }
        }

        let mut victims = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(CursorEntry {
                cursor: Some(cursor),
                charged_bytes,
                ..
            }) = cursors.remove(&id)
            {
                OPEN_CURSORS.dec();
                CURSOR_MEMORY_BYTES.sub(charged_bytes as i64);
                victims.push(cursor);
            }
        }
        victims
    }

    /// Doom every remaining entry; each is destroyed when its lease
    /// comes back
    fn mark_all_deleted(&self) {
        let mut cursors = self.cursors.lock();
        for entry in cursors.values_mut() {
            entry.marked_deleted = true;
        }
    }

    fn destroy_cursor(mut cursor: Box<Cursor>) {
        cursor.kill();
        tracing::debug!("destroyed cursor {}", cursor.id());
    }
}

impl Drop for RepositoryInner {
    fn drop(&mut self) {
        // No lease can outlive the inner: every lease holds an Arc to it
        let cursors = self.cursors.get_mut();
        for (_, entry) in cursors.drain() {
            if let Some(mut cursor) = entry.cursor {
                cursor.kill();
                OPEN_CURSORS.dec();
                CURSOR_MEMORY_BYTES.sub(entry.charged_bytes as i64);
            }
        }
    }
}

/// Per-database registry of open cursors
#[derive(Clone)]
pub struct CursorRepository {
    inner: Arc<RepositoryInner>,
}

impl CursorRepository {
    pub fn new(database: impl Into<String>, shutdown: SoftShutdownFlag) -> Self {
        Self::with_config(database, shutdown, RepositoryConfig::default())
    }

    pub fn with_config(
        database: impl Into<String>,
        shutdown: SoftShutdownFlag,
        config: RepositoryConfig,
    ) -> Self {
        metrics::register_metrics();

        Self {
            inner: Arc::new(RepositoryInner {
                database: database.into(),
                cursors: Mutex::new(HashMap::new()),
                shutdown,
                config,
            }),
        }
    }

    pub fn database(&self) -> &str {
        &self.inner.database
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    /// Number of registered cursors, leased ones included
    pub fn count(&self) -> usize {
        self.inner.cursors.lock().len()
    }

    /// Register a cursor over a fully computed result
    ///
    /// The new cursor comes back already leased to the caller, who
    /// typically dumps the first batch before releasing it.
    pub fn create_from_result(
        &self,
        rows: Vec<Value>,
        extra: Option<Value>,
        options: &CursorOptions,
        principal: &Principal,
    ) -> Result<CursorLease> {
        if self.inner.shutdown.is_set() {
            return Err(CursorError::ShuttingDown);
        }

        let cursor = Cursor::materialized(CursorId::new(), rows, extra, options);
        Ok(self.install(cursor, principal))
    }

    /// Register a cursor over a still-running query
    pub fn create_from_query(
        &self,
        execution: Box<dyn QueryExecution>,
        extra: Option<Value>,
        options: &CursorOptions,
        principal: &Principal,
    ) -> Result<CursorLease> {
        if self.inner.shutdown.is_set() {
            return Err(CursorError::ShuttingDown);
        }

        let cursor = Cursor::streaming(CursorId::new(), execution, extra, options);
        Ok(self.install(cursor, principal))
    }

    fn install(&self, cursor: Cursor, principal: &Principal) -> CursorLease {
        let id = cursor.id();
        let ttl = cursor.ttl();
        let usage = cursor.memory_usage();

        {
            let mut cursors = self.inner.cursors.lock();
            cursors.insert(
                id,
                CursorEntry {
                    cursor: None,
                    owner: principal.name().to_string(),
                    expires_at: Instant::now() + ttl,
                    marked_deleted: false,
                    charged_bytes: usage,
                },
            );
        }

        OPEN_CURSORS.inc();
        CURSOR_MEMORY_BYTES.add(usage as i64);
        tracing::debug!("created cursor {} in database {}", id, self.inner.database);

        CursorLease::new(self.inner.clone(), id, Box::new(cursor))
    }

    /// Check out a cursor for exclusive use
    ///
    /// Absent, expired, foreign and delete-marked cursors all come back
    /// as `NotFound`; a cursor checked out elsewhere is `Busy`.
    pub fn acquire(&self, id: CursorId, principal: &Principal) -> Result<CursorLease> {
        let mut cursors = self.inner.cursors.lock();

        let entry = cursors.get_mut(&id).ok_or(CursorError::NotFound)?;
        if !principal.can_access(&entry.owner) || entry.marked_deleted {
            return Err(CursorError::NotFound);
        }

        let Some(cursor) = entry.cursor.take() else {
            return Err(CursorError::Busy);
        };

        if entry.expires_at <= Instant::now() {
            // Left registered; the collector erases expired cursors
            entry.cursor = Some(cursor);
            return Err(CursorError::NotFound);
        }

        Ok(CursorLease::new(self.inner.clone(), id, cursor))
    }

    /// Remove a cursor, destroying it
    ///
    /// Removing a leased cursor is deferred: the entry is marked and the
    /// destruction runs when the lease comes back. Either way the cursor
    /// is unreachable from the moment this returns.
    pub fn remove(&self, id: CursorId, principal: &Principal) -> Result<()> {
        let mut cursors = self.inner.cursors.lock();

        let entry = cursors.get_mut(&id).ok_or(CursorError::NotFound)?;
        if !principal.can_access(&entry.owner) || entry.marked_deleted {
            return Err(CursorError::NotFound);
        }

        let Some(cursor) = entry.cursor.take() else {
            entry.marked_deleted = true;
            tracing::debug!("cursor {} removal deferred until release", id);
            return Ok(());
        };

        let charged = entry.charged_bytes;
        cursors.remove(&id);
        drop(cursors);

        OPEN_CURSORS.dec();
        CURSOR_MEMORY_BYTES.sub(charged as i64);
        RepositoryInner::destroy_cursor(cursor);
        tracing::debug!("removed cursor {}", id);
        Ok(())
    }

    /// Sweep expired and delete-marked cursors
    ///
    /// With `force`, every unleased cursor is doomed regardless of
    /// expiry; the drain loop uses this. Collects at most
    /// `gc_scan_limit` cursors per call so one sweep cannot stall the
    /// caller. Returns whether anything was collected.
    pub fn garbage_collect(&self, force: bool) -> bool {
        let victims = self.inner.collect_victims(force);
        if victims.is_empty() {
            return false;
        }

        tracing::debug!(
            "collecting {} cursors in database {}",
            victims.len(),
            self.inner.database
        );
        for cursor in victims {
            RepositoryInner::destroy_cursor(cursor);
        }
        true
    }

    /// Fetch a batch, serving retries from the cached last batch
    ///
    /// With `batch_id` absent the next batch is produced. With it
    /// present, the current batch id re-serves the cached batch, the
    /// next id advances the cursor, and anything else is `NotFound`.
    ///
    /// Dropping the returned future at a suspension point (a caller
    /// timeout) loses nothing: rows already drawn for the unfinished
    /// batch go back to the cursor, and the batch id stays put, so a
    /// later fetch delivers them.
    pub async fn fetch_batch(
        &self,
        id: CursorId,
        batch_id: Option<BatchId>,
        principal: &Principal,
    ) -> Result<Batch> {
        let mut lease = self.acquire(id, principal)?;

        if let Some(requested) = batch_id {
            if lease.is_current_batch_id(requested) {
                return lease.last_batch().cloned().ok_or(CursorError::NotFound);
            }
            if !lease.is_next_batch_id(requested) {
                return Err(CursorError::NotFound);
            }
        }

        // Declared after the lease so it is dropped first: abandoned
        // rows are back on the cursor before the lease checks it in.
        let mut pending = PendingBatch {
            lease: &mut lease,
            sink: BatchSink::with_limit(self.inner.config.batch_memory_limit),
        };
        pending.dump().await
    }

    /// Periodic expiry sweep until the handle is aborted
    pub fn spawn_gc_task(&self, interval: Duration) -> JoinHandle<()> {
        let repository = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                repository.garbage_collect(false);
            }
        })
    }

    /// Force-collect until every cursor is gone
    ///
    /// Leased cursors cannot be collected, so the loop polls to pick up
    /// their release. After `drain_poll_limit` polls the remaining
    /// entries are marked deleted and the wait ends; the outstanding
    /// leases destroy them on check-in.
    pub async fn shutdown(&self) {
        let mut polls: usize = 0;

        loop {
            self.garbage_collect(true);
            if self.count() == 0 {
                return;
            }

            polls += 1;
            if polls >= self.inner.config.drain_poll_limit {
                tracing::error!(
                    "database {}: {} cursors still leased after drain window, abandoning wait",
                    self.inner.database,
                    self.count()
                );
                self.inner.mark_all_deleted();
                return;
            }
            if polls % 100 == 0 {
                tracing::warn!(
                    "database {}: waiting on {} leased cursors",
                    self.inner.database,
                    self.count()
                );
            }

            tokio::time::sleep(self.inner.config.drain_poll_interval).await;
        }
    }
}

impl ResourceTracker for CursorRepository {
    fn label(&self) -> &'static str {
        "cursors"
    }

    fn in_flight(&self) -> u64 {
        self.count() as u64
    }
}

/// A batch being assembled, tied to the lease it draws from
///
/// A fetch future can be dropped at any await. Rows pulled off the
/// cursor for a batch that was never delivered must not vanish with the
/// sink, so the drop handler returns them.
struct PendingBatch<'a> {
    lease: &'a mut CursorLease,
    sink: BatchSink,
}

impl PendingBatch<'_> {
    async fn dump(&mut self) -> Result<Batch> {
        self.lease.dump(&mut self.sink).await
    }
}

impl Drop for PendingBatch<'_> {
    fn drop(&mut self) {
        // Empty after a delivered batch and after a budget abort; rows
        // remain only when the future was cancelled mid-batch.
        if !self.sink.is_empty() {
            self.lease.reclaim(&mut self.sink);
        }
    }
}
