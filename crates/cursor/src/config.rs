//! Repository and cursor configuration

use std::time::Duration;

/// Tuning knobs for a cursor repository
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Upper bound on cursors destroyed in one garbage collection pass
    pub gc_scan_limit: usize,

    /// Byte budget for a single batch; exceeding it aborts the batch
    pub batch_memory_limit: Option<usize>,

    /// Pause between drain checks while shutting the repository down
    pub drain_poll_interval: Duration,

    /// Drain checks before giving up on straggling leases
    pub drain_poll_limit: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            gc_scan_limit: 1024,
            batch_memory_limit: None,
            drain_poll_interval: Duration::from_millis(10),
            drain_poll_limit: 1000,
        }
    }
}

impl RepositoryConfig {
    /// Set the garbage collection batch bound
    pub fn with_gc_scan_limit(mut self, limit: usize) -> Self {
        self.gc_scan_limit = limit;
        self
    }

    /// Set the per-batch memory budget
    pub fn with_batch_memory_limit(mut self, limit: usize) -> Self {
        self.batch_memory_limit = Some(limit);
        self
    }

    /// Set the drain poll interval
    pub fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    /// Set the number of drain checks before giving up
    pub fn with_drain_poll_limit(mut self, limit: usize) -> Self {
        self.drain_poll_limit = limit;
        self
    }
}

/// Per-cursor creation options
#[derive(Debug, Clone)]
pub struct CursorOptions {
    /// Rows per batch; zero is treated as one
    pub batch_size: usize,

    /// Idle time after which the cursor may be collected
    pub ttl: Duration,

    /// Report the total result count with every batch (materialized only)
    pub has_count: bool,

    /// Keep the delivered batch so clients may re-request it by id
    pub retriable: bool,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            ttl: Duration::from_secs(30),
            has_count: false,
            retriable: false,
        }
    }
}

impl CursorOptions {
    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the idle TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Request the total result count on every batch
    pub fn with_count(mut self, has_count: bool) -> Self {
        self.has_count = has_count;
        self
    }

    /// Allow clients to re-request the current batch by id
    pub fn with_retriable(mut self, retriable: bool) -> Self {
        self.retriable = retriable;
        self
    }
}
