//! Resource accounting for the drain check

/// A subsystem whose in-flight work must drain before the process stops
///
/// Cursor repositories, the transaction registry, and the async job queue
/// each implement this. Counts reported under the same label are summed by
/// the coordinator (one cursor repository per database, all reporting as
/// `"cursors"`).
pub trait ResourceTracker: Send + Sync {
    /// Stable label for logs and the status snapshot
    fn label(&self) -> &'static str;

    /// Units of in-flight work still alive
    fn in_flight(&self) -> u64;
}
