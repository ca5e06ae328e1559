//! Point-in-time drain status

use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of drain progress, by resource label
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownStatus {
    /// Whether a soft shutdown has begun
    pub soft_shutdown_ongoing: bool,

    /// In-flight work per resource label, summed across trackers
    pub counts: BTreeMap<&'static str, u64>,
}

impl ShutdownStatus {
    /// True once every tracked count has reached zero
    pub fn all_clear(&self) -> bool {
        self.counts.values().all(|count| *count == 0)
    }
}
