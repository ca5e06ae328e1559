//! Shared soft-shutdown flag
//!
//! The flag is the one piece of shutdown state that hot paths read: cursor
//! and job factories refuse new work while it is set. Each subsystem gets
//! a clone at construction time; nothing reads global state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cheap-to-clone handle to the soft-shutdown state
#[derive(Debug, Clone, Default)]
pub struct SoftShutdownFlag {
    initiated: Arc<AtomicBool>,
}

impl SoftShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a soft shutdown has begun
    pub fn is_set(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Set the flag; returns false when it was already set
    pub(crate) fn set(&self) -> bool {
        !self.initiated.swap(true, Ordering::SeqCst)
    }
}
