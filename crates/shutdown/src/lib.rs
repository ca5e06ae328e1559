//! Soft-shutdown coordination for Quarry
//!
//! A soft shutdown stops the server without cutting off in-flight work:
//! creation of new cursors and jobs is refused immediately, while existing
//! ones are allowed to finish or expire. A periodic check watches the
//! registered resource counts and signals once everything has drained, at
//! which point the caller performs the actual process stop.

mod coordinator;
mod flag;
mod status;
mod tracker;

pub use coordinator::SoftShutdownCoordinator;
pub use flag::SoftShutdownFlag;
pub use status::ShutdownStatus;
pub use tracker::ResourceTracker;
