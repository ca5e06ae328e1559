//! Cursor lifecycle for Quarry
//!
//! A cursor turns a query result (fully materialized or still executing)
//! into client-visible batches. The per-database repository shares cursors
//! between request tasks one holder at a time, expires idle ones by TTL,
//! and defers destruction while a cursor is held. Soft shutdown gates
//! creation through the flag injected from `quarry-shutdown`.

mod batch;
mod config;
mod cursor;
mod error;
mod lease;
mod materialized;
pub mod metrics;
mod repository;
mod streaming;

pub use batch::{Batch, BatchSink};
pub use config::{CursorOptions, RepositoryConfig};
pub use cursor::{Cursor, DumpState};
pub use error::{CursorError, Result};
pub use lease::CursorLease;
pub use materialized::MaterializedCursor;
pub use repository::CursorRepository;
pub use streaming::{StreamState, StreamingCursor};
