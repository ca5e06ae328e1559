//! Common types for Quarry
//!
//! This crate defines:
//! - Cursor IDs (UUIDv7-based)
//! - Batch sequence numbers for the cursor retry protocol
//! - Request principals (named users and the superuser)

mod batch_id;
mod cursor_id;
mod principal;

pub use batch_id::BatchId;
pub use cursor_id::CursorId;
pub use principal::Principal;
