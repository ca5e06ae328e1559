//! Exclusive checkout of a registered cursor
//!
//! While a lease is out its holder is the only user of the cursor; the
//! registry keeps just the reservation. Dropping the lease (or calling
//! [`CursorLease::release`]) checks the cursor back in, which also
//! applies any removal that was deferred while the lease was held.

use crate::cursor::Cursor;
use crate::repository::RepositoryInner;
use quarry_common::CursorId;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Exclusive handle on a checked-out cursor
pub struct CursorLease {
    repository: Arc<RepositoryInner>,
    id: CursorId,
    /// Always `Some` until drop
    cursor: Option<Box<Cursor>>,
}

impl CursorLease {
    pub(crate) fn new(
        repository: Arc<RepositoryInner>,
        id: CursorId,
        cursor: Box<Cursor>,
    ) -> Self {
        Self {
            repository,
            id,
            cursor: Some(cursor),
        }
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    /// Check the cursor back in, making the handback explicit
    pub fn release(self) {}
}

impl Deref for CursorLease {
    type Target = Cursor;

    fn deref(&self) -> &Cursor {
        self.cursor.as_deref().expect("cursor present until drop")
    }
}

impl DerefMut for CursorLease {
    fn deref_mut(&mut self) -> &mut Cursor {
        self.cursor.as_deref_mut().expect("cursor present until drop")
    }
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.repository.check_in(self.id, cursor);
        }
    }
}
