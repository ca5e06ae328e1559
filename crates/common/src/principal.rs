//! Request principals
//!
//! Every cursor operation is performed on behalf of a principal: a named
//! database user, or the internal superuser that maintenance paths run as.
//! Cursors are private to the user that created them; the superuser can
//! reach any cursor.

use serde::{Deserialize, Serialize};

/// The identity a request runs as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    superuser: bool,
}

impl Principal {
    /// A named database user
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superuser: false,
        }
    }

    /// The internal superuser (maintenance tasks, inter-node requests)
    pub fn superuser() -> Self {
        Self {
            name: String::new(),
            superuser: true,
        }
    }

    /// User name; empty for the superuser
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    /// Whether this principal may touch a resource owned by `owner`
    pub fn can_access(&self, owner: &str) -> bool {
        self.superuser || self.name == owner
    }
}
