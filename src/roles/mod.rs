//! Role hierarchy and the cached role authority.

mod authority;

pub use authority::{ReconcileReport, RoleAuthority};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoleError;

/// Roles in ascending order of privilege.
///
/// A holder satisfies every role at or below its own. `Void` marks a caller
/// with a valid signature and no user record; it is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Void,
    User,
    Admin,
    Root,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::User => "user",
            Self::Admin => "admin",
            Self::Root => "root",
        }
    }

    /// Parse a value read back from the user table.
    pub fn parse_stored(value: &str) -> Result<Self, RoleError> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "root" => Ok(Self::Root),
            other => Err(RoleError::UnknownRole(other.to_string())),
        }
    }

    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }

    /// The string written to storage. Void has none.
    pub fn storage_value(self) -> Result<&'static str, RoleError> {
        match self {
            Self::Void => Err(RoleError::VoidNotPersistable),
            other => Ok(other.as_str()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
