//! Role model and write-access checks
//!
//! Roles are a closed set mapped from the surrounding application at the
//! boundary via [`Role::parse`]. Every stored entity carries an
//! `access_roles` set; write operations are rejected with
//! [`CoreError::Forbidden`] when the caller's role is not in that set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Operator role, as defined by the surrounding application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Engineer,
    Viewer,
}

impl Role {
    /// Map a role string from the application boundary to the closed set.
    ///
    /// Returns `None` for anything that is not an exact role name, instead
    /// of guessing from substrings.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "engineer" => Some(Role::Engineer),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Engineer => "engineer",
            Role::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity attached to every write operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub name: String,
    pub role: Role,
}

impl Caller {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// Check a caller against an entity's access set.
pub fn ensure_write_access(access_roles: &HashSet<Role>, caller: &Caller) -> CoreResult<()> {
    if access_roles.contains(&caller.role) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "role {} may not modify this entity",
            caller.role
        )))
    }
}

/// The default access set for operator-managed entities.
pub fn default_access_roles() -> HashSet<Role> {
    HashSet::from([Role::Admin, Role::Manager, Role::Engineer])
}
