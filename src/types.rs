//! Core RBAC entity types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::AuthzError;

/// Backend-assigned permission identifier (0 is never a valid id)
pub type PermissionId = u32;

/// Backend-assigned role identifier (0 is never a valid id)
pub type RoleId = u32;

/// Opaque numeric subject identifier
pub type SubjectId = i64;

/// An atomic, named capability
///
/// Names are dot-segmented (e.g. `"billing.invoice.read"`), which is what
/// wildcard patterns such as `"billing.*"` match against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,

    /// Permissions that may never be granted together with this one.
    /// The relation is treated as symmetric when a snapshot is built.
    #[serde(default)]
    pub mutex_with: BTreeSet<PermissionId>,
}

impl Permission {
    pub fn new(id: PermissionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mutex_with: BTreeSet::new(),
        }
    }

    /// Declare a permission this one is mutually exclusive with
    pub fn with_mutex(mut self, other: PermissionId) -> Self {
        self.mutex_with.insert(other);
        self
    }
}

/// A named bundle of permissions and inheritance relationships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,

    /// Roles whose permissions this role inherits
    #[serde(default)]
    pub super_ids: BTreeSet<RoleId>,

    #[serde(default)]
    pub permission_ids: BTreeSet<PermissionId>,

    /// Prefix patterns (`"*"` or `"segment.*"`) expanded at resolution time
    #[serde(default)]
    pub wildcards: BTreeSet<String>,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            super_ids: BTreeSet::new(),
            permission_ids: BTreeSet::new(),
            wildcards: BTreeSet::new(),
        }
    }

    pub fn with_super(mut self, role: RoleId) -> Self {
        self.super_ids.insert(role);
        self
    }

    pub fn with_permission(mut self, permission: PermissionId) -> Self {
        self.permission_ids.insert(permission);
        self
    }

    pub fn with_wildcard(mut self, pattern: impl Into<String>) -> Self {
        self.wildcards.insert(pattern.into());
        self
    }
}

/// How a multi-permission check combines its requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckPolicy {
    /// Every requested permission must be granted
    All,
    /// At least one requested permission must be granted
    Any,
}

impl fmt::Display for CheckPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckPolicy::All => write!(f, "all"),
            CheckPolicy::Any => write!(f, "any"),
        }
    }
}

impl FromStr for CheckPolicy {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(CheckPolicy::All),
            "any" => Ok(CheckPolicy::Any),
            _ => Err(AuthzError::UnknownPolicy(s.to_string())),
        }
    }
}
