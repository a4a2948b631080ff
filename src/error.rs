//! Error types for the authorization engine

use thiserror::Error;

use crate::types::{PermissionId, RoleId};

/// Result type alias for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Request-time and operational errors
///
/// `PermissionDenied` is a stable value so callers can map it
/// deterministically (e.g. to HTTP 403) and tell it apart from `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("rbac: permission denied")]
    PermissionDenied,

    /// A permission name required under the ALL policy does not exist
    #[error("Unknown permission '{name}'")]
    UnknownPermission { name: String },

    #[error("Unknown check policy '{0}'")]
    UnknownPolicy(String),

    /// The storage backend failed to answer
    #[error("Backend error: {0}")]
    Backend(String),

    /// An administrative operation referenced a missing entity
    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("Invalid name '{0}'")]
    InvalidName(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A mutation would leave the role graph misconfigured
    #[error("Inconsistent configuration: {}", join_errors(.0))]
    Configuration(Vec<LoadError>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthzError {
    fn from(err: anyhow::Error) -> Self {
        AuthzError::Backend(err.to_string())
    }
}

/// Entity kinds named in errors and warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Permission,
    Role,
    Subject,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Permission => write!(f, "Permission"),
            EntityKind::Role => write!(f, "Role"),
            EntityKind::Subject => write!(f, "Subject"),
        }
    }
}

/// Structural configuration errors recorded while building a snapshot
///
/// Each one is scoped to a single role (or permission) and never aborts the
/// resolution of unrelated roles. A role with an error has no bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("Circular role inheritance at '{role}' ({role_id}), path: {path:?}")]
    Cycle {
        role: String,
        role_id: RoleId,
        path: Vec<RoleId>,
    },

    #[error("Role '{role}' references permission {permission_id} which does not exist")]
    UnknownPermission {
        role: String,
        permission_id: PermissionId,
    },

    #[error("Role '{role}' references super role {super_id} which does not exist")]
    UnknownRole { role: String, super_id: RoleId },

    #[error("Role '{role}' has malformed wildcard pattern '{pattern}'")]
    BadWildcard { role: String, pattern: String },

    #[error("Role '{role}' grants mutually exclusive permissions {permission_id} and {conflicting_id}")]
    MutexCollision {
        role: String,
        permission_id: PermissionId,
        conflicting_id: PermissionId,
    },

    #[error("Permission '{name}' ({permission_id}) is mutually exclusive with itself")]
    SelfExclusive {
        permission_id: PermissionId,
        name: String,
    },

    #[error("{kind} '{name}' has the reserved id 0")]
    InvalidId { kind: EntityKind, name: String },
}

/// Non-fatal observations recorded while building a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadWarning {
    #[error("Wildcard '{pattern}' on role '{role}' matches no permission")]
    EmptyWildcard { role: String, pattern: String },

    #[error("Role '{role}' grants no permission")]
    EmptyRole { role: String },

    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: EntityKind, name: String },
}

fn join_errors(errors: &[LoadError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_stable() {
        assert_eq!(AuthzError::PermissionDenied, AuthzError::PermissionDenied);
        assert_ne!(
            AuthzError::PermissionDenied,
            AuthzError::NotFound {
                kind: EntityKind::Role,
                name: "x".to_string()
            }
        );
        assert_eq!(AuthzError::PermissionDenied.to_string(), "rbac: permission denied");
    }

    #[test]
    fn test_cycle_display() {
        let err = LoadError::Cycle {
            role: "role_a".to_string(),
            role_id: 1,
            path: vec![1, 2],
        };
        assert!(err.to_string().contains("role_a"));
        assert!(err.to_string().contains("[1, 2]"));
    }

    #[test]
    fn test_configuration_display_joins_errors() {
        let err = AuthzError::Configuration(vec![
            LoadError::UnknownRole {
                role: "a".to_string(),
                super_id: 9,
            },
            LoadError::BadWildcard {
                role: "b".to_string(),
                pattern: "x*".to_string(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("super role 9"));
        assert!(msg.contains("'x*'"));
        assert!(msg.contains(", "));
    }

    #[test]
    fn test_from_anyhow() {
        let err: AuthzError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err, AuthzError::Backend("connection reset".to_string()));
    }
}
