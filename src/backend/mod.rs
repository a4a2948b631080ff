//! Storage backend contracts
//!
//! The engine never writes to storage. It only re-derives state through the
//! three read operations of [`Backend`]. Mutations live on [`AdminBackend`]
//! and are used by the administrative batch model in [`crate::admin`].

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Permission, PermissionId, Role, RoleId, SubjectId};

pub mod memory;

pub use memory::InMemoryBackend;

/// Read-side storage contract consumed by the engine
#[async_trait]
pub trait Backend: Send + Sync {
    /// Every live permission (soft-deleted entries excluded)
    async fn get_all_permissions(&self) -> Result<Vec<Permission>>;

    /// Every live role (soft-deleted entries excluded)
    async fn get_all_roles(&self) -> Result<Vec<Role>>;

    /// Role ids currently assigned to a subject.
    ///
    /// Called on every check, so implementations should answer from an index.
    async fn get_subject_role_ids(&self, subject: SubjectId) -> Result<Vec<RoleId>>;
}

/// Write-side storage contract
///
/// All operations address entities by name. Creating an existing name and
/// deleting a missing one are no-ops; relation mutations fail with
/// `AuthzError::NotFound` when a referenced entity does not exist.
///
/// Deleting a permission or role also detaches it from every live role,
/// permission and subject that referenced it.
#[async_trait]
pub trait AdminBackend: Backend {
    async fn new_permission(&self, name: &str) -> Result<PermissionId>;
    async fn del_permission(&self, name: &str) -> Result<()>;

    async fn new_role(&self, name: &str) -> Result<RoleId>;
    async fn del_role(&self, name: &str) -> Result<()>;

    async fn role_add_permission(&self, role: &str, permission: &str) -> Result<()>;
    async fn role_del_permission(&self, role: &str, permission: &str) -> Result<()>;

    async fn role_add_super(&self, role: &str, super_role: &str) -> Result<()>;
    async fn role_del_super(&self, role: &str, super_role: &str) -> Result<()>;

    async fn role_add_wildcard(&self, role: &str, pattern: &str) -> Result<()>;
    async fn role_del_wildcard(&self, role: &str, pattern: &str) -> Result<()>;

    async fn permission_add_mutex(&self, permission: &str, other: &str) -> Result<()>;
    async fn permission_del_mutex(&self, permission: &str, other: &str) -> Result<()>;

    async fn subject_add_role(&self, subject: SubjectId, role: &str) -> Result<()>;
    async fn subject_del_role(&self, subject: SubjectId, role: &str) -> Result<()>;
}
