//! In-memory storage backend with tombstone soft-deletes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AdminBackend, Backend};
use crate::error::{AuthzError, EntityKind, Result};
use crate::types::{Permission, PermissionId, Role, RoleId, SubjectId};

#[derive(Debug, Clone)]
struct Record<T> {
    value: T,
    deleted_at: Option<DateTime<Utc>>,
}

impl<T> Record<T> {
    fn live(value: T) -> Self {
        Self {
            value,
            deleted_at: None,
        }
    }

    fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Default)]
struct Store {
    permissions: IndexMap<PermissionId, Record<Permission>>,
    roles: IndexMap<RoleId, Record<Role>>,
    next_permission_id: PermissionId,
    next_role_id: RoleId,
}

impl Store {
    fn permission_id(&self, name: &str) -> Option<PermissionId> {
        self.permissions
            .values()
            .find(|r| r.is_live() && r.value.name == name)
            .map(|r| r.value.id)
    }

    fn role_id(&self, name: &str) -> Option<RoleId> {
        self.roles
            .values()
            .find(|r| r.is_live() && r.value.name == name)
            .map(|r| r.value.id)
    }

    fn require_permission(&self, name: &str) -> Result<PermissionId> {
        self.permission_id(name).ok_or_else(|| AuthzError::NotFound {
            kind: EntityKind::Permission,
            name: name.to_string(),
        })
    }

    fn require_role(&self, name: &str) -> Result<RoleId> {
        self.role_id(name).ok_or_else(|| AuthzError::NotFound {
            kind: EntityKind::Role,
            name: name.to_string(),
        })
    }

    fn role_mut(&mut self, name: &str) -> Result<&mut Role> {
        let id = self.require_role(name)?;
        self.roles
            .get_mut(&id)
            .map(|r| &mut r.value)
            .ok_or_else(|| AuthzError::Internal(format!("role index out of sync for '{}'", name)))
    }
}

/// Thread-safe in-memory backend
///
/// Ids are assigned from 1 upward and never reused. Deleted entities keep
/// their record with a tombstone and a rewritten name so the original name
/// can be created again.
///
/// # Examples
///
/// ```rust
/// use bitmap_rbac::backend::{AdminBackend, InMemoryBackend};
///
/// # async fn example() -> bitmap_rbac::Result<()> {
/// let backend = InMemoryBackend::new();
/// backend.new_permission("docs.read").await?;
/// backend.new_role("viewer").await?;
/// backend.role_add_permission("viewer", "docs.read").await?;
/// backend.subject_add_role(1, "viewer").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    store: Arc<RwLock<Store>>,
    subjects: DashMap<SubjectId, Vec<RoleId>>,
    enumerations: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a permission with a caller-chosen id, replacing any record with that id.
    ///
    /// Bypasses name validation so tests can build arbitrary graphs.
    pub async fn seed_permission(&self, permission: Permission) {
        let mut store = self.store.write().await;
        store.next_permission_id = store.next_permission_id.max(permission.id);
        store.permissions.insert(permission.id, Record::live(permission));
    }

    /// Inserts a role with a caller-chosen id, replacing any record with that id.
    pub async fn seed_role(&self, role: Role) {
        let mut store = self.store.write().await;
        store.next_role_id = store.next_role_id.max(role.id);
        store.roles.insert(role.id, Record::live(role));
    }

    /// Replaces a subject's role assignment with raw ids
    pub fn set_subject_roles(&self, subject: SubjectId, roles: Vec<RoleId>) {
        self.subjects.insert(subject, roles);
    }

    /// Number of full enumerations served (one per permission or role listing)
    pub fn enumeration_count(&self) -> u64 {
        self.enumerations.load(Ordering::Relaxed)
    }

    /// Tombstoned permissions, for auditing
    pub async fn deleted_permissions(&self) -> Vec<(Permission, DateTime<Utc>)> {
        let store = self.store.read().await;
        store
            .permissions
            .values()
            .filter_map(|r| r.deleted_at.map(|at| (r.value.clone(), at)))
            .collect()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn get_all_permissions(&self) -> Result<Vec<Permission>> {
        self.enumerations.fetch_add(1, Ordering::Relaxed);
        let store = self.store.read().await;
        Ok(store
            .permissions
            .values()
            .filter(|r| r.is_live())
            .map(|r| r.value.clone())
            .collect())
    }

    async fn get_all_roles(&self) -> Result<Vec<Role>> {
        self.enumerations.fetch_add(1, Ordering::Relaxed);
        let store = self.store.read().await;
        Ok(store
            .roles
            .values()
            .filter(|r| r.is_live())
            .map(|r| r.value.clone())
            .collect())
    }

    async fn get_subject_role_ids(&self, subject: SubjectId) -> Result<Vec<RoleId>> {
        Ok(self
            .subjects
            .get(&subject)
            .map(|roles| roles.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl AdminBackend for InMemoryBackend {
    async fn new_permission(&self, name: &str) -> Result<PermissionId> {
        let mut store = self.store.write().await;
        if let Some(id) = store.permission_id(name) {
            return Ok(id);
        }
        store.next_permission_id += 1;
        let id = store.next_permission_id;
        store.permissions.insert(id, Record::live(Permission::new(id, name)));
        Ok(id)
    }

    async fn del_permission(&self, name: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let Some(id) = store.permission_id(name) else {
            return Ok(());
        };
        if let Some(record) = store.permissions.get_mut(&id) {
            record.value.name = format!("Deleted<{}>.({})", name, id);
            record.deleted_at = Some(Utc::now());
        }

        // detach the tombstone from every live reference
        for record in store.roles.values_mut().filter(|r| r.is_live()) {
            record.value.permission_ids.remove(&id);
        }
        for record in store.permissions.values_mut().filter(|r| r.is_live()) {
            record.value.mutex_with.remove(&id);
        }
        Ok(())
    }

    async fn new_role(&self, name: &str) -> Result<RoleId> {
        let mut store = self.store.write().await;
        if let Some(id) = store.role_id(name) {
            return Ok(id);
        }
        store.next_role_id += 1;
        let id = store.next_role_id;
        store.roles.insert(id, Record::live(Role::new(id, name)));
        Ok(id)
    }

    async fn del_role(&self, name: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let Some(id) = store.role_id(name) else {
            return Ok(());
        };
        if let Some(record) = store.roles.get_mut(&id) {
            record.value.name = format!("Deleted<{}>.({})", name, id);
            record.deleted_at = Some(Utc::now());
        }

        for record in store.roles.values_mut().filter(|r| r.is_live()) {
            record.value.super_ids.remove(&id);
        }
        for mut roles in self.subjects.iter_mut() {
            roles.retain(|rid| *rid != id);
        }
        Ok(())
    }

    async fn role_add_permission(&self, role: &str, permission: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let pid = store.require_permission(permission)?;
        store.role_mut(role)?.permission_ids.insert(pid);
        Ok(())
    }

    async fn role_del_permission(&self, role: &str, permission: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let pid = store.require_permission(permission)?;
        store.role_mut(role)?.permission_ids.remove(&pid);
        Ok(())
    }

    async fn role_add_super(&self, role: &str, super_role: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let sid = store.require_role(super_role)?;
        store.role_mut(role)?.super_ids.insert(sid);
        Ok(())
    }

    async fn role_del_super(&self, role: &str, super_role: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let sid = store.require_role(super_role)?;
        store.role_mut(role)?.super_ids.remove(&sid);
        Ok(())
    }

    async fn role_add_wildcard(&self, role: &str, pattern: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.role_mut(role)?.wildcards.insert(pattern.to_string());
        Ok(())
    }

    async fn role_del_wildcard(&self, role: &str, pattern: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.role_mut(role)?.wildcards.remove(pattern);
        Ok(())
    }

    async fn permission_add_mutex(&self, permission: &str, other: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let pid = store.require_permission(permission)?;
        let oid = store.require_permission(other)?;
        if let Some(record) = store.permissions.get_mut(&pid) {
            record.value.mutex_with.insert(oid);
        }
        Ok(())
    }

    async fn permission_del_mutex(&self, permission: &str, other: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let pid = store.require_permission(permission)?;
        let oid = store.require_permission(other)?;
        // the relation is symmetric, so clear whichever side stored it
        for (a, b) in [(pid, oid), (oid, pid)] {
            if let Some(record) = store.permissions.get_mut(&a) {
                record.value.mutex_with.remove(&b);
            }
        }
        Ok(())
    }

    async fn subject_add_role(&self, subject: SubjectId, role: &str) -> Result<()> {
        let rid = self.store.read().await.require_role(role)?;
        let mut roles = self.subjects.entry(subject).or_default();
        if !roles.contains(&rid) {
            roles.push(rid);
        }
        Ok(())
    }

    async fn subject_del_role(&self, subject: SubjectId, role: &str) -> Result<()> {
        let Some(rid) = self.store.read().await.role_id(role) else {
            return Ok(());
        };
        if let Some(mut roles) = self.subjects.get_mut(&subject) {
            roles.retain(|id| *id != rid);
        }
        Ok(())
    }
}
