//! Point-in-time resolved RBAC state
//!
//! A [`Snapshot`] is built once from a full backend enumeration and never
//! mutated afterwards (apart from its joined-bitmap cache). Reloading builds a
//! new snapshot and swaps it in, so readers holding the previous one keep a
//! consistent view.
//!
//! ## Example
//!
//! ```rust
//! use bitmap_rbac::snapshot::Snapshot;
//! use bitmap_rbac::types::{Permission, Role};
//!
//! let snapshot = Snapshot::build(
//!     vec![Permission::new(1, "read"), Permission::new(2, "write")],
//!     vec![
//!         Role::new(1, "viewer").with_permission(1),
//!         Role::new(2, "editor").with_super(1).with_permission(2),
//!     ],
//! );
//!
//! assert!(snapshot.errors().is_empty());
//! assert_eq!(snapshot.bitmap(2).unwrap().len(), 2);
//! ```

pub mod cache;
pub mod pattern;
pub mod resolver;

pub use cache::{CacheStats, JoinedBitmapCache};
pub use pattern::{MalformedPattern, WildcardPattern};
pub use resolver::{HierarchyResolver, Resolution};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use roaring::RoaringBitmap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{EntityKind, LoadError, LoadWarning, Result};
use crate::types::{Permission, PermissionId, Role, RoleId};

/// Fully resolved roles and permissions
#[derive(Debug)]
pub struct Snapshot {
    /// id -> permission, in backend order
    permissions: IndexMap<PermissionId, Permission>,
    /// id -> role, in backend order
    roles: IndexMap<RoleId, Role>,
    permission_names: HashMap<String, PermissionId>,
    role_names: HashMap<String, RoleId>,

    /// Resolved permission set per role; misconfigured roles are absent
    bitmaps: HashMap<RoleId, Arc<RoaringBitmap>>,
    /// Misconfigured roles and the error that stopped their resolution
    failed: HashMap<RoleId, LoadError>,
    /// Symmetric mutual exclusion
    mutex: HashMap<PermissionId, RoaringBitmap>,
    wildcards: HashMap<String, Arc<RoaringBitmap>>,

    errors: Vec<LoadError>,
    warnings: Vec<LoadWarning>,
    cache: JoinedBitmapCache,
    loaded_at: DateTime<Utc>,
}

impl Snapshot {
    /// An empty snapshot, as served before the first load
    pub fn empty() -> Self {
        Self::build(Vec::new(), Vec::new())
    }

    /// Fetches every permission and role from the backend and builds a snapshot.
    ///
    /// Fails only when the backend does; structural problems end up in
    /// [`Snapshot::errors`].
    pub async fn fetch<B: Backend + ?Sized>(backend: &B) -> Result<Self> {
        let permissions = backend.get_all_permissions().await?;
        let roles = backend.get_all_roles().await?;
        Ok(Self::build(permissions, roles))
    }

    /// Indexes the given entities and resolves the role hierarchy
    pub fn build(permissions: Vec<Permission>, roles: Vec<Role>) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut permission_index = IndexMap::with_capacity(permissions.len());
        let mut permission_names = HashMap::with_capacity(permissions.len());
        for permission in permissions {
            if permission.id == 0 {
                errors.push(LoadError::InvalidId {
                    kind: EntityKind::Permission,
                    name: permission.name,
                });
                continue;
            }
            if permission_names
                .insert(permission.name.clone(), permission.id)
                .is_some()
            {
                warnings.push(LoadWarning::DuplicateName {
                    kind: EntityKind::Permission,
                    name: permission.name.clone(),
                });
            }
            permission_index.insert(permission.id, permission);
        }

        let mut role_index = IndexMap::with_capacity(roles.len());
        let mut role_names = HashMap::with_capacity(roles.len());
        for role in roles {
            if role.id == 0 {
                errors.push(LoadError::InvalidId {
                    kind: EntityKind::Role,
                    name: role.name,
                });
                continue;
            }
            if role_names.insert(role.name.clone(), role.id).is_some() {
                warnings.push(LoadWarning::DuplicateName {
                    kind: EntityKind::Role,
                    name: role.name.clone(),
                });
            }
            role_index.insert(role.id, role);
        }

        let mutex = resolver::build_mutex_index(&permission_index, &mut errors);
        let resolution = HierarchyResolver::new(&permission_index, &role_index, &mutex).resolve_all();
        errors.extend(resolution.errors);
        warnings.extend(resolution.warnings);

        for err in &errors {
            warn!(error = %err, "RBAC configuration error");
        }

        info!(
            permissions = permission_index.len(),
            roles = role_index.len(),
            resolved = resolution.bitmaps.len(),
            errors = errors.len(),
            warnings = warnings.len(),
            "Built RBAC snapshot"
        );

        Self {
            permissions: permission_index,
            roles: role_index,
            permission_names,
            role_names,
            bitmaps: resolution.bitmaps,
            failed: resolution.failed,
            mutex,
            wildcards: resolution.wildcards,
            errors,
            warnings,
            cache: JoinedBitmapCache::new(),
            loaded_at: Utc::now(),
        }
    }

    pub fn permission_by_id(&self, id: PermissionId) -> Option<&Permission> {
        self.permissions.get(&id)
    }

    pub fn permission_by_name(&self, name: &str) -> Option<&Permission> {
        self.permission_names
            .get(name)
            .and_then(|id| self.permissions.get(id))
    }

    pub fn role_by_id(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&id)
    }

    pub fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.role_names.get(name).and_then(|id| self.roles.get(id))
    }

    /// Permissions in backend order
    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    /// Roles in backend order
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// The resolved bitmap of a role, `None` when the role is unknown or misconfigured
    pub fn bitmap(&self, role: RoleId) -> Option<&Arc<RoaringBitmap>> {
        self.bitmaps.get(&role)
    }

    /// Permissions a permission is mutually exclusive with (symmetric closure)
    pub fn excluded_by(&self, permission: PermissionId) -> Option<&RoaringBitmap> {
        self.mutex.get(&permission)
    }

    /// Memoized expansion of a wildcard pattern, if any role used it
    pub fn wildcard_expansion(&self, pattern: &str) -> Option<&RoaringBitmap> {
        self.wildcards.get(pattern).map(|b| b.as_ref())
    }

    /// The error that left a role without a bitmap.
    ///
    /// The error may name an ancestor, e.g. the role at which a cycle closes.
    pub fn role_error(&self, role: RoleId) -> Option<&LoadError> {
        self.failed.get(&role)
    }

    /// Ids of roles that failed to resolve
    pub fn failed_roles(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.failed.keys().copied()
    }

    pub fn errors(&self) -> &[LoadError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// Wall-clock completion time of the build
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Union of the given roles' bitmaps, see [`JoinedBitmapCache::joined`]
    pub fn joined_bitmap(&self, role_ids: &[RoleId]) -> Option<Arc<RoaringBitmap>> {
        self.cache.joined(role_ids, &self.bitmaps)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Every permission a role grants, ascending by id.
    /// Empty for unknown or misconfigured roles.
    pub fn role_permissions(&self, role: &str) -> Vec<Permission> {
        self.role_by_name(role)
            .and_then(|r| self.bitmaps.get(&r.id))
            .map(|bitmap| {
                bitmap
                    .iter()
                    .filter_map(|id| self.permissions.get(&id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
