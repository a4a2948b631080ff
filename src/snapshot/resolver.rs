//! Role hierarchy resolution into per-role permission bitmaps
//!
//! Every role is resolved independently by a depth-first descent through its
//! super roles, carrying the role ids of the current branch so cycles are
//! caught as soon as a role reappears on its own ancestor chain. Any
//! structural defect aborts that one role: it gets no bitmap and the error
//! is recorded, while all other roles resolve normally.

use indexmap::IndexMap;
use roaring::RoaringBitmap;
use std::collections::HashMap;
use std::sync::Arc;

use super::pattern::WildcardPattern;
use crate::error::{LoadError, LoadWarning};
use crate::types::{Permission, PermissionId, Role, RoleId};

/// Output of a full hierarchy resolution
#[derive(Debug, Default)]
pub struct Resolution {
    pub bitmaps: HashMap<RoleId, Arc<RoaringBitmap>>,
    /// Roles that failed to resolve, with the error that stopped them
    pub failed: HashMap<RoleId, LoadError>,
    pub wildcards: HashMap<String, Arc<RoaringBitmap>>,
    pub errors: Vec<LoadError>,
    pub warnings: Vec<LoadWarning>,
}

/// Builds the symmetric mutual-exclusion index
///
/// `A excludes B` implies `B excludes A`. A permission that excludes itself
/// is reported once and the self edge is dropped so it can still be granted.
pub fn build_mutex_index(
    permissions: &IndexMap<PermissionId, Permission>,
    errors: &mut Vec<LoadError>,
) -> HashMap<PermissionId, RoaringBitmap> {
    let mut index: HashMap<PermissionId, RoaringBitmap> = HashMap::new();

    for permission in permissions.values() {
        for &other in &permission.mutex_with {
            if other == permission.id {
                errors.push(LoadError::SelfExclusive {
                    permission_id: permission.id,
                    name: permission.name.clone(),
                });
                continue;
            }
            index.entry(permission.id).or_default().insert(other);
            index.entry(other).or_default().insert(permission.id);
        }
    }

    index
}

/// Depth-first resolver over id-indexed permission and role tables
pub struct HierarchyResolver<'a> {
    permissions: &'a IndexMap<PermissionId, Permission>,
    roles: &'a IndexMap<RoleId, Role>,
    mutex: &'a HashMap<PermissionId, RoaringBitmap>,

    /// pattern -> matched permission ids, memoized for the snapshot lifetime
    wildcards: HashMap<String, Arc<RoaringBitmap>>,
    warnings: Vec<LoadWarning>,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(
        permissions: &'a IndexMap<PermissionId, Permission>,
        roles: &'a IndexMap<RoleId, Role>,
        mutex: &'a HashMap<PermissionId, RoaringBitmap>,
    ) -> Self {
        Self {
            permissions,
            roles,
            mutex,
            wildcards: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Resolves every role, in backend order
    pub fn resolve_all(mut self) -> Resolution {
        let mut bitmaps = HashMap::with_capacity(self.roles.len());
        let mut failed = HashMap::new();
        let mut errors = Vec::new();
        let roles = self.roles;

        for role in roles.values() {
            match self.resolve(role) {
                Ok(bitmap) => {
                    if bitmap.is_empty() {
                        self.warnings.push(LoadWarning::EmptyRole {
                            role: role.name.clone(),
                        });
                    }
                    bitmaps.insert(role.id, Arc::new(bitmap));
                }
                Err(err) => {
                    failed.insert(role.id, err.clone());
                    errors.push(err);
                }
            }
        }

        Resolution {
            bitmaps,
            failed,
            wildcards: self.wildcards,
            errors,
            warnings: self.warnings,
        }
    }

    /// Resolves a single role into the set of every permission it grants
    pub fn resolve(&mut self, role: &'a Role) -> Result<RoaringBitmap, LoadError> {
        let mut bitmap = RoaringBitmap::new();
        let mut path = Vec::new();
        self.traverse(role, role, &mut bitmap, &mut path)?;
        Ok(bitmap)
    }

    fn traverse(
        &mut self,
        role: &'a Role,
        begin: &'a Role,
        bitmap: &mut RoaringBitmap,
        path: &mut Vec<RoleId>,
    ) -> Result<(), LoadError> {
        if path.contains(&role.id) {
            return Err(LoadError::Cycle {
                role: role.name.clone(),
                role_id: role.id,
                path: path.clone(),
            });
        }
        path.push(role.id);

        for &pid in &role.permission_ids {
            if !self.permissions.contains_key(&pid) {
                return Err(LoadError::UnknownPermission {
                    role: role.name.clone(),
                    permission_id: pid,
                });
            }
            self.grant(begin, pid, bitmap)?;
        }

        for raw in &role.wildcards {
            let matched = self.expand(raw).ok_or_else(|| LoadError::BadWildcard {
                role: role.name.clone(),
                pattern: raw.clone(),
            })?;

            // reported once, by the role that declares the pattern
            if matched.is_empty() && role.id == begin.id {
                self.warnings.push(LoadWarning::EmptyWildcard {
                    role: role.name.clone(),
                    pattern: raw.clone(),
                });
            }

            for pid in matched.iter() {
                self.grant(begin, pid, bitmap)?;
            }
        }

        let roles = self.roles;
        for &super_id in &role.super_ids {
            let super_role = roles.get(&super_id).ok_or_else(|| LoadError::UnknownRole {
                role: role.name.clone(),
                super_id,
            })?;
            self.traverse(super_role, begin, bitmap, path)?;
        }

        path.pop();
        Ok(())
    }

    /// Adds a permission unless it collides with one already granted
    fn grant(
        &self,
        begin: &Role,
        pid: PermissionId,
        bitmap: &mut RoaringBitmap,
    ) -> Result<(), LoadError> {
        if let Some(excluded) = self.mutex.get(&pid) {
            if !excluded.is_disjoint(bitmap) {
                let conflicting_id = (excluded & &*bitmap).min().unwrap_or_default();
                return Err(LoadError::MutexCollision {
                    role: begin.name.clone(),
                    permission_id: pid,
                    conflicting_id,
                });
            }
        }
        bitmap.insert(pid);
        Ok(())
    }

    /// Expands a pattern, memoized per distinct pattern string.
    /// Returns `None` for a malformed pattern.
    fn expand(&mut self, raw: &str) -> Option<Arc<RoaringBitmap>> {
        if let Some(cached) = self.wildcards.get(raw) {
            return Some(cached.clone());
        }

        let pattern = WildcardPattern::parse(raw).ok()?;
        let matched: RoaringBitmap = self
            .permissions
            .values()
            .filter(|p| pattern.matches(&p.name))
            .map(|p| p.id)
            .collect();

        let matched = Arc::new(matched);
        self.wildcards.insert(raw.to_string(), matched.clone());
        Some(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(
        permissions: Vec<Permission>,
        roles: Vec<Role>,
    ) -> (IndexMap<PermissionId, Permission>, IndexMap<RoleId, Role>) {
        (
            permissions.into_iter().map(|p| (p.id, p)).collect(),
            roles.into_iter().map(|r| (r.id, r)).collect(),
        )
    }

    fn resolve(permissions: Vec<Permission>, roles: Vec<Role>) -> Resolution {
        let (permissions, roles) = tables(permissions, roles);
        let mut errors = Vec::new();
        let mutex = build_mutex_index(&permissions, &mut errors);
        let mut resolution = HierarchyResolver::new(&permissions, &roles, &mutex).resolve_all();
        errors.append(&mut resolution.errors);
        resolution.errors = errors;
        resolution
    }

    fn ids(bitmap: &RoaringBitmap) -> Vec<u32> {
        bitmap.iter().collect()
    }

    #[test]
    fn test_direct_and_inherited() {
        let res = resolve(
            vec![Permission::new(1, "read"), Permission::new(2, "write")],
            vec![
                Role::new(1, "viewer").with_permission(1),
                Role::new(2, "editor").with_super(1).with_permission(2),
            ],
        );

        assert!(res.errors.is_empty());
        assert_eq!(ids(&res.bitmaps[&1]), vec![1]);
        assert_eq!(ids(&res.bitmaps[&2]), vec![1, 2]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let res = resolve(
            vec![Permission::new(1, "base")],
            vec![
                Role::new(1, "base").with_permission(1),
                Role::new(2, "left").with_super(1),
                Role::new(3, "right").with_super(1),
                Role::new(4, "top").with_super(2).with_super(3),
            ],
        );

        assert!(res.errors.is_empty());
        assert_eq!(ids(&res.bitmaps[&4]), vec![1]);
    }

    #[test]
    fn test_mutual_super_reference_is_cycle_for_both() {
        let res = resolve(
            vec![Permission::new(1, "read")],
            vec![
                Role::new(1, "a").with_super(2).with_permission(1),
                Role::new(2, "b").with_super(1),
            ],
        );

        assert_eq!(res.errors.len(), 2);
        assert!(res
            .errors
            .iter()
            .all(|e| matches!(e, LoadError::Cycle { .. })));
        assert!(res.bitmaps.is_empty());
    }

    #[test]
    fn test_self_super_is_cycle() {
        let res = resolve(vec![], vec![Role::new(1, "loop").with_super(1)]);

        assert_eq!(
            res.errors,
            vec![LoadError::Cycle {
                role: "loop".to_string(),
                role_id: 1,
                path: vec![1],
            }]
        );
    }

    #[test]
    fn test_dangling_references() {
        let res = resolve(
            vec![Permission::new(1, "read")],
            vec![
                Role::new(1, "bad_perm").with_permission(9),
                Role::new(2, "bad_super").with_super(9),
                Role::new(3, "fine").with_permission(1),
            ],
        );

        assert!(res.errors.contains(&LoadError::UnknownPermission {
            role: "bad_perm".to_string(),
            permission_id: 9,
        }));
        assert!(res.errors.contains(&LoadError::UnknownRole {
            role: "bad_super".to_string(),
            super_id: 9,
        }));
        assert_eq!(res.bitmaps.len(), 1);
        assert!(res.bitmaps.contains_key(&3));
    }

    #[test]
    fn test_wildcards() {
        let res = resolve(
            vec![
                Permission::new(1, "a.read"),
                Permission::new(2, "a.write"),
                Permission::new(3, "ab.read"),
                Permission::new(4, "a"),
            ],
            vec![
                Role::new(1, "prefix").with_wildcard("a.*"),
                Role::new(2, "root").with_wildcard("*"),
                Role::new(3, "broken").with_wildcard("a*"),
                Role::new(4, "nothing").with_wildcard("zzz.*"),
            ],
        );

        assert_eq!(ids(&res.bitmaps[&1]), vec![1, 2]);
        assert_eq!(ids(&res.bitmaps[&2]), vec![1, 2, 3, 4]);
        assert_eq!(
            res.errors,
            vec![LoadError::BadWildcard {
                role: "broken".to_string(),
                pattern: "a*".to_string(),
            }]
        );
        assert!(res.warnings.contains(&LoadWarning::EmptyWildcard {
            role: "nothing".to_string(),
            pattern: "zzz.*".to_string(),
        }));
        assert!(res.warnings.contains(&LoadWarning::EmptyRole {
            role: "nothing".to_string(),
        }));
        assert_eq!(res.wildcards.len(), 3);
    }

    #[test]
    fn test_mutex_direct_collision() {
        let res = resolve(
            vec![Permission::new(1, "a").with_mutex(2), Permission::new(2, "b")],
            vec![Role::new(1, "x").with_permission(1).with_permission(2)],
        );

        assert_eq!(
            res.errors,
            vec![LoadError::MutexCollision {
                role: "x".to_string(),
                permission_id: 2,
                conflicting_id: 1,
            }]
        );
        assert!(res.bitmaps.is_empty());
    }

    #[test]
    fn test_mutex_across_ancestors() {
        let res = resolve(
            vec![Permission::new(1, "pay.approve"), Permission::new(2, "pay.submit").with_mutex(1)],
            vec![
                Role::new(1, "approver").with_permission(1),
                Role::new(2, "clerk").with_permission(2),
                Role::new(3, "both").with_super(1).with_super(2),
            ],
        );

        assert_eq!(res.errors.len(), 1);
        assert!(matches!(
            &res.errors[0],
            LoadError::MutexCollision { role, .. } if role == "both"
        ));
        assert!(res.bitmaps.contains_key(&1));
        assert!(res.bitmaps.contains_key(&2));
        assert!(!res.bitmaps.contains_key(&3));
    }

    #[test]
    fn test_mutex_via_wildcard() {
        let res = resolve(
            vec![Permission::new(1, "a.read"), Permission::new(2, "a.write").with_mutex(1)],
            vec![Role::new(1, "all_a").with_wildcard("a.*")],
        );

        assert!(matches!(res.errors.as_slice(), [LoadError::MutexCollision { .. }]));
    }

    #[test]
    fn test_self_exclusive_is_non_fatal() {
        let res = resolve(
            vec![Permission::new(1, "odd").with_mutex(1)],
            vec![Role::new(1, "r").with_permission(1)],
        );

        assert_eq!(
            res.errors,
            vec![LoadError::SelfExclusive {
                permission_id: 1,
                name: "odd".to_string(),
            }]
        );
        assert_eq!(ids(&res.bitmaps[&1]), vec![1]);
    }
}
