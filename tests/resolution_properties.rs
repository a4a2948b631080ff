//! Property tests for hierarchy resolution

use bitmap_rbac::{Permission, Role, Snapshot};
use proptest::prelude::*;
use roaring::RoaringBitmap;

const PERMISSIONS: u32 = 16;

fn permissions() -> Vec<Permission> {
    (1..=PERMISSIONS)
        .map(|id| Permission::new(id, format!("res_{}.action_{}", id % 4, id)))
        .collect()
}

/// Acyclic role graphs: role `i` may only inherit from roles `< i`
fn role_dag() -> impl Strategy<Value = Vec<Role>> {
    prop::collection::vec(
        (
            prop::collection::btree_set(1..=PERMISSIONS, 0..4),
            prop::collection::btree_set(0usize..12, 0..3),
            prop::option::of(prop::sample::select(vec!["*", "res_0.*", "res_1.*", "none.*"])),
        ),
        1..12,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(index, (direct, supers, wildcard))| {
                let id = index as u32 + 1;
                let mut role = Role::new(id, format!("role_{}", id));
                role.permission_ids = direct;
                role.super_ids = supers
                    .into_iter()
                    .filter(|s| *s < index)
                    .map(|s| s as u32 + 1)
                    .collect();
                if let Some(pattern) = wildcard {
                    role = role.with_wildcard(pattern);
                }
                role
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn test_bitmap_is_union_of_own_grants_and_supers(roles in role_dag()) {
        let permissions = permissions();
        let snapshot = Snapshot::build(permissions.clone(), roles.clone());

        prop_assert!(snapshot.errors().is_empty());

        for role in &roles {
            let mut expected: RoaringBitmap = role.permission_ids.iter().copied().collect();
            for pattern in &role.wildcards {
                let prefix = pattern.trim_end_matches('*');
                for permission in &permissions {
                    if pattern == "*" || permission.name.starts_with(prefix) {
                        expected.insert(permission.id);
                    }
                }
            }
            for super_id in &role.super_ids {
                expected |= snapshot.bitmap(*super_id).unwrap().as_ref();
            }

            prop_assert_eq!(snapshot.bitmap(role.id).unwrap().as_ref(), &expected);
        }
    }

    #[test]
    fn test_mutex_permissions_never_granted_together(
        roles in role_dag(),
        pairs in prop::collection::vec((1..=PERMISSIONS, 1..=PERMISSIONS), 0..6),
    ) {
        let mut permissions = permissions();
        for (a, b) in &pairs {
            permissions[*a as usize - 1].mutex_with.insert(*b);
        }

        let snapshot = Snapshot::build(permissions, roles.clone());

        for role in &roles {
            let Some(bitmap) = snapshot.bitmap(role.id) else {
                continue;
            };
            for id in bitmap.iter() {
                if let Some(excluded) = snapshot.excluded_by(id) {
                    prop_assert!(
                        excluded.is_disjoint(bitmap),
                        "role {} holds {} together with an excluded permission",
                        role.name,
                        id
                    );
                }
            }
        }
    }

    #[test]
    fn test_joined_lookup_is_stable(roles in role_dag()) {
        let snapshot = Snapshot::build(permissions(), roles.clone());
        let ids: Vec<u32> = roles.iter().map(|r| r.id).collect();

        let first = snapshot.joined_bitmap(&ids).unwrap();
        let second = snapshot.joined_bitmap(&ids).unwrap();
        prop_assert_eq!(first.as_ref(), second.as_ref());

        if ids.len() > 1 {
            let stats = snapshot.cache_stats();
            prop_assert_eq!(stats.miss_count, 1);
            prop_assert_eq!(stats.hit_count, 1);
        }
    }
}
