//! Joined-bitmap cache: memoized unions of role bitmaps

use parking_lot::RwLock;
use roaring::RoaringBitmap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::types::RoleId;

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
}

/// Union cache keyed by a subject's sorted role-id set
///
/// Entries live as long as the snapshot that owns the cache; there is no
/// per-entry eviction. A reload replaces the snapshot and with it every entry.
#[derive(Debug, Default)]
pub struct JoinedBitmapCache {
    entries: RwLock<HashMap<String, Arc<RoaringBitmap>>>,
    empty: Arc<RoaringBitmap>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl JoinedBitmapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the union of the given roles' bitmaps
    ///
    /// - no roles: `None` (the subject holds nothing, as opposed to holding
    ///   roles that grant nothing)
    /// - one role: that role's bitmap, no cache entry
    /// - several roles: cached union; roles missing from `bitmaps` contribute
    ///   nothing
    pub fn joined(
        &self,
        role_ids: &[RoleId],
        bitmaps: &HashMap<RoleId, Arc<RoaringBitmap>>,
    ) -> Option<Arc<RoaringBitmap>> {
        let mut ids = role_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        match ids.as_slice() {
            [] => None,
            [only] => Some(bitmaps.get(only).cloned().unwrap_or_else(|| self.empty.clone())),
            _ => Some(self.union(&ids, bitmaps)),
        }
    }

    fn union(&self, ids: &[RoleId], bitmaps: &HashMap<RoleId, Arc<RoaringBitmap>>) -> Arc<RoaringBitmap> {
        let key = cache_key(ids);

        if let Some(hit) = self.entries.read().get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return hit.clone();
        }

        let mut entries = self.entries.write();

        // another caller may have filled the slot between the two locks
        if let Some(hit) = entries.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return hit.clone();
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);

        let mut joined = RoaringBitmap::new();
        for id in ids {
            if let Some(bitmap) = bitmaps.get(id) {
                joined |= bitmap.as_ref();
            }
        }

        debug!(key = %key, permissions = joined.len(), "Joined bitmap cached");

        let joined = Arc::new(joined);
        entries.insert(key, joined.clone());
        joined
    }

    /// Returns cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().len();
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            entries,
            hit_count: hits,
            miss_count: misses,
            hit_rate,
        }
    }
}

/// Sorted role ids joined with `|`
fn cache_key(sorted_ids: &[RoleId]) -> String {
    sorted_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("|")
}
