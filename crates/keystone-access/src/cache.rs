//! Per-principal cache of resolved permission sets.

use crate::resolver::EffectivePermissions;
use keystone_core::UserId;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct CachedEntry {
    permissions: EffectivePermissions,
    cached_at: Instant,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that fell through to storage.
    pub misses: u64,
    /// Explicit evictions.
    pub invalidations: u64,
    /// Entries currently cached.
    pub entries: usize,
}

impl CacheStats {
    /// Returns the hit rate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of [`EffectivePermissions`] keyed strictly by principal id.
///
/// Every invalidation bumps an epoch. A resolver captures the epoch before
/// reading storage and passes it back on insert; if any invalidation landed
/// in between, the insert is dropped so a concurrent grant or revoke cannot
/// be masked by a stale read.
pub struct PermissionCache {
    entries: Mutex<LruCache<UserId, CachedEntry>>,
    ttl: Duration,
    epoch: AtomicU64,
    stats: RwLock<CacheStats>,
}

impl PermissionCache {
    /// Creates a cache holding at most `capacity` principals for `ttl`.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            epoch: AtomicU64::new(0),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Returns the current invalidation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Returns a live entry, dropping it if expired.
    pub fn get(&self, user_id: &UserId) -> Option<EffectivePermissions> {
        let hit = {
            let mut entries = self.entries.lock();
            match entries.get(user_id) {
                Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                    Some(entry.permissions.clone())
                }
                Some(_) => {
                    entries.pop(user_id);
                    None
                }
                None => None,
            }
        };

        let mut stats = self.stats.write();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Stores a resolved set unless an invalidation happened since `observed_epoch`.
    ///
    /// Returns true if the entry was stored.
    pub fn insert(
        &self,
        user_id: UserId,
        permissions: EffectivePermissions,
        observed_epoch: u64,
    ) -> bool {
        let mut entries = self.entries.lock();
        if self.epoch() != observed_epoch {
            return false;
        }
        entries.put(
            user_id,
            CachedEntry {
                permissions,
                cached_at: Instant::now(),
            },
        );
        true
    }

    /// Evicts one principal.
    pub fn invalidate(&self, user_id: &UserId) {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        entries.pop(user_id);
        self.stats.write().invalidations += 1;
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().clone();
        stats.entries = self.entries.lock().len();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn set(names: &[&str]) -> EffectivePermissions {
        EffectivePermissions::Set(names.iter().map(|s| (*s).to_string()).collect::<BTreeSet<_>>())
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = PermissionCache::new(10, Duration::from_secs(60));
        let user = UserId::new();

        assert!(cache.get(&user).is_none());
        assert!(cache.insert(user, set(&["read:users"]), cache.epoch()));
        assert_eq!(cache.get(&user), Some(set(&["read:users"])));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = PermissionCache::new(10, Duration::ZERO);
        let user = UserId::new();
        cache.insert(user, EffectivePermissions::All, cache.epoch());
        assert!(cache.get(&user).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_invalidate_only_touches_one_key() {
        let cache = PermissionCache::new(10, Duration::from_secs(60));
        let (a, b) = (UserId::new(), UserId::new());
        cache.insert(a, set(&["x:y"]), cache.epoch());
        cache.insert(b, set(&["x:y"]), cache.epoch());

        cache.invalidate(&a);
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
    }

    #[test]
    fn test_insert_after_invalidation_is_rejected() {
        let cache = PermissionCache::new(10, Duration::from_secs(60));
        let user = UserId::new();

        let observed = cache.epoch();
        cache.invalidate(&user);
        assert!(!cache.insert(user, set(&["stale:read"]), observed));
        assert!(cache.get(&user).is_none());
    }

    #[test]
    fn test_capacity_bound() {
        let cache = PermissionCache::new(2, Duration::from_secs(60));
        for _ in 0..5 {
            cache.insert(UserId::new(), EffectivePermissions::All, cache.epoch());
        }
        assert_eq!(cache.stats().entries, 2);
    }
}
