//! Effective permission resolution.

use crate::cache::{CacheStats, PermissionCache};
use crate::catalog::role_permissions;
use crate::{AccessConfig, AccessError, AccessResult};
use keystone_core::UserId;
use keystone_storage::{PermissionStore, UserStore};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// The permission names a principal holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "names", rename_all = "snake_case")]
pub enum EffectivePermissions {
    /// Admin sentinel: every check passes, including names outside the catalog.
    All,
    /// Role-derived names united with explicit grants.
    Set(BTreeSet<String>),
}

impl EffectivePermissions {
    /// Returns true for the admin sentinel.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Returns true if `name` is held.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Set(names) => names.contains(name),
        }
    }

    /// Returns the enumerated names, or `None` for the sentinel.
    #[must_use]
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::All => None,
            Self::Set(names) => Some(names),
        }
    }
}

/// Computes and caches effective permission sets.
pub struct PermissionResolver {
    users: Arc<dyn UserStore>,
    permissions: Arc<dyn PermissionStore>,
    cache: PermissionCache,
}

impl PermissionResolver {
    /// Creates a resolver.
    pub fn new(
        users: Arc<dyn UserStore>,
        permissions: Arc<dyn PermissionStore>,
        config: &AccessConfig,
    ) -> Self {
        Self {
            users,
            permissions,
            cache: PermissionCache::new(config.cache_capacity, config.cache_ttl()),
        }
    }

    /// Resolves a principal's effective permissions.
    ///
    /// Fails with `NotFound` for an unknown principal. Within the cache TTL
    /// a repeated call does not touch storage.
    pub async fn resolve(&self, user_id: UserId) -> AccessResult<EffectivePermissions> {
        if let Some(cached) = self.cache.get(&user_id) {
            trace!(%user_id, "Permission cache hit");
            return Ok(cached);
        }

        let epoch = self.cache.epoch();

        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccessError::user_not_found(user_id))?;

        let resolved = if user.is_admin() {
            EffectivePermissions::All
        } else {
            let mut names: BTreeSet<String> = role_permissions(user.role)
                .iter()
                .map(|name| (*name).to_string())
                .collect();
            names.extend(
                self.permissions
                    .user_permissions(user_id)
                    .await?
                    .into_iter()
                    .map(|p| p.name),
            );
            EffectivePermissions::Set(names)
        };

        let cached = self.cache.insert(user_id, resolved.clone(), epoch);
        debug!(%user_id, role = %user.role, cached, "Resolved effective permissions");
        Ok(resolved)
    }

    /// Evicts a principal's cached set.
    pub fn invalidate(&self, user_id: UserId) {
        self.cache.invalidate(&user_id);
        trace!(%user_id, "Permission cache invalidated");
    }

    /// Evicts several principals.
    pub fn invalidate_many(&self, user_ids: &[UserId]) {
        for user_id in user_ids {
            self.invalidate(*user_id);
        }
    }

    /// Returns cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::{NewUser, Permission, Role};
    use keystone_storage::InMemoryBackend;

    async fn setup() -> (Arc<InMemoryBackend>, PermissionResolver) {
        let backend = Arc::new(InMemoryBackend::new());
        let resolver =
            PermissionResolver::new(backend.clone(), backend.clone(), &AccessConfig::default());
        (backend, resolver)
    }

    #[tokio::test]
    async fn test_unknown_principal_is_not_found() {
        let (_, resolver) = setup().await;
        let err = resolver.resolve(UserId::new()).await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_admin_resolves_to_sentinel() {
        let (backend, resolver) = setup().await;
        let admin = NewUser::new("root@x.io").with_role(Role::Admin).into_user();
        backend.create_user(&admin).await.unwrap();

        let resolved = resolver.resolve(admin.id).await.unwrap();
        assert!(resolved.is_all());
        assert!(resolved.contains("not:in-catalog"));
        assert!(resolved.names().is_none());
    }

    #[tokio::test]
    async fn test_role_union_explicit_deduplicated() {
        let (backend, resolver) = setup().await;
        let user = NewUser::new("u@x.io").into_user();
        backend.create_user(&user).await.unwrap();

        // One grant overlaps the role mapping, one does not.
        let overlap = Permission::new("read:settings", "");
        let extra = Permission::new("read:widgets", "");
        for p in [&overlap, &extra] {
            backend.create_permission(p).await.unwrap();
            backend.add_grant(user.id, p.id).await.unwrap();
        }

        let resolved = resolver.resolve(user.id).await.unwrap();
        let expected: BTreeSet<String> = role_permissions(Role::User)
            .iter()
            .map(|s| (*s).to_string())
            .chain(["read:widgets".to_string()])
            .collect();
        assert_eq!(resolved, EffectivePermissions::Set(expected));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_storage_until_invalidated() {
        let (backend, resolver) = setup().await;
        let user = NewUser::new("u@x.io").into_user();
        backend.create_user(&user).await.unwrap();
        let perm = Permission::new("read:widgets", "");
        backend.create_permission(&perm).await.unwrap();

        assert!(!resolver.resolve(user.id).await.unwrap().contains("read:widgets"));

        // Written behind the resolver's back: the cached set stays stale.
        backend.add_grant(user.id, perm.id).await.unwrap();
        assert!(!resolver.resolve(user.id).await.unwrap().contains("read:widgets"));
        assert_eq!(resolver.cache_stats().hits, 1);

        resolver.invalidate(user.id);
        assert!(resolver.resolve(user.id).await.unwrap().contains("read:widgets"));
    }

    #[test]
    fn test_serialized_shape() {
        let all = serde_json::to_value(EffectivePermissions::All).unwrap();
        assert_eq!(all, serde_json::json!({"kind": "all"}));

        let set = EffectivePermissions::Set(["a:b".to_string()].into_iter().collect());
        assert_eq!(
            serde_json::to_value(set).unwrap(),
            serde_json::json!({"kind": "set", "names": ["a:b"]})
        );
    }
}
