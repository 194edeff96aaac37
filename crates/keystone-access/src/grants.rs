//! Explicit grant and revoke.

use crate::context::{audit_failure, ActorContext};
use crate::resolver::PermissionResolver;
use crate::{AccessError, AccessResult};
use keystone_audit::AuditRecorder;
use keystone_core::{Permission, PermissionId, UserId};
use keystone_storage::{PermissionStore, UserStore};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const RESOURCE: &str = "user_permissions";

/// Mutates the explicit user-permission relation.
#[derive(Clone)]
pub struct GrantManager {
    users: Arc<dyn UserStore>,
    permissions: Arc<dyn PermissionStore>,
    resolver: Arc<PermissionResolver>,
    audit: AuditRecorder,
}

impl GrantManager {
    /// Creates a grant manager.
    pub fn new(
        users: Arc<dyn UserStore>,
        permissions: Arc<dyn PermissionStore>,
        resolver: Arc<PermissionResolver>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            users,
            permissions,
            resolver,
            audit,
        }
    }

    /// Grants a permission. Idempotent; returns true if the relation was added.
    pub async fn grant(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AccessResult<bool> {
        self.apply(actor, user_id, permission_id, true).await
    }

    /// Revokes a permission. Idempotent; returns true if the relation existed.
    pub async fn revoke(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AccessResult<bool> {
        self.apply(actor, user_id, permission_id, false).await
    }

    /// Lists a principal's explicit grants.
    pub async fn list(&self, user_id: UserId) -> AccessResult<Vec<Permission>> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccessError::user_not_found(user_id))?;
        Ok(self.permissions.user_permissions(user_id).await?)
    }

    async fn apply(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        permission_id: PermissionId,
        add: bool,
    ) -> AccessResult<bool> {
        let action = if add {
            "grant_permission"
        } else {
            "revoke_permission"
        };
        let entry = actor.audit(action, RESOURCE).resource_id(user_id);

        let permission = match self.lookup(user_id, permission_id).await {
            Ok(permission) => permission,
            Err(e) => return Err(audit_failure(&self.audit, entry, e).await),
        };

        let changed = if add {
            self.permissions.add_grant(user_id, permission_id).await
        } else {
            self.permissions.remove_grant(user_id, permission_id).await
        };
        let changed = match changed {
            Ok(changed) => changed,
            Err(e) => return Err(audit_failure(&self.audit, entry, e.into()).await),
        };

        self.resolver.invalidate(user_id);

        info!(
            actor = ?actor.user_id,
            %user_id,
            permission = %permission.name,
            changed,
            "{}",
            action
        );

        self.audit
            .record(
                entry
                    .new_values(json!({
                        "permission_id": permission.id,
                        "permission": permission.name,
                        "changed": changed,
                    }))
                    .build(),
            )
            .await;

        Ok(changed)
    }

    async fn lookup(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AccessResult<Permission> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccessError::user_not_found(user_id))?;
        self.permissions
            .get_permission(permission_id)
            .await?
            .ok_or_else(|| AccessError::permission_not_found(permission_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessConfig;
    use keystone_core::{AuditFilter, NewUser, PageRequest};
    use keystone_storage::InMemoryBackend;

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        resolver: Arc<PermissionResolver>,
        grants: GrantManager,
        audit: AuditRecorder,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::new());
        let resolver = Arc::new(PermissionResolver::new(
            backend.clone(),
            backend.clone(),
            &AccessConfig::default(),
        ));
        let audit = AuditRecorder::new(backend.clone());
        let grants = GrantManager::new(
            backend.clone(),
            backend.clone(),
            resolver.clone(),
            audit.clone(),
        );
        Fixture {
            backend,
            resolver,
            grants,
            audit,
        }
    }

    #[tokio::test]
    async fn test_grant_twice_equals_grant_once() {
        let f = fixture();
        let user = NewUser::new("u@x.io").into_user();
        f.backend.create_user(&user).await.unwrap();
        let perm = Permission::new("read:widgets", "");
        f.backend.create_permission(&perm).await.unwrap();
        let actor = ActorContext::system();

        assert!(f.grants.grant(&actor, user.id, perm.id).await.unwrap());
        assert!(!f.grants.grant(&actor, user.id, perm.id).await.unwrap());
        assert_eq!(f.grants.list(user.id).await.unwrap().len(), 1);

        assert!(f.grants.revoke(&actor, user.id, perm.id).await.unwrap());
        assert!(!f.grants.revoke(&actor, user.id, perm.id).await.unwrap());
        assert!(f.grants.list(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_invalidates_cached_set() {
        let f = fixture();
        let user = NewUser::new("u@x.io").into_user();
        f.backend.create_user(&user).await.unwrap();
        let perm = Permission::new("read:widgets", "");
        f.backend.create_permission(&perm).await.unwrap();

        assert!(!f.resolver.resolve(user.id).await.unwrap().contains("read:widgets"));
        f.grants
            .grant(&ActorContext::system(), user.id, perm.id)
            .await
            .unwrap();
        assert!(f.resolver.resolve(user.id).await.unwrap().contains("read:widgets"));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found_and_audited_as_failures() {
        let f = fixture();
        let user = NewUser::new("u@x.io").into_user();
        f.backend.create_user(&user).await.unwrap();
        let actor = ActorContext::system();

        let err = f
            .grants
            .grant(&actor, user.id, PermissionId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotFound { resource_type: "Permission", .. }));

        let err = f
            .grants
            .revoke(&actor, UserId::new(), PermissionId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotFound { resource_type: "User", .. }));

        let failures = f
            .audit
            .query(&AuditFilter::new().with_success(false), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(failures.total, 2);
    }
}
