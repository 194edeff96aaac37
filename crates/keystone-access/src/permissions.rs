//! Ad-hoc permission administration.

use crate::context::{audit_failure, ActorContext};
use crate::resolver::PermissionResolver;
use crate::{AccessError, AccessResult};
use keystone_audit::AuditRecorder;
use keystone_core::{validate_permission_name, Permission, PermissionChanges, PermissionId};
use keystone_storage::PermissionStore;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const RESOURCE: &str = "permissions";

/// Creates, edits and deletes permission rows.
///
/// Deleting or renaming a permission evicts the cached set of every
/// principal holding it.
#[derive(Clone)]
pub struct PermissionService {
    permissions: Arc<dyn PermissionStore>,
    resolver: Arc<PermissionResolver>,
    audit: AuditRecorder,
}

impl PermissionService {
    /// Creates a permission service.
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        resolver: Arc<PermissionResolver>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            permissions,
            resolver,
            audit,
        }
    }

    /// Loads a permission.
    pub async fn get(&self, id: PermissionId) -> AccessResult<Permission> {
        self.permissions
            .get_permission(id)
            .await?
            .ok_or_else(|| AccessError::permission_not_found(id))
    }

    /// Lists permissions ordered by name.
    pub async fn list(&self) -> AccessResult<Vec<Permission>> {
        Ok(self.permissions.list_permissions().await?)
    }

    /// Creates a permission. Fails with `Conflict` on a taken name.
    pub async fn create(
        &self,
        actor: &ActorContext,
        name: &str,
        description: &str,
    ) -> AccessResult<Permission> {
        let entry = actor.audit("create_permission", RESOURCE);
        let permission = Permission::new(name.trim(), description.trim());

        if let Err(e) = self.insert(&permission).await {
            return Err(audit_failure(&self.audit, entry, e).await);
        }

        info!(permission_id = %permission.id, name = %permission.name, "Permission created");
        self.audit
            .record(
                entry
                    .resource_id(permission.id)
                    .new_values(snapshot(&permission))
                    .build(),
            )
            .await;
        Ok(permission)
    }

    async fn insert(&self, permission: &Permission) -> AccessResult<()> {
        validate_permission_name(&permission.name)?;
        if self
            .permissions
            .find_permission_by_name(&permission.name)
            .await?
            .is_some()
        {
            return Err(name_taken(&permission.name));
        }
        self.permissions
            .create_permission(permission)
            .await
            .map_err(|e| AccessError::on_duplicate(e, already_exists(&permission.name)))
    }

    /// Applies name and description changes.
    pub async fn update(
        &self,
        actor: &ActorContext,
        id: PermissionId,
        changes: PermissionChanges,
    ) -> AccessResult<Permission> {
        let entry = actor.audit("update_permission", RESOURCE).resource_id(id);

        match self.apply_changes(id, changes).await {
            Ok((before, after)) => {
                if before != after {
                    info!(permission_id = %id, name = %after.name, "Permission updated");
                    self.audit
                        .record(
                            entry
                                .old_values(snapshot(&before))
                                .new_values(snapshot(&after))
                                .build(),
                        )
                        .await;
                }
                Ok(after)
            }
            Err(e) => Err(audit_failure(&self.audit, entry, e).await),
        }
    }

    async fn apply_changes(
        &self,
        id: PermissionId,
        changes: PermissionChanges,
    ) -> AccessResult<(Permission, Permission)> {
        let before = self.get(id).await?;
        if changes.is_empty() {
            return Ok((before.clone(), before));
        }

        let mut after = before.clone();
        let renamed = match changes.name {
            Some(name) if name.trim() != before.name => {
                let name = name.trim().to_string();
                validate_permission_name(&name)?;
                if let Some(other) = self.permissions.find_permission_by_name(&name).await? {
                    if other.id != id {
                        return Err(name_taken(&name));
                    }
                }
                after.name = name;
                true
            }
            _ => false,
        };
        if let Some(description) = changes.description {
            after.description = description.trim().to_string();
        }
        if after == before {
            return Ok((before, after));
        }

        // Holders are read before the write so their cached sets can be dropped.
        let holders = if renamed {
            self.permissions.permission_holders(id).await?
        } else {
            Vec::new()
        };

        self.permissions
            .update_permission(&after)
            .await
            .map_err(|e| AccessError::on_duplicate(e, already_exists(&after.name)))?;
        self.resolver.invalidate_many(&holders);

        let after = self.get(id).await?;
        Ok((before, after))
    }

    /// Deletes a permission and every grant of it.
    pub async fn delete(&self, actor: &ActorContext, id: PermissionId) -> AccessResult<()> {
        let entry = actor.audit("delete_permission", RESOURCE).resource_id(id);

        match self.remove(id).await {
            Ok((permission, holders)) => {
                info!(
                    permission_id = %id,
                    name = %permission.name,
                    holders,
                    "Permission deleted"
                );
                self.audit
                    .record(
                        entry
                            .old_values(snapshot(&permission))
                            .new_values(json!({ "revoked_from": holders }))
                            .build(),
                    )
                    .await;
                Ok(())
            }
            Err(e) => Err(audit_failure(&self.audit, entry, e).await),
        }
    }

    async fn remove(&self, id: PermissionId) -> AccessResult<(Permission, usize)> {
        let permission = self.get(id).await?;
        let holders = self.permissions.permission_holders(id).await?;

        if !self.permissions.delete_permission(id).await? {
            return Err(AccessError::permission_not_found(id));
        }
        self.resolver.invalidate_many(&holders);
        Ok((permission, holders.len()))
    }
}

fn name_taken(name: &str) -> AccessError {
    AccessError::Conflict(already_exists(name))
}

fn already_exists(name: &str) -> String {
    format!("permission '{name}' already exists")
}

fn snapshot(permission: &Permission) -> serde_json::Value {
    json!({
        "name": permission.name,
        "description": permission.description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessConfig;
    use keystone_core::NewUser;
    use keystone_storage::{InMemoryBackend, UserStore};

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        resolver: Arc<PermissionResolver>,
        service: PermissionService,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::new());
        let resolver = Arc::new(PermissionResolver::new(
            backend.clone(),
            backend.clone(),
            &AccessConfig::default(),
        ));
        let service = PermissionService::new(
            backend.clone(),
            resolver.clone(),
            AuditRecorder::new(backend.clone()),
        );
        Fixture {
            backend,
            resolver,
            service,
        }
    }

    #[tokio::test]
    async fn test_create_validates_and_rejects_duplicates() {
        let f = fixture();
        let actor = ActorContext::system();

        let err = f.service.create(&actor, "Widgets", "").await.unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));

        f.service.create(&actor, "read:widgets", "Read").await.unwrap();
        let err = f.service.create(&actor, "read:widgets", "Again").await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rename_invalidates_holders() {
        let f = fixture();
        let actor = ActorContext::system();
        let user = NewUser::new("u@x.io").into_user();
        f.backend.create_user(&user).await.unwrap();
        let perm = f.service.create(&actor, "read:widgets", "").await.unwrap();
        f.backend.add_grant(user.id, perm.id).await.unwrap();

        assert!(f.resolver.resolve(user.id).await.unwrap().contains("read:widgets"));

        f.service
            .update(
                &actor,
                perm.id,
                PermissionChanges {
                    name: Some("read:gadgets".into()),
                    description: None,
                },
            )
            .await
            .unwrap();

        let held = f.resolver.resolve(user.id).await.unwrap();
        assert!(held.contains("read:gadgets"));
        assert!(!held.contains("read:widgets"));
    }

    #[tokio::test]
    async fn test_rename_to_taken_name_conflicts() {
        let f = fixture();
        let actor = ActorContext::system();
        f.service.create(&actor, "read:widgets", "").await.unwrap();
        let other = f.service.create(&actor, "write:widgets", "").await.unwrap();

        let err = f
            .service
            .update(
                &actor,
                other.id,
                PermissionChanges {
                    name: Some("read:widgets".into()),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades_and_invalidates() {
        let f = fixture();
        let actor = ActorContext::system();
        let user = NewUser::new("u@x.io").into_user();
        f.backend.create_user(&user).await.unwrap();
        let perm = f.service.create(&actor, "read:widgets", "").await.unwrap();
        f.backend.add_grant(user.id, perm.id).await.unwrap();
        assert!(f.resolver.resolve(user.id).await.unwrap().contains("read:widgets"));

        f.service.delete(&actor, perm.id).await.unwrap();

        assert!(!f.resolver.resolve(user.id).await.unwrap().contains("read:widgets"));
        assert!(f.backend.user_permissions(user.id).await.unwrap().is_empty());
        assert!(matches!(
            f.service.get(perm.id).await,
            Err(AccessError::NotFound { .. })
        ));
    }
}
