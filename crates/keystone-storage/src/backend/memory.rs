//! In-memory storage backend.

use super::{AdminGuarded, AuditStore, PermissionStore, UserStore, SYSTEM_ACTOR};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use keystone_core::{
    AuditDimension, AuditFilter, AuditLogEntry, Page, PageRequest, Permission, PermissionId, Role,
    TimeRange, User, UserId,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// In-memory backend implementing every store trait.
///
/// Users and permissions sit behind a single lock each so uniqueness checks
/// and inserts are atomic.
#[derive(Default)]
pub struct InMemoryBackend {
    users: RwLock<HashMap<UserId, User>>,
    permissions: RwLock<HashMap<PermissionId, Permission>>,
    grants: DashMap<UserId, HashSet<PermissionId>>,
    audit: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of audit entries.
    #[must_use]
    pub fn audit_len(&self) -> usize {
        self.audit.read().len()
    }
}

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let start = usize::try_from(page.offset).unwrap_or(usize::MAX).min(items.len());
    let end = start
        .saturating_add(usize::try_from(page.limit).unwrap_or(usize::MAX))
        .min(items.len());

    Page {
        items: items[start..end].to_vec(),
        total,
        offset: page.offset,
        limit: page.limit,
    }
}

#[async_trait]
impl UserStore for InMemoryBackend {
    async fn create_user(&self, user: &User) -> StorageResult<()> {
        let mut users = self.users.write();
        if users.values().any(|u| u.email == user.email) {
            return Err(StorageError::AlreadyExists(format!("user email '{}'", user.email)));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StorageResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self.users.read().values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, page: PageRequest) -> StorageResult<Page<User>> {
        let mut users: Vec<User> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        Ok(paginate(&users, page))
    }

    async fn update_user_role(
        &self,
        id: UserId,
        role: Role,
    ) -> StorageResult<AdminGuarded<(User, User)>> {
        let mut users = self.users.write();
        let admins = users.values().filter(|u| u.is_admin()).count();

        let Some(user) = users.get_mut(&id) else {
            return Ok(AdminGuarded::NotFound);
        };
        if user.is_admin() && !role.is_admin() && admins <= 1 {
            return Ok(AdminGuarded::LastAdmin);
        }

        let before = user.clone();
        if user.role != role {
            user.role = role;
            user.updated_at = Utc::now();
        }
        Ok(AdminGuarded::Applied((before, user.clone())))
    }

    async fn delete_user(&self, id: UserId) -> StorageResult<AdminGuarded<User>> {
        let mut users = self.users.write();
        let admins = users.values().filter(|u| u.is_admin()).count();

        match users.get(&id) {
            None => return Ok(AdminGuarded::NotFound),
            Some(user) if user.is_admin() && admins <= 1 => return Ok(AdminGuarded::LastAdmin),
            Some(_) => {}
        }
        let Some(user) = users.remove(&id) else {
            return Ok(AdminGuarded::NotFound);
        };
        drop(users);

        self.grants.remove(&id);
        Ok(AdminGuarded::Applied(user))
    }

    async fn count_users_with_role(&self, role: Role) -> StorageResult<u64> {
        Ok(self.users.read().values().filter(|u| u.role == role).count() as u64)
    }
}

#[async_trait]
impl PermissionStore for InMemoryBackend {
    async fn upsert_permission(&self, name: &str, description: &str) -> StorageResult<Permission> {
        let mut permissions = self.permissions.write();

        if let Some(existing) = permissions.values_mut().find(|p| p.name == name) {
            if existing.description != description {
                existing.description = description.to_string();
                existing.updated_at = Utc::now();
            }
            return Ok(existing.clone());
        }

        let permission = Permission::new(name, description);
        permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn create_permission(&self, permission: &Permission) -> StorageResult<()> {
        let mut permissions = self.permissions.write();
        if permissions.values().any(|p| p.name == permission.name) {
            return Err(StorageError::AlreadyExists(format!(
                "permission '{}'",
                permission.name
            )));
        }
        permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn get_permission(&self, id: PermissionId) -> StorageResult<Option<Permission>> {
        Ok(self.permissions.read().get(&id).cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> StorageResult<Option<Permission>> {
        Ok(self.permissions.read().values().find(|p| p.name == name).cloned())
    }

    async fn list_permissions(&self) -> StorageResult<Vec<Permission>> {
        let mut permissions: Vec<Permission> = self.permissions.read().values().cloned().collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn update_permission(&self, permission: &Permission) -> StorageResult<()> {
        let mut permissions = self.permissions.write();

        if permissions
            .values()
            .any(|p| p.name == permission.name && p.id != permission.id)
        {
            return Err(StorageError::AlreadyExists(format!(
                "permission '{}'",
                permission.name
            )));
        }

        match permissions.get_mut(&permission.id) {
            Some(existing) => {
                existing.name = permission.name.clone();
                existing.description = permission.description.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("permission {}", permission.id))),
        }
    }

    async fn delete_permission(&self, id: PermissionId) -> StorageResult<bool> {
        let removed = self.permissions.write().remove(&id).is_some();
        if removed {
            for mut held in self.grants.iter_mut() {
                held.value_mut().remove(&id);
            }
        }
        Ok(removed)
    }

    async fn permission_holders(&self, id: PermissionId) -> StorageResult<Vec<UserId>> {
        Ok(self
            .grants
            .iter()
            .filter(|entry| entry.value().contains(&id))
            .map(|entry| *entry.key())
            .collect())
    }

    async fn user_permissions(&self, user_id: UserId) -> StorageResult<Vec<Permission>> {
        let held: Vec<PermissionId> = self
            .grants
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let permissions = self.permissions.read();
        let mut result: Vec<Permission> = held
            .iter()
            .filter_map(|id| permissions.get(id).cloned())
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn add_grant(&self, user_id: UserId, permission_id: PermissionId) -> StorageResult<bool> {
        Ok(self.grants.entry(user_id).or_default().insert(permission_id))
    }

    async fn remove_grant(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> StorageResult<bool> {
        Ok(self
            .grants
            .get_mut(&user_id)
            .map_or(false, |mut set| set.remove(&permission_id)))
    }
}

#[async_trait]
impl AuditStore for InMemoryBackend {
    async fn insert_entry(&self, entry: &AuditLogEntry) -> StorageResult<()> {
        self.audit.write().push(entry.clone());
        Ok(())
    }

    async fn query_entries(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> StorageResult<Page<AuditLogEntry>> {
        let mut matching: Vec<AuditLogEntry> = self
            .audit
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        // Stable sort keeps insertion order reversed for equal timestamps.
        matching.reverse();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(paginate(&matching, page))
    }

    async fn count_entries(&self, filter: &AuditFilter) -> StorageResult<u64> {
        Ok(self.audit.read().iter().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn group_counts(
        &self,
        range: TimeRange,
        dimension: AuditDimension,
        limit: Option<u64>,
    ) -> StorageResult<Vec<(String, u64)>> {
        let mut counts: HashMap<String, u64> = HashMap::new();

        for entry in self.audit.read().iter().filter(|e| range.contains(e.timestamp)) {
            let key = match dimension {
                AuditDimension::Action => entry.action.clone(),
                AuditDimension::Resource => entry.resource.clone(),
                AuditDimension::User => entry
                    .user_id
                    .map_or_else(|| SYSTEM_ACTOR.to_string(), |id| id.to_string()),
            };
            *counts.entry(key).or_default() += 1;
        }

        let mut grouped: Vec<(String, u64)> = counts.into_iter().collect();
        grouped.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        if let Some(limit) = limit {
            grouped.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(grouped)
    }

    async fn delete_entries_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut audit = self.audit.write();
        let before = audit.len();
        audit.retain(|e| e.timestamp >= cutoff);
        Ok((before - audit.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use keystone_core::NewUser;

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let backend = InMemoryBackend::new();
        backend
            .create_user(&NewUser::new("a@example.com").into_user())
            .await
            .unwrap();

        let err = backend
            .create_user(&NewUser::new("a@example.com").into_user())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_last_admin_guard_is_atomic() {
        let backend = InMemoryBackend::new();
        let first = NewUser::new("a@example.com").with_role(Role::Admin).into_user();
        let second = NewUser::new("b@example.com").with_role(Role::Admin).into_user();
        backend.create_user(&first).await.unwrap();
        backend.create_user(&second).await.unwrap();

        let (a, b) = tokio::join!(backend.delete_user(first.id), backend.delete_user(second.id));
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, AdminGuarded::Applied(_)))
                .count(),
            1
        );
        assert!(outcomes.contains(&AdminGuarded::LastAdmin));
        assert_eq!(backend.count_users_with_role(Role::Admin).await.unwrap(), 1);

        let survivor = if backend.get_user(first.id).await.unwrap().is_some() {
            first.id
        } else {
            second.id
        };
        assert_eq!(
            backend.update_user_role(survivor, Role::User).await.unwrap(),
            AdminGuarded::LastAdmin
        );
        assert_eq!(
            backend.delete_user(UserId::new()).await.unwrap(),
            AdminGuarded::NotFound
        );
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_by_name() {
        let backend = InMemoryBackend::new();
        let first = backend.upsert_permission("read:users", "old").await.unwrap();
        let second = backend.upsert_permission("read:users", "new").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.description, "new");
        assert_eq!(backend.list_permissions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grants_are_idempotent() {
        let backend = InMemoryBackend::new();
        let user = UserId::new();
        let perm = backend.upsert_permission("read:widgets", "").await.unwrap();

        assert!(backend.add_grant(user, perm.id).await.unwrap());
        assert!(!backend.add_grant(user, perm.id).await.unwrap());
        assert!(backend.remove_grant(user, perm.id).await.unwrap());
        assert!(!backend.remove_grant(user, perm.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_permission_cascades_grants() {
        let backend = InMemoryBackend::new();
        let user = UserId::new();
        let perm = backend.upsert_permission("read:widgets", "").await.unwrap();
        backend.add_grant(user, perm.id).await.unwrap();

        assert_eq!(backend.permission_holders(perm.id).await.unwrap(), vec![user]);
        assert!(backend.delete_permission(perm.id).await.unwrap());
        assert!(backend.user_permissions(user).await.unwrap().is_empty());
        assert!(backend.permission_holders(perm.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_query_newest_first_and_cleanup() {
        let backend = InMemoryBackend::new();
        let now = Utc::now();

        for days_ago in [100, 10, 1] {
            let entry = AuditLogEntry::builder(format!("action_{days_ago}"), "users")
                .timestamp(now - Duration::days(days_ago))
                .build();
            backend.insert_entry(&entry).await.unwrap();
        }

        let page = backend
            .query_entries(&AuditFilter::new(), PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].action, "action_1");
        assert_eq!(page.items[2].action, "action_100");

        let deleted = backend
            .delete_entries_before(now - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(backend.audit_len(), 2);
    }

    #[tokio::test]
    async fn test_group_counts_by_user_uses_system_key() {
        let backend = InMemoryBackend::new();
        let user = UserId::new();
        for actor in [Some(user), Some(user), None] {
            let entry = AuditLogEntry::builder("seed", "permissions").user(actor).build();
            backend.insert_entry(&entry).await.unwrap();
        }

        let grouped = backend
            .group_counts(TimeRange::default(), AuditDimension::User, None)
            .await
            .unwrap();
        assert_eq!(grouped[0], (user.to_string(), 2));
        assert_eq!(grouped[1], (SYSTEM_ACTOR.to_string(), 1));
    }
}
