//! Storage traits and backend implementations.
//!
//! Components receive these traits as `Arc<dyn ...>` handles so tests can
//! swap in doubles.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_core::{
    AuditDimension, AuditFilter, AuditLogEntry, Page, PageRequest, Permission, PermissionId, Role,
    TimeRange, User, UserId,
};

/// Group key used for audit entries without an acting principal.
pub const SYSTEM_ACTOR: &str = "system";

/// Outcome of a user write that must leave at least one admin in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminGuarded<T> {
    /// The write was applied.
    Applied(T),
    /// No user with that id.
    NotFound,
    /// The write would have removed the last admin. Nothing changed.
    LastAdmin,
}

/// Principal persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. Fails with `AlreadyExists` on a duplicate email.
    async fn create_user(&self, user: &User) -> StorageResult<()>;

    /// Loads a user by id.
    async fn get_user(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Loads a user by email.
    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// Lists users ordered by creation time.
    async fn list_users(&self, page: PageRequest) -> StorageResult<Page<User>>;

    /// Changes a user's role, returning the user before and after.
    ///
    /// The admin count check and the update are one atomic step, so
    /// concurrent demotions can never leave zero admins.
    async fn update_user_role(
        &self,
        id: UserId,
        role: Role,
    ) -> StorageResult<AdminGuarded<(User, User)>>;

    /// Deletes a user and its grants, returning the deleted user.
    ///
    /// Refuses to delete the last admin, atomically with the delete.
    async fn delete_user(&self, id: UserId) -> StorageResult<AdminGuarded<User>>;

    /// Counts users holding `role`.
    async fn count_users_with_role(&self, role: Role) -> StorageResult<u64>;
}

/// Permission rows and the explicit user-permission relation.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Inserts by name, or updates the description of the existing row.
    async fn upsert_permission(&self, name: &str, description: &str) -> StorageResult<Permission>;

    /// Inserts a permission. Fails with `AlreadyExists` on a duplicate name.
    async fn create_permission(&self, permission: &Permission) -> StorageResult<()>;

    /// Loads a permission by id.
    async fn get_permission(&self, id: PermissionId) -> StorageResult<Option<Permission>>;

    /// Loads a permission by name.
    async fn find_permission_by_name(&self, name: &str) -> StorageResult<Option<Permission>>;

    /// Lists all permissions ordered by name.
    async fn list_permissions(&self) -> StorageResult<Vec<Permission>>;

    /// Overwrites name and description. Fails with `NotFound` or `AlreadyExists`.
    async fn update_permission(&self, permission: &Permission) -> StorageResult<()>;

    /// Deletes a permission and every grant referencing it. Returns false if absent.
    async fn delete_permission(&self, id: PermissionId) -> StorageResult<bool>;

    /// Returns the users holding an explicit grant of `id`.
    async fn permission_holders(&self, id: PermissionId) -> StorageResult<Vec<UserId>>;

    /// Returns the permissions explicitly granted to a user.
    async fn user_permissions(&self, user_id: UserId) -> StorageResult<Vec<Permission>>;

    /// Adds a grant. Returns true if the relation was created.
    async fn add_grant(&self, user_id: UserId, permission_id: PermissionId) -> StorageResult<bool>;

    /// Removes a grant. Returns true if the relation existed.
    async fn remove_grant(&self, user_id: UserId, permission_id: PermissionId)
        -> StorageResult<bool>;
}

/// Append-mostly audit log persistence.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends an entry.
    async fn insert_entry(&self, entry: &AuditLogEntry) -> StorageResult<()>;

    /// Returns matching entries, newest first.
    async fn query_entries(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> StorageResult<Page<AuditLogEntry>>;

    /// Counts matching entries.
    async fn count_entries(&self, filter: &AuditFilter) -> StorageResult<u64>;

    /// Counts entries in `range` grouped by `dimension`, largest first.
    async fn group_counts(
        &self,
        range: TimeRange,
        dimension: AuditDimension,
        limit: Option<u64>,
    ) -> StorageResult<Vec<(String, u64)>>;

    /// Deletes entries older than `cutoff`. Returns the number deleted.
    async fn delete_entries_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}
