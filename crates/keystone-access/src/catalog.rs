//! Static permission catalog and role mapping.

use crate::AccessResult;
use keystone_core::Role;
use keystone_storage::PermissionStore;
use serde::Serialize;
use tracing::info;

/// A catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionDefinition {
    /// `action:resource` name.
    pub name: &'static str,
    /// Human description.
    pub description: &'static str,
}

const fn def(name: &'static str, description: &'static str) -> PermissionDefinition {
    PermissionDefinition { name, description }
}

static DEFINITIONS: &[PermissionDefinition] = &[
    def("read:users", "View user accounts"),
    def("create:users", "Create user accounts"),
    def("update:users", "Edit user accounts and roles"),
    def("delete:users", "Delete user accounts"),
    def("read:permissions", "View permissions and grants"),
    def("manage:permissions", "Create, edit and delete permissions"),
    def("assign:permissions", "Grant and revoke user permissions"),
    def("read:audit", "View the audit log and its statistics"),
    def("manage:audit", "Purge expired audit entries"),
    def("read:settings", "View application settings"),
    def("update:settings", "Change application settings"),
    def("upload:files", "Upload avatars and logos"),
    def("manage:backups", "Export and restore backups"),
    def("send:notifications", "Send notifications to users"),
];

static USER_PERMISSIONS: &[&str] = &["read:settings", "upload:files"];

/// Returns the catalog in seeding order.
#[must_use]
pub fn list_definitions() -> &'static [PermissionDefinition] {
    DEFINITIONS
}

/// Returns the names a role grants implicitly.
///
/// Admin maps to an empty list: it is resolved as the all-permissions
/// sentinel and never enumerated.
#[must_use]
pub fn role_permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::User => USER_PERMISSIONS,
        Role::Admin => &[],
    }
}

/// Outcome of a seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Rows inserted.
    pub created: usize,
    /// Rows whose description changed.
    pub updated: usize,
    /// Rows already current.
    pub unchanged: usize,
}

/// Upserts every catalog entry by name. Safe to re-run.
pub async fn seed(store: &dyn PermissionStore) -> AccessResult<SeedReport> {
    let mut report = SeedReport::default();

    for definition in DEFINITIONS {
        match store.find_permission_by_name(definition.name).await? {
            Some(existing) if existing.description == definition.description => {
                report.unchanged += 1;
                continue;
            }
            Some(_) => report.updated += 1,
            None => report.created += 1,
        }
        store
            .upsert_permission(definition.name, definition.description)
            .await?;
    }

    info!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        "Permission catalog seeded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::{validate_permission_name, Permission};
    use keystone_storage::InMemoryBackend;
    use std::collections::HashSet;

    #[test]
    fn test_definitions_are_valid_and_unique() {
        let mut seen = HashSet::new();
        for d in list_definitions() {
            validate_permission_name(d.name).unwrap();
            assert!(seen.insert(d.name), "duplicate {}", d.name);
        }
    }

    #[test]
    fn test_role_mapping_is_subset_of_catalog() {
        let names: HashSet<_> = list_definitions().iter().map(|d| d.name).collect();
        for name in role_permissions(Role::User) {
            assert!(names.contains(name));
        }
        assert!(role_permissions(Role::Admin).is_empty());
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = InMemoryBackend::new();

        let first = seed(&store).await.unwrap();
        assert_eq!(first.created, list_definitions().len());

        let second = seed(&store).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.unchanged, list_definitions().len());
        assert_eq!(store.list_permissions().await.unwrap().len(), list_definitions().len());
    }

    #[tokio::test]
    async fn test_seed_updates_descriptions_in_place() {
        let store = InMemoryBackend::new();
        let stale = Permission::new("read:users", "old text");
        store.create_permission(&stale).await.unwrap();

        let report = seed(&store).await.unwrap();
        assert_eq!(report.updated, 1);

        let row = store.find_permission_by_name("read:users").await.unwrap().unwrap();
        assert_eq!(row.id, stale.id);
        assert_eq!(row.description, "View user accounts");
    }
}
