//! End-to-end flows across catalog, grants, resolver, guard and audit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_access::{
    AccessConfig, AccessControl, AccessDecision, ActorContext, PermissionRequirement,
};
use keystone_audit::AuditRecorder;
use keystone_core::{
    AuditDimension, AuditFilter, AuditLogEntry, NewUser, Page, PageRequest, Role, TimeRange,
    UserId,
};
use keystone_storage::{AuditStore, InMemoryBackend, StorageError, StorageResult};
use std::sync::Arc;

fn access_over(backend: &Arc<InMemoryBackend>, audit: AuditRecorder) -> AccessControl {
    AccessControl::new(backend.clone(), backend.clone(), audit, &AccessConfig::default())
}

#[tokio::test]
async fn grant_resolve_revoke_widgets() {
    let backend = Arc::new(InMemoryBackend::new());
    let audit = AuditRecorder::new(backend.clone());
    let access = access_over(&backend, audit.clone());

    let admin = access
        .users()
        .create_user(&ActorContext::system(), NewUser::new("root@x.io").with_role(Role::Admin))
        .await
        .unwrap();
    let actor = ActorContext::user(admin.id).with_client(Some("10.1.2.3".into()), None);

    let widgets = access
        .permissions()
        .create(&actor, "read:widgets", "Read widgets")
        .await
        .unwrap();
    let user = access
        .users()
        .create_user(&actor, NewUser::new("u@x.io"))
        .await
        .unwrap();

    access.grants().grant(&actor, user.id, widgets.id).await.unwrap();
    assert!(access.resolver().resolve(user.id).await.unwrap().contains("read:widgets"));

    access.grants().revoke(&actor, user.id, widgets.id).await.unwrap();
    assert!(!access.resolver().resolve(user.id).await.unwrap().contains("read:widgets"));

    let trail = audit
        .query(
            &AuditFilter::new()
                .resource_contains("user_permissions")
                .for_resource_id(user.id.to_string()),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(trail.total, 2);
    assert!(trail.items.iter().all(|e| e.success));
    assert!(trail.items.iter().all(|e| e.user_id == Some(admin.id)));
    assert_eq!(trail.items[0].action, "revoke_permission");
    assert_eq!(trail.items[1].action, "grant_permission");
    assert_eq!(trail.items[0].ip_address.as_deref(), Some("10.1.2.3"));
}

#[tokio::test]
async fn guard_distinguishes_unauthenticated_from_deny() {
    let backend = Arc::new(InMemoryBackend::new());
    let access = access_over(&backend, AuditRecorder::new(backend.clone()));
    access.seed_catalog().await.unwrap();

    let user = access
        .users()
        .create_user(&ActorContext::system(), NewUser::new("u@x.io"))
        .await
        .unwrap();
    let req = PermissionRequirement::one("read:audit");

    assert_eq!(
        access.guard().authorize(None, &req).await.unwrap(),
        AccessDecision::Unauthenticated
    );
    assert_eq!(
        access.guard().authorize(Some(UserId::new()), &req).await.unwrap(),
        AccessDecision::Unauthenticated
    );
    assert_eq!(
        access.guard().authorize(Some(user.id), &req).await.unwrap(),
        AccessDecision::Deny {
            missing: vec!["read:audit".to_string()]
        }
    );

    // Role-derived names pass without explicit grants.
    assert!(access
        .guard()
        .authorize(Some(user.id), &PermissionRequirement::one("upload:files"))
        .await
        .unwrap()
        .is_allowed());
}

#[tokio::test]
async fn role_change_takes_effect_immediately() {
    let backend = Arc::new(InMemoryBackend::new());
    let access = access_over(&backend, AuditRecorder::new(backend.clone()));
    let system = ActorContext::system();

    access
        .users()
        .create_user(&system, NewUser::new("root@x.io").with_role(Role::Admin))
        .await
        .unwrap();
    let user = access.users().create_user(&system, NewUser::new("u@x.io")).await.unwrap();
    let req = PermissionRequirement::one("delete:users");

    assert!(!access.guard().authorize(Some(user.id), &req).await.unwrap().is_allowed());
    access.users().update_role(&system, user.id, Role::Admin).await.unwrap();
    assert!(access.guard().authorize(Some(user.id), &req).await.unwrap().is_allowed());

    access.users().update_role(&system, user.id, Role::User).await.unwrap();
    assert!(!access.guard().authorize(Some(user.id), &req).await.unwrap().is_allowed());

    access.users().delete_user(&system, user.id).await.unwrap();
    assert_eq!(
        access.guard().authorize(Some(user.id), &req).await.unwrap(),
        AccessDecision::Unauthenticated
    );
}

struct BrokenAuditStore;

#[async_trait]
impl AuditStore for BrokenAuditStore {
    async fn insert_entry(&self, _entry: &AuditLogEntry) -> StorageResult<()> {
        Err(StorageError::Database("audit_log is read-only".to_string()))
    }

    async fn query_entries(
        &self,
        _filter: &AuditFilter,
        _page: PageRequest,
    ) -> StorageResult<Page<AuditLogEntry>> {
        Err(StorageError::Database("unavailable".to_string()))
    }

    async fn count_entries(&self, _filter: &AuditFilter) -> StorageResult<u64> {
        Err(StorageError::Database("unavailable".to_string()))
    }

    async fn group_counts(
        &self,
        _range: TimeRange,
        _dimension: AuditDimension,
        _limit: Option<u64>,
    ) -> StorageResult<Vec<(String, u64)>> {
        Err(StorageError::Database("unavailable".to_string()))
    }

    async fn delete_entries_before(&self, _cutoff: DateTime<Utc>) -> StorageResult<u64> {
        Err(StorageError::Database("unavailable".to_string()))
    }
}

#[tokio::test]
async fn grants_succeed_when_audit_store_fails() {
    let backend = Arc::new(InMemoryBackend::new());
    let access = access_over(&backend, AuditRecorder::new(Arc::new(BrokenAuditStore)));
    let system = ActorContext::system();

    let perm = access
        .permissions()
        .create(&system, "read:widgets", "")
        .await
        .unwrap();
    let user = access.users().create_user(&system, NewUser::new("u@x.io")).await.unwrap();

    assert!(access.grants().grant(&system, user.id, perm.id).await.unwrap());
    assert!(access.resolver().resolve(user.id).await.unwrap().contains("read:widgets"));
    assert!(access.grants().revoke(&system, user.id, perm.id).await.unwrap());
    assert_eq!(backend.audit_len(), 0);
}
