//! Recording must survive an unavailable audit store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_audit::{AuditError, AuditRecorder};
use keystone_core::{AuditDimension, AuditFilter, AuditLogEntry, Page, PageRequest, TimeRange};
use keystone_storage::{AuditStore, StorageError, StorageResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct UnavailableStore {
    attempts: AtomicUsize,
}

fn down() -> StorageError {
    StorageError::Backend("audit database unreachable".to_string())
}

#[async_trait]
impl AuditStore for UnavailableStore {
    async fn insert_entry(&self, _entry: &AuditLogEntry) -> StorageResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(down())
    }

    async fn query_entries(
        &self,
        _filter: &AuditFilter,
        _page: PageRequest,
    ) -> StorageResult<Page<AuditLogEntry>> {
        Err(down())
    }

    async fn count_entries(&self, _filter: &AuditFilter) -> StorageResult<u64> {
        Err(down())
    }

    async fn group_counts(
        &self,
        _range: TimeRange,
        _dimension: AuditDimension,
        _limit: Option<u64>,
    ) -> StorageResult<Vec<(String, u64)>> {
        Err(down())
    }

    async fn delete_entries_before(&self, _cutoff: DateTime<Utc>) -> StorageResult<u64> {
        Err(down())
    }
}

#[tokio::test]
async fn record_swallows_storage_failures() {
    let store = Arc::new(UnavailableStore::default());
    let recorder = AuditRecorder::new(store.clone());

    recorder
        .record(AuditLogEntry::builder("grant_permission", "user_permissions").build())
        .await;
    recorder
        .record(AuditLogEntry::builder("revoke_permission", "user_permissions").build())
        .await;

    assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn read_paths_still_report_failures() {
    let recorder = AuditRecorder::new(Arc::new(UnavailableStore::default()));

    let err = recorder
        .query(&AuditFilter::new(), PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Storage(_)));
    assert_eq!(err.http_status(), 500);

    assert!(recorder.cleanup(90).await.is_err());
}
