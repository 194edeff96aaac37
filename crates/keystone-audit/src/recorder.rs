//! Audit recorder.

use crate::redact::redact_in_place;
use crate::stats::{percentage, AuditStats, CountEntry};
use crate::{AuditConfig, AuditError, AuditResult};
use chrono::{Duration, Utc};
use keystone_core::{
    AuditDimension, AuditFilter, AuditLogEntry, Page, PageRequest, StatsPeriod, TimeRange,
};
use keystone_storage::AuditStore;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Writes, reads and purges the audit trail.
///
/// Writes are best-effort: [`AuditRecorder::record`] sanitizes the entry and
/// persists it, but a storage failure is logged rather than returned so it
/// never aborts the operation being audited.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    config: AuditConfig,
}

impl AuditRecorder {
    /// Creates a recorder with default settings.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self::with_config(store, AuditConfig::default())
    }

    /// Creates a recorder with explicit settings.
    pub fn with_config(store: Arc<dyn AuditStore>, config: AuditConfig) -> Self {
        Self { store, config }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Redacts and persists an entry. Never fails.
    pub async fn record(&self, mut entry: AuditLogEntry) {
        if let Some(ref mut values) = entry.old_values {
            redact_in_place(values);
        }
        if let Some(ref mut values) = entry.new_values {
            redact_in_place(values);
        }

        match self.store.insert_entry(&entry).await {
            Ok(()) => debug!(
                entry_id = %entry.id,
                action = %entry.action,
                resource = %entry.resource,
                success = entry.success,
                "Audit entry recorded"
            ),
            Err(e) => error!(
                error = %e,
                action = %entry.action,
                resource = %entry.resource,
                resource_id = entry.resource_id.as_deref().unwrap_or("-"),
                "Failed to record audit entry"
            ),
        }
    }

    /// Returns matching entries, newest first.
    pub async fn query(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> AuditResult<Page<AuditLogEntry>> {
        check_range(filter.range)?;
        Ok(self.store.query_entries(filter, page).await?)
    }

    /// Aggregates the period ending now.
    pub async fn stats(&self, period: StatsPeriod) -> AuditResult<AuditStats> {
        self.stats_in_range(period.range_ending(Utc::now())).await
    }

    /// Aggregates an explicit range.
    pub async fn stats_in_range(&self, range: TimeRange) -> AuditResult<AuditStats> {
        check_range(range)?;

        let in_range = AuditFilter::new().in_range(range);
        let total_actions = self.store.count_entries(&in_range).await?;
        let successes = self
            .store
            .count_entries(&in_range.clone().with_success(true))
            .await?;
        let failures = total_actions.saturating_sub(successes);

        let by_action = self
            .store
            .group_counts(range, AuditDimension::Action, None)
            .await?;
        let by_resource = self
            .store
            .group_counts(range, AuditDimension::Resource, None)
            .await?;
        let by_user = self
            .store
            .group_counts(range, AuditDimension::User, None)
            .await?;

        let top_limit = usize::try_from(self.config.top_limit).unwrap_or(usize::MAX);
        let top_actions = by_action
            .iter()
            .take(top_limit)
            .map(|(key, count)| CountEntry {
                key: key.clone(),
                count: *count,
            })
            .collect();

        let recent_activity = self
            .store
            .query_entries(&in_range, PageRequest::new(0, self.config.recent_limit))
            .await?
            .items;

        Ok(AuditStats {
            range,
            total_actions,
            counts_by_action: by_action.into_iter().collect(),
            counts_by_resource: by_resource.into_iter().collect(),
            counts_by_user: by_user.into_iter().collect(),
            success_rate: percentage(successes, total_actions),
            error_rate: percentage(failures, total_actions),
            top_actions,
            recent_activity,
        })
    }

    /// Deletes entries older than `retention_days`. Returns the number deleted.
    ///
    /// A retention reaching past the earliest representable timestamp
    /// deletes nothing.
    pub async fn cleanup(&self, retention_days: u32) -> AuditResult<u64> {
        let cutoff = Duration::try_days(i64::from(retention_days))
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        let Some(cutoff) = cutoff else {
            info!(retention_days, "Retention exceeds timestamp range; nothing to delete");
            return Ok(0);
        };
        let deleted = self.store.delete_entries_before(cutoff).await?;
        info!(retention_days, %cutoff, deleted, "Audit retention sweep completed");
        Ok(deleted)
    }

    /// Deletes entries older than the configured retention.
    pub async fn cleanup_expired(&self) -> AuditResult<u64> {
        self.cleanup(self.config.retention_days).await
    }
}

fn check_range(range: TimeRange) -> AuditResult<()> {
    match (range.from, range.to) {
        (Some(from), Some(to)) if from >= to => Err(AuditError::InvalidRange(format!(
            "from ({from}) must be before to ({to})"
        ))),
        _ => Ok(()),
    }
}
