//! Audit trail handlers.

use crate::{
    middleware::RequestActor,
    pagination::{PagedResponse, Pagination},
    ApiError, ApiResult, AppState,
};
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use keystone_audit::AuditStats;
use keystone_core::{AuditFilter, AuditLogEntry, StatsPeriod, TimeRange, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Audit query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    /// Acting principal.
    pub user_id: Option<UserId>,
    /// Action substring.
    pub action: Option<String>,
    /// Resource substring.
    pub resource: Option<String>,
    /// Exact resource id.
    pub resource_id: Option<String>,
    /// Success flag.
    pub success: Option<bool>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    /// Page number.
    pub page: Option<u64>,
    /// Page size.
    pub page_size: Option<u64>,
}

impl AuditQuery {
    fn filter(&self) -> AuditFilter {
        AuditFilter {
            user_id: self.user_id,
            action: self.action.clone(),
            resource: self.resource.clone(),
            resource_id: self.resource_id.clone(),
            success: self.success,
            range: TimeRange {
                from: self.from,
                to: self.to,
            },
        }
    }

    fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            page: self.page.unwrap_or(defaults.page),
            page_size: self.page_size.unwrap_or(defaults.page_size),
        }
    }
}

/// Stats query parameters. An explicit range wins over `period`.
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// `day`, `week` or `month`.
    pub period: Option<String>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

/// Cleanup parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CleanupQuery {
    /// Overrides the configured retention.
    pub retention_days: Option<u32>,
}

/// Cleanup result.
#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    /// Retention applied.
    pub retention_days: u32,
    /// Entries deleted.
    pub deleted: u64,
}

/// Queries the trail, newest first. Requires `read:audit`.
pub async fn query_audit_log(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<PagedResponse<AuditLogEntry>>> {
    actor.require(&state, "read:audit").await?;
    let page = state
        .audit
        .query(&query.filter(), query.pagination().to_request())
        .await?;
    Ok(Json(page.into()))
}

/// Aggregates the trail. Requires `read:audit`.
pub async fn audit_stats(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<AuditStats>> {
    actor.require(&state, "read:audit").await?;

    let stats = if query.from.is_some() || query.to.is_some() {
        state
            .audit
            .stats_in_range(TimeRange {
                from: query.from,
                to: query.to,
            })
            .await?
    } else {
        let period = match query.period.as_deref() {
            Some(p) => p
                .parse::<StatsPeriod>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
            None => StatsPeriod::default(),
        };
        state.audit.stats(period).await?
    };

    Ok(Json(stats))
}

/// Deletes entries past retention. Requires `manage:audit`.
pub async fn cleanup_audit_log(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Query(query): Query<CleanupQuery>,
) -> ApiResult<Json<CleanupResponse>> {
    actor.require(&state, "manage:audit").await?;

    let retention_days = query
        .retention_days
        .unwrap_or(state.audit.config().retention_days);
    if retention_days == 0 {
        return Err(ApiError::BadRequest(
            "retention_days must be at least 1".to_string(),
        ));
    }

    let deleted = state.audit.cleanup(retention_days).await?;
    state
        .audit
        .record(
            actor
                .context()
                .audit("cleanup_audit_log", "audit_log")
                .new_values(json!({ "retention_days": retention_days, "deleted": deleted }))
                .build(),
        )
        .await;

    Ok(Json(CleanupResponse {
        retention_days,
        deleted,
    }))
}
