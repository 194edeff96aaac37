//! Audit logging types.

use crate::{AuditEntryId, CoreError, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An append-only record of who did what to which resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique entry identifier.
    pub id: AuditEntryId,

    /// Acting principal. `None` for system actions.
    pub user_id: Option<UserId>,

    /// Action verb, e.g. `grant_permission`.
    pub action: String,

    /// Resource type, e.g. `user_permissions`.
    pub resource: String,

    /// Affected resource id.
    pub resource_id: Option<String>,

    /// Snapshot before the mutation.
    pub old_values: Option<serde_json::Value>,

    /// Snapshot after the mutation.
    pub new_values: Option<serde_json::Value>,

    /// Client IP address.
    pub ip_address: Option<String>,

    /// Client user agent.
    pub user_agent: Option<String>,

    /// Whether the action succeeded.
    pub success: bool,

    /// Error text for failed actions.
    pub error: Option<String>,

    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Creates a new audit entry builder.
    #[must_use]
    pub fn builder(action: impl Into<String>, resource: impl Into<String>) -> AuditLogEntryBuilder {
        AuditLogEntryBuilder::new(action, resource)
    }
}

/// Builder for audit entries.
#[derive(Debug)]
pub struct AuditLogEntryBuilder {
    entry: AuditLogEntry,
}

impl AuditLogEntryBuilder {
    fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            entry: AuditLogEntry {
                id: AuditEntryId::new(),
                user_id: None,
                action: action.into(),
                resource: resource.into(),
                resource_id: None,
                old_values: None,
                new_values: None,
                ip_address: None,
                user_agent: None,
                success: true,
                error: None,
                timestamp: Utc::now(),
            },
        }
    }

    /// Sets the acting principal.
    #[must_use]
    pub fn user(mut self, user_id: Option<UserId>) -> Self {
        self.entry.user_id = user_id;
        self
    }

    /// Sets the affected resource id.
    #[must_use]
    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.entry.resource_id = Some(id.to_string());
        self
    }

    /// Sets the before snapshot.
    #[must_use]
    pub fn old_values(mut self, values: serde_json::Value) -> Self {
        self.entry.old_values = Some(values);
        self
    }

    /// Sets the after snapshot.
    #[must_use]
    pub fn new_values(mut self, values: serde_json::Value) -> Self {
        self.entry.new_values = Some(values);
        self
    }

    /// Sets client metadata.
    #[must_use]
    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.entry.ip_address = ip_address;
        self.entry.user_agent = user_agent;
        self
    }

    /// Marks the entry as failed.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.entry.success = false;
        self.entry.error = Some(error.into());
        self
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.entry.timestamp = timestamp;
        self
    }

    /// Builds the entry.
    #[must_use]
    pub fn build(self) -> AuditLogEntry {
        self.entry
    }
}

/// Half-open time range `[from, to)`. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Returns true if `ts` falls inside the range.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts < to)
    }
}

/// Filter for audit queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Exact acting principal.
    pub user_id: Option<UserId>,
    /// Substring of the action.
    pub action: Option<String>,
    /// Substring of the resource.
    pub resource: Option<String>,
    /// Exact resource id.
    pub resource_id: Option<String>,
    /// Success flag.
    pub success: Option<bool>,
    /// Time range.
    #[serde(default)]
    pub range: TimeRange,
}

impl AuditFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by principal.
    #[must_use]
    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Filters by action substring.
    #[must_use]
    pub fn action_contains(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Filters by resource substring.
    #[must_use]
    pub fn resource_contains(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Filters by resource id.
    #[must_use]
    pub fn for_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Filters by success flag.
    #[must_use]
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// Filters by time range.
    #[must_use]
    pub fn in_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    /// Matches an entry against this filter.
    #[must_use]
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(user_id) = self.user_id {
            if entry.user_id != Some(user_id) {
                return false;
            }
        }

        if let Some(ref action) = self.action {
            if !entry.action.contains(action.as_str()) {
                return false;
            }
        }

        if let Some(ref resource) = self.resource {
            if !entry.resource.contains(resource.as_str()) {
                return false;
            }
        }

        if let Some(ref resource_id) = self.resource_id {
            if entry.resource_id.as_ref() != Some(resource_id) {
                return false;
            }
        }

        if let Some(success) = self.success {
            if entry.success != success {
                return false;
            }
        }

        self.range.contains(entry.timestamp)
    }
}

/// Offset pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u64,
}

impl PageRequest {
    /// Largest page a caller may request.
    pub const MAX_LIMIT: u64 = 500;

    /// Creates a page request, clamping the limit to `1..=MAX_LIMIT`.
    #[must_use]
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

/// A page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total items matching the filter.
    pub total: u64,
    /// Offset used.
    pub offset: u64,
    /// Limit used.
    pub limit: u64,
}

/// Column used for grouped audit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDimension {
    /// Group by action.
    Action,
    /// Group by resource.
    Resource,
    /// Group by acting principal.
    User,
}

/// Named reporting period for audit stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    /// Last 24 hours.
    Day,
    /// Last 7 days.
    #[default]
    Week,
    /// Last 30 days.
    Month,
}

impl StatsPeriod {
    /// Returns the period length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::Day => Duration::days(1),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
        }
    }

    /// Returns the range ending at `now`.
    #[must_use]
    pub fn range_ending(&self, now: DateTime<Utc>) -> TimeRange {
        TimeRange {
            from: Some(now - self.duration()),
            to: None,
        }
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
        }
    }
}

impl FromStr for StatsPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" | "24h" => Ok(Self::Day),
            "week" | "7d" => Ok(Self::Week),
            "month" | "30d" => Ok(Self::Month),
            other => Err(CoreError::UnknownPeriod(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_success() {
        let entry = AuditLogEntry::builder("create_permission", "permissions").build();
        assert!(entry.success);
        assert!(entry.error.is_none());
        assert!(entry.user_id.is_none());
    }

    #[test]
    fn test_failed_entry() {
        let entry = AuditLogEntry::builder("delete_user", "users")
            .failed("cannot delete the last admin")
            .build();
        assert!(!entry.success);
        assert_eq!(entry.error.as_deref(), Some("cannot delete the last admin"));
    }

    #[test]
    fn test_filter_substring_and_exact_fields() {
        let user = UserId::new();
        let entry = AuditLogEntry::builder("grant_permission", "user_permissions")
            .user(Some(user))
            .resource_id("abc")
            .build();

        assert!(AuditFilter::new().action_contains("grant").matches(&entry));
        assert!(AuditFilter::new().resource_contains("permissions").matches(&entry));
        assert!(AuditFilter::new().for_user(user).matches(&entry));
        assert!(!AuditFilter::new().for_user(UserId::new()).matches(&entry));
        assert!(!AuditFilter::new().for_resource_id("ab").matches(&entry));
        assert!(!AuditFilter::new().with_success(false).matches(&entry));
    }

    #[test]
    fn test_time_range_is_half_open() {
        let now = Utc::now();
        let range = TimeRange {
            from: Some(now),
            to: Some(now + Duration::seconds(10)),
        };
        assert!(range.contains(now));
        assert!(!range.contains(now + Duration::seconds(10)));
        assert!(!range.contains(now - Duration::seconds(1)));
    }

    #[test]
    fn test_page_request_clamps_limit() {
        assert_eq!(PageRequest::new(0, 0).limit, 1);
        assert_eq!(PageRequest::new(0, 10_000).limit, PageRequest::MAX_LIMIT);
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("day".parse::<StatsPeriod>().unwrap(), StatsPeriod::Day);
        assert_eq!("30d".parse::<StatsPeriod>().unwrap(), StatsPeriod::Month);
        assert!("year".parse::<StatsPeriod>().is_err());
    }
}
