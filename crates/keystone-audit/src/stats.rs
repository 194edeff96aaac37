//! Aggregate views over the audit log.

use keystone_core::{AuditLogEntry, TimeRange};
use serde::Serialize;
use std::collections::BTreeMap;

/// A grouping key with its entry count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    /// Group key (action, resource or user id).
    pub key: String,
    /// Number of entries.
    pub count: u64,
}

/// Audit statistics for a time range.
#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    /// Range the statistics cover.
    pub range: TimeRange,
    /// Entries in range.
    pub total_actions: u64,
    /// Entries per action.
    pub counts_by_action: BTreeMap<String, u64>,
    /// Entries per resource type.
    pub counts_by_resource: BTreeMap<String, u64>,
    /// Entries per acting user. System actions are keyed `"system"`.
    pub counts_by_user: BTreeMap<String, u64>,
    /// Successful entries as a percentage of the total.
    pub success_rate: f64,
    /// Failed entries as a percentage of the total.
    pub error_rate: f64,
    /// Most frequent actions, largest first.
    pub top_actions: Vec<CountEntry>,
    /// Newest entries in range.
    pub recent_activity: Vec<AuditLogEntry>,
}

/// Returns `part` as a percentage of `total`, rounded to two decimals.
pub(crate) fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = part as f64 / total as f64;
    (ratio * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 4), 75.0);
        assert_eq!(percentage(1, 3), 33.33);
    }
}
