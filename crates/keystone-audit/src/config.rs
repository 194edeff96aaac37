//! Audit configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Audit trail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Entries older than this many days are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Hours between retention sweeps.
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
    /// Number of entries returned as recent activity in stats.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u64,
    /// Number of actions returned as top actions in stats.
    #[serde(default = "default_top_limit")]
    pub top_limit: u64,
}

fn default_retention_days() -> u32 {
    90
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

fn default_recent_limit() -> u64 {
    10
}

fn default_top_limit() -> u64 {
    10
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
            recent_limit: default_recent_limit(),
            top_limit: default_top_limit(),
        }
    }
}

impl AuditConfig {
    /// Interval between retention sweeps.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours.max(1) * 3600)
    }
}
