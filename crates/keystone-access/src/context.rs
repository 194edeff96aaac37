//! Acting principal for mutating operations.

use crate::AccessError;
use keystone_audit::AuditRecorder;
use keystone_core::{AuditLogEntry, AuditLogEntryBuilder, UserId};

/// Who is performing a mutation, and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    /// Acting principal. `None` for system actions.
    pub user_id: Option<UserId>,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

impl ActorContext {
    /// Context for a background or bootstrap action.
    #[must_use]
    pub fn system() -> Self {
        Self::default()
    }

    /// Context for an authenticated principal.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Attaches client details.
    #[must_use]
    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    /// Starts an audit entry attributed to this actor.
    #[must_use]
    pub fn audit(&self, action: &str, resource: &str) -> AuditLogEntryBuilder {
        AuditLogEntry::builder(action, resource)
            .user(self.user_id)
            .client(self.ip_address.clone(), self.user_agent.clone())
    }
}

/// Records `entry` as failed with `err`, then hands the error back.
pub(crate) async fn audit_failure(
    audit: &AuditRecorder,
    entry: AuditLogEntryBuilder,
    err: AccessError,
) -> AccessError {
    audit.record(entry.failed(err.to_string()).build()).await;
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_entry_carries_actor() {
        let id = UserId::new();
        let entry = ActorContext::user(id)
            .with_client(Some("10.0.0.1".into()), Some("curl/8".into()))
            .audit("delete_user", "users")
            .build();
        assert_eq!(entry.user_id, Some(id));
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn test_system_actor_has_no_user() {
        assert!(ActorContext::system().audit("seed", "permissions").build().user_id.is_none());
    }
}
