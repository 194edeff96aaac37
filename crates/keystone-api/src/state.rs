//! Application state.

use crate::token::TokenManager;
use keystone_access::AccessControl;
use keystone_audit::AuditRecorder;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Access layer.
    pub access: AccessControl,
    /// Audit recorder.
    pub audit: AuditRecorder,
    /// Bearer token verifier.
    pub tokens: Arc<TokenManager>,
    /// Application configuration.
    pub config: AppConfig,
}

/// HTTP-level configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name reported by health checks.
    pub service_name: String,
    /// Allowed CORS origins. `*` allows any.
    pub cors_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "keystone".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl AppState {
    /// Creates a new application state builder.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }
}

/// Builder for AppState.
#[derive(Default)]
pub struct AppStateBuilder {
    access: Option<AccessControl>,
    audit: Option<AuditRecorder>,
    tokens: Option<Arc<TokenManager>>,
    config: AppConfig,
}

impl AppStateBuilder {
    /// Sets the access layer.
    #[must_use]
    pub fn access(mut self, access: AccessControl) -> Self {
        self.access = Some(access);
        self
    }

    /// Sets the audit recorder.
    #[must_use]
    pub fn audit(mut self, audit: AuditRecorder) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Sets the token manager.
    #[must_use]
    pub fn tokens(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the AppState.
    pub fn build(self) -> Result<AppState, &'static str> {
        Ok(AppState {
            access: self.access.ok_or("access is required")?,
            audit: self.audit.ok_or("audit is required")?,
            tokens: self.tokens.ok_or("tokens is required")?,
            config: self.config,
        })
    }
}
