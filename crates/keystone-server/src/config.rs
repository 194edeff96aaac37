//! Server configuration.

use anyhow::Result;
use config::{Config, Environment, File};
use keystone_access::AccessConfig;
use keystone_api::TokenConfig;
use keystone_audit::AuditConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Service name.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Debug mode.
    #[serde(default)]
    pub debug: bool,

    /// CORS allowed origins.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Email of the admin provisioned when no admin exists.
    #[serde(default)]
    pub bootstrap_admin_email: Option<String>,

    /// Bearer token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Resolver cache settings.
    #[serde(default)]
    pub access: AccessConfig,

    /// Audit retention settings.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Bearer token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 signing secret.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Token issuer.
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    /// Token audience. Not checked when unset.
    #[serde(default)]
    pub jwt_audience: Option<String>,

    /// Lifetime of issued tokens in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_issuer: default_jwt_issuer(),
            jwt_audience: None,
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl AuthConfig {
    /// Builds the token verifier settings.
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.jwt_secret.clone(),
            issuer: self.jwt_issuer.clone(),
            audience: self.jwt_audience.clone(),
            token_ttl_secs: self.token_ttl_secs,
        }
    }
}

/// Database configuration. Without a URL the server runs on in-memory stores.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL.
    pub url: Option<String>,

    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Apply pending migrations at startup.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_seconds: default_connect_timeout(),
            run_migrations: true,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Log level, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (json, pretty).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_service_name() -> String {
    "keystone".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.to_string()
}

fn default_jwt_issuer() -> String {
    "keystone".to_string()
}

fn default_token_ttl() -> i64 {
    3600
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl ServerConfig {
    /// Loads configuration from files and `KEYSTONE__*` environment variables.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("KEYSTONE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<()> {
        if !self.debug && self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!("Using default JWT secret in non-debug mode!");
        }

        if self.port == 0 {
            anyhow::bail!("Invalid port: 0");
        }
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret must not be empty");
        }
        if self.audit.retention_days == 0 {
            anyhow::bail!("audit.retention_days must be at least 1");
        }
        if self.audit.cleanup_interval_hours == 0 {
            anyhow::bail!("audit.cleanup_interval_hours must be at least 1");
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            host: default_host(),
            port: default_port(),
            debug: false,
            cors_origins: default_cors_origins(),
            bootstrap_admin_email: None,
            auth: AuthConfig::default(),
            access: AccessConfig::default(),
            audit: AuditConfig::default(),
            database: DatabaseConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert!(!config.debug);
        assert_eq!(config.access.cache_ttl_secs, 1800);
        assert_eq!(config.audit.retention_days, 90);
        assert_eq!(config.audit.cleanup_interval_hours, 24);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.port = 0;
        assert!(config.validate().is_err());

        config.port = 8080;
        config.audit.retention_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sections_deserialize_with_defaults() {
        let config: ServerConfig = serde_json::from_value(serde_json::json!({
            "port": 9000,
            "audit": { "retention_days": 30 },
            "auth": { "jwt_secret": "s3cret" }
        }))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.audit.retention_days, 30);
        assert_eq!(config.audit.cleanup_interval_hours, 24);
        assert_eq!(config.auth.token_config().secret, "s3cret");
        assert_eq!(config.auth.jwt_issuer, "keystone");
    }
}
