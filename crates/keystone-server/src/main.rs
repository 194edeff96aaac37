//! Keystone server.
//!
//! Serves the permission and audit API, keeps the permission catalog
//! seeded and sweeps the audit log on a fixed interval.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, task::JoinHandle};
use tracing::{info, warn};

use keystone_access::{AccessControl, ActorContext};
use keystone_api::{
    create_router, handlers::health::init_start_time, AppConfig, AppState, TokenManager,
};
use keystone_audit::AuditRecorder;
use keystone_storage::{AuditStore, InMemoryBackend, PermissionStore, UserStore};

use crate::config::ServerConfig;
use crate::telemetry::init_telemetry;

/// Keystone server.
#[derive(Parser)]
#[command(name = "keystone-server")]
#[command(version, about = "Permission resolution and audit trail service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Print a bearer token for an existing user.
    IssueToken {
        /// Email of the user.
        #[arg(long)]
        email: String,
    },
}

/// Store handles shared by the access and audit layers.
struct Stores {
    users: Arc<dyn UserStore>,
    permissions: Arc<dyn PermissionStore>,
    audit: Arc<dyn AuditStore>,
}

impl Stores {
    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore + PermissionStore + AuditStore + 'static,
    {
        Self {
            users: backend.clone(),
            permissions: backend.clone(),
            audit: backend,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = ServerConfig::load().context("Failed to load configuration")?;
    init_telemetry(&config.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let stores = init_storage(&config).await?;
            serve(config, stores).await
        }
        Command::IssueToken { email } => {
            let token = issue_token(&config, &email).await?;
            println!("{token}");
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig, stores: Stores) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Keystone server");
    init_start_time();

    let audit = AuditRecorder::with_config(stores.audit.clone(), config.audit.clone());
    let access = AccessControl::new(
        stores.users.clone(),
        stores.permissions.clone(),
        audit.clone(),
        &config.access,
    );

    bootstrap(&config, &access, &audit).await?;
    let retention = spawn_retention_task(audit.clone());

    let state = AppState::builder()
        .access(access)
        .audit(audit)
        .tokens(Arc::new(TokenManager::new(config.auth.token_config())))
        .config(AppConfig {
            service_name: config.service_name.clone(),
            cors_origins: config.cors_origins.clone(),
        })
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build app state: {e}"))?;

    let app = create_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    retention.abort();
    info!("Server shut down gracefully");
    Ok(())
}

/// Seeds the catalog and provisions the first admin.
async fn bootstrap(
    config: &ServerConfig,
    access: &AccessControl,
    audit: &AuditRecorder,
) -> Result<()> {
    let report = access
        .seed_catalog()
        .await
        .context("Failed to seed permission catalog")?;
    if report.created > 0 || report.updated > 0 {
        audit
            .record(
                ActorContext::system()
                    .audit("seed_permissions", "permissions")
                    .new_values(json!(report))
                    .build(),
            )
            .await;
    }

    match config.bootstrap_admin_email {
        Some(ref email) => {
            access
                .users()
                .ensure_bootstrap_admin(email)
                .await
                .context("Failed to provision bootstrap admin")?;
        }
        None => {
            warn!("No bootstrap_admin_email configured; admin endpoints need an existing admin")
        }
    }

    Ok(())
}

/// Runs the audit retention sweep on the configured interval.
fn spawn_retention_task(audit: AuditRecorder) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(audit.config().cleanup_interval());
        loop {
            ticker.tick().await;
            if let Err(e) = audit.cleanup_expired().await {
                warn!(error = %e, "Audit retention sweep failed");
            }
        }
    })
}

/// Issues a token for a stored user. Needs a database; in-memory storage starts empty.
async fn issue_token(config: &ServerConfig, email: &str) -> Result<String> {
    if config.database.url.is_none() {
        anyhow::bail!("issue-token needs database.url; in-memory storage holds no users");
    }
    let stores = init_storage(config).await?;

    let user = stores
        .users
        .find_user_by_email(&email.trim().to_lowercase())
        .await
        .context("Failed to look up user")?
        .with_context(|| format!("No user with email {email}"))?;

    let token = TokenManager::new(config.auth.token_config())
        .issue(user.id)
        .map_err(|e| anyhow::anyhow!("Failed to issue token: {e}"))?;
    Ok(token)
}

/// Initializes the storage backend.
async fn init_storage(config: &ServerConfig) -> Result<Stores> {
    match config.database.url {
        Some(ref url) => connect_database(config, url).await,
        None => {
            warn!("No database.url configured; using in-memory storage");
            Ok(Stores::from_backend(Arc::new(InMemoryBackend::new())))
        }
    }
}

#[cfg(feature = "postgres")]
async fn connect_database(config: &ServerConfig, url: &str) -> Result<Stores> {
    use keystone_migrations::Migrator;
    use keystone_storage::PostgresBackend;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    let db = &config.database;
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .min_connections(db.min_connections)
        .acquire_timeout(Duration::from_secs(db.connect_timeout_seconds))
        .connect(url)
        .await
        .context("Failed to connect to database")?;
    info!(max_connections = db.max_connections, "Connected to database");

    if db.run_migrations {
        Migrator::new(pool.clone())
            .run()
            .await
            .context("Failed to run migrations")?;
    }

    Ok(Stores::from_backend(Arc::new(PostgresBackend::new(pool))))
}

#[cfg(not(feature = "postgres"))]
async fn connect_database(_config: &ServerConfig, _url: &str) -> Result<Stores> {
    anyhow::bail!("database.url is set but this build lacks the `postgres` feature")
}

/// Shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_token_requires_database() {
        let err = issue_token(&ServerConfig::default(), "root@example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("database.url"));
    }
}
