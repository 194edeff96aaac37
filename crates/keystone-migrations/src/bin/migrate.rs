//! Schema migration CLI for Keystone.
//!
//! ```bash
//! keystone-migrate run
//! keystone-migrate status --format json
//! keystone-migrate revert --count 1 --confirm
//! keystone-migrate validate
//! keystone-migrate check
//! ```

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn, Level};

use keystone_migrations::{MigrationStatus, Migrator};

/// Database migration CLI for Keystone
#[derive(Parser)]
#[command(name = "keystone-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection URL
    #[arg(short, long, env = "DATABASE_URL")]
    database_url: String,

    /// Connection timeout in seconds
    #[arg(long, default_value = "30")]
    connect_timeout: u64,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Run,
    /// Show migration status
    Status,
    /// Revert the most recent migrations
    Revert {
        /// Number of migrations to revert
        #[arg(short, long, default_value = "1")]
        count: usize,
        /// Required confirmation flag
        #[arg(long)]
        confirm: bool,
    },
    /// Fail if an applied migration was modified
    Validate,
    /// Fail if migrations are pending
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(cli.connect_timeout))
        .connect(&cli.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let migrator = Migrator::new(pool);

    let result = match cli.command {
        Commands::Run => run(&migrator, cli.format).await,
        Commands::Status => status(&migrator, cli.format).await,
        Commands::Revert { count, confirm } => revert(&migrator, count, confirm).await,
        Commands::Validate => migrator.validate().await.map_err(Into::into),
        Commands::Check => check(&migrator, cli.format).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(migrator: &Migrator, format: OutputFormat) -> anyhow::Result<()> {
    let pending = migrator.pending_count().await?;
    if pending > 0 {
        migrator.run().await?;
    }

    match format {
        OutputFormat::Text => info!("Applied {} migration(s)", pending),
        OutputFormat::Json => println!("{}", serde_json::json!({ "applied": pending })),
    }
    Ok(())
}

async fn status(migrator: &Migrator, format: OutputFormat) -> anyhow::Result<()> {
    let migrations = migrator.list().await?;
    let current = migrator.current_version().await?;

    match format {
        OutputFormat::Text => {
            println!(
                "Current version: {}",
                current.map_or_else(|| "none".to_string(), |v| v.to_string())
            );
            println!("{:<16} {:<40} {:<10} {}", "VERSION", "DESCRIPTION", "STATUS", "APPLIED AT");
            for m in &migrations {
                let applied_at = m
                    .applied_at
                    .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
                println!("{:<16} {:<40} {:<10} {}", m.version, m.description, m.status, applied_at);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "current_version": current,
                "migrations": migrations.iter().map(|m| serde_json::json!({
                    "version": m.version,
                    "description": m.description,
                    "status": m.status.to_string(),
                    "applied_at": m.applied_at,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

async fn revert(migrator: &Migrator, count: usize, confirm: bool) -> anyhow::Result<()> {
    if !confirm {
        warn!("This will revert {} migration(s). Use --confirm to proceed.", count);
        return Ok(());
    }
    migrator.revert(count).await?;
    info!("Reverted {} migration(s)", count);
    Ok(())
}

async fn check(migrator: &Migrator, format: OutputFormat) -> anyhow::Result<()> {
    let pending = migrator
        .list()
        .await?
        .iter()
        .filter(|m| m.status == MigrationStatus::Pending)
        .count();

    match format {
        OutputFormat::Text if pending == 0 => info!("Database is up to date"),
        OutputFormat::Text => warn!("Database has {} pending migration(s)", pending),
        OutputFormat::Json => println!("{}", serde_json::json!({ "pending": pending })),
    }

    if pending == 0 {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Database has pending migrations"))
    }
}
