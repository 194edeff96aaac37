//! Migration runner.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::error::{MigrationError, Result};

/// Migration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Not yet applied.
    Pending,
    /// Applied and unchanged.
    Applied,
    /// Applied, but the embedded file has changed since.
    Modified,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Applied => write!(f, "applied"),
            Self::Modified => write!(f, "modified"),
        }
    }
}

/// Status of a single embedded migration.
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    /// Version prefix of the file.
    pub version: i64,
    /// Description derived from the file name.
    pub description: String,
    /// Current status.
    pub status: MigrationStatus,
    /// When it was applied.
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct AppliedRow {
    version: i64,
    installed_on: DateTime<Utc>,
    checksum: Vec<u8>,
}

/// Applies and inspects the embedded schema migrations.
pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    /// Creates a new migrator.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies all pending migrations.
    pub async fn run(&self) -> Result<()> {
        info!("Running database migrations");
        crate::migrations().run(&self.pool).await.map_err(|e| {
            error!(error = %e, "Migration failed");
            MigrationError::from(e)
        })?;
        info!("Migrations completed");
        Ok(())
    }

    /// Reverts the `count` most recently applied migrations.
    pub async fn revert(&self, count: usize) -> Result<()> {
        let mut applied: Vec<i64> = self.applied().await?.iter().map(|r| r.version).collect();
        applied.sort_unstable();

        let keep = applied.len().saturating_sub(count);
        let target = if keep == 0 { 0 } else { applied[keep - 1] };

        info!(target_version = target, count, "Reverting migrations");
        crate::migrations().undo(&self.pool, target).await?;
        Ok(())
    }

    /// Lists every embedded migration with its status, ordered by version.
    pub async fn list(&self) -> Result<Vec<MigrationInfo>> {
        let applied = self.applied().await?;

        let mut result: Vec<MigrationInfo> = crate::migrations()
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| {
                let row = applied.iter().find(|a| a.version == m.version);
                let status = match row {
                    Some(a) if a.checksum.as_slice() == &*m.checksum => MigrationStatus::Applied,
                    Some(_) => MigrationStatus::Modified,
                    None => MigrationStatus::Pending,
                };
                MigrationInfo {
                    version: m.version,
                    description: m.description.to_string(),
                    status,
                    applied_at: row.map(|a| a.installed_on),
                }
            })
            .collect();

        result.sort_by_key(|m| m.version);
        Ok(result)
    }

    /// Returns the highest applied version.
    pub async fn current_version(&self) -> Result<Option<i64>> {
        Ok(self.applied().await?.into_iter().map(|r| r.version).max())
    }

    /// Returns the number of pending migrations.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self
            .list()
            .await?
            .iter()
            .filter(|m| m.status == MigrationStatus::Pending)
            .count())
    }

    /// Fails if any applied migration was modified afterwards.
    pub async fn validate(&self) -> Result<()> {
        if let Some(m) = self
            .list()
            .await?
            .into_iter()
            .find(|m| m.status == MigrationStatus::Modified)
        {
            warn!(version = m.version, "Modified migration detected");
            return Err(MigrationError::ChecksumMismatch { version: m.version });
        }
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<AppliedRow>> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_name = '_sqlx_migrations')",
        )
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, AppliedRow>(
            "SELECT version, installed_on, checksum FROM _sqlx_migrations \
             WHERE success = true ORDER BY version",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
