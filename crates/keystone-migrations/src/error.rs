//! Migration error types.

/// Migration error type.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying or reverting a migration failed.
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An applied migration no longer matches its embedded file.
    #[error("Migration {version} was modified after being applied")]
    ChecksumMismatch {
        /// Migration version.
        version: i64,
    },
}

/// Result type for migrations.
pub type Result<T> = std::result::Result<T, MigrationError>;
