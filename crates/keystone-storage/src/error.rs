//! Storage error types.

use thiserror::Error;

/// Storage result type.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Row not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violated.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Backend unavailable.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Internal error.
    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "STORAGE_NOT_FOUND",
            Self::AlreadyExists(_) => "STORAGE_ALREADY_EXISTS",
            Self::Serialization(_) => "STORAGE_SERIALIZATION_ERROR",
            Self::Database(_) => "STORAGE_DATABASE_ERROR",
            Self::Backend(_) => "STORAGE_BACKEND_ERROR",
            Self::Internal(_) => "STORAGE_INTERNAL_ERROR",
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::AlreadyExists(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Backend(e.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(StorageError::NotFound("x".into()).code(), "STORAGE_NOT_FOUND");
    }
}
