//! Audit error types.

use keystone_storage::StorageError;
use thiserror::Error;

/// Audit result type.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors surfaced by the audit read and retention paths.
///
/// Recording never produces one of these.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Time range is empty or inverted.
    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuditError {
    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRange(_) => "AUDIT_INVALID_RANGE",
            Self::Storage(e) => e.code(),
        }
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRange(_) => 400,
            Self::Storage(_) => 500,
        }
    }
}
