//! Validation errors for core domain values.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while constructing or parsing domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Unknown role name.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Permission name does not follow `action:resource`.
    #[error("invalid permission name '{0}': expected 'action:resource'")]
    InvalidPermissionName(String),

    /// Unknown stats period.
    #[error("unknown period: {0}")]
    UnknownPeriod(String),
}
