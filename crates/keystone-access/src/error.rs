//! Access control error types.

use keystone_core::CoreError;
use keystone_storage::StorageError;
use thiserror::Error;

/// Access control result type.
pub type AccessResult<T> = Result<T, AccessError>;

/// Access control errors.
#[derive(Error, Debug)]
pub enum AccessError {
    /// Referenced principal or permission does not exist.
    #[error("{resource_type} not found: {id}")]
    NotFound {
        /// Kind of row that was looked up.
        resource_type: &'static str,
        /// Id that failed to resolve.
        id: String,
    },

    /// No resolvable principal.
    #[error("Authentication required")]
    Unauthenticated,

    /// Principal lacks required permissions.
    #[error("Missing required permission(s): {}", missing.join(", "))]
    Forbidden {
        /// Names the principal would need.
        missing: Vec<String>,
    },

    /// Unique name or email already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation would leave no admin.
    #[error("{0}")]
    LastAdmin(String),

    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AccessError {
    /// Creates a not-found error for a user id.
    pub fn user_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: "User",
            id: id.to_string(),
        }
    }

    /// Creates a not-found error for a permission id.
    pub fn permission_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: "Permission",
            id: id.to_string(),
        }
    }

    /// Maps a storage uniqueness violation to `Conflict`.
    pub(crate) fn on_duplicate(e: StorageError, what: impl Into<String>) -> Self {
        match e {
            StorageError::AlreadyExists(_) => Self::Conflict(what.into()),
            other => Self::Storage(other),
        }
    }

    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::LastAdmin(_) => "LAST_ADMIN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Storage(_) => "STORAGE_FAILURE",
        }
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Unauthenticated => 401,
            Self::Forbidden { .. } => 403,
            Self::Conflict(_) => 409,
            Self::LastAdmin(_) | Self::Validation(_) => 400,
            Self::Storage(_) => 500,
        }
    }
}

impl From<CoreError> for AccessError {
    fn from(e: CoreError) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_names_missing_permissions() {
        let err = AccessError::Forbidden {
            missing: vec!["read:audit".into(), "manage:audit".into()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required permission(s): read:audit, manage:audit"
        );
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AccessError::Unauthenticated.http_status(), 401);
        assert_eq!(AccessError::user_not_found("u").http_status(), 404);
        assert_eq!(AccessError::Conflict("x".into()).http_status(), 409);
        assert_eq!(AccessError::LastAdmin("x".into()).code(), "LAST_ADMIN");
        assert_eq!(
            AccessError::from(StorageError::Backend("down".into())).http_status(),
            500
        );
    }

    #[test]
    fn test_duplicate_maps_to_conflict() {
        let err = AccessError::on_duplicate(
            StorageError::AlreadyExists("users_email_key".into()),
            "email taken",
        );
        assert!(matches!(err, AccessError::Conflict(_)));
    }
}
