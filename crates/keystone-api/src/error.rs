//! API error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keystone_access::AccessError;
use keystone_audit::AuditError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::error;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// API error.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bad request (400).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Field validation failed (400).
    #[error("Validation error: {0}")]
    ValidationError(ValidationErrors),

    /// Operation would remove the last admin (400).
    #[error("{0}")]
    LastAdmin(String),

    /// Unauthorized (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (403).
    #[error("Missing required permission(s): {}", missing.join(", "))]
    Forbidden {
        /// Names that would have satisfied the route.
        missing: Vec<String>,
    },

    /// Not found (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). The message is logged, not returned.
    #[error("Internal server error")]
    Internal(String),
}

/// Field validation errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationErrors {
    /// Messages per field.
    pub fields: HashMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Adds a field error.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut errors: Vec<String> = self
            .fields
            .iter()
            .flat_map(|(field, msgs)| msgs.iter().map(move |m| format!("{field}: {m}")))
            .collect();
        errors.sort();
        write!(f, "{}", errors.join(", "))
    }
}

impl ApiError {
    /// Returns the HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::ValidationError(_) | Self::LastAdmin(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::LastAdmin(_) => "LAST_ADMIN",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Field errors, for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<String>>>,
    /// Missing permissions, for 403 responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
    /// Timestamp.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref detail) = self {
            error!(error = %detail, "Request failed with internal error");
        }

        let body = ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            errors: match &self {
                Self::ValidationError(v) => Some(v.fields.clone()),
                _ => None,
            },
            missing: match &self {
                Self::Forbidden { missing } => Some(missing.clone()),
                _ => None,
            },
            timestamp: chrono::Utc::now(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::NotFound { .. } => Self::NotFound(e.to_string()),
            AccessError::Unauthenticated => Self::Unauthorized(e.to_string()),
            AccessError::Forbidden { missing } => Self::Forbidden { missing },
            AccessError::Conflict(msg) => Self::Conflict(msg),
            AccessError::LastAdmin(msg) => Self::LastAdmin(msg),
            AccessError::Validation(msg) => Self::BadRequest(msg),
            AccessError::Storage(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        match e {
            AuditError::InvalidRange(msg) => Self::BadRequest(msg),
            AuditError::Storage(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        let mut errors = ValidationErrors::default();
        for (field, field_errors) in e.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .as_ref()
                    .map_or_else(|| format!("failed {} check", error.code), ToString::to_string);
                errors.add(field.to_string(), message);
            }
        }
        Self::ValidationError(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_storage::StorageError;

    #[test]
    fn test_access_error_mapping() {
        let cases = [
            (AccessError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                AccessError::Forbidden { missing: vec!["read:audit".into()] },
                StatusCode::FORBIDDEN,
            ),
            (AccessError::user_not_found("u"), StatusCode::NOT_FOUND),
            (AccessError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                AccessError::LastAdmin("cannot delete the last admin".into()),
                StatusCode::BAD_REQUEST,
            ),
            (AccessError::Validation("bad name".into()), StatusCode::BAD_REQUEST),
            (
                AccessError::Storage(StorageError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_internal_message_is_not_leaked() {
        let err = ApiError::from(AccessError::Storage(StorageError::Database(
            "relation users does not exist".into(),
        )));
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn test_validation_errors_display() {
        let mut errors = ValidationErrors::default();
        errors.add("name", "is required");
        errors.add("email", "is invalid");
        assert_eq!(errors.to_string(), "email: is invalid, name: is required");
    }
}
