//! Permission types.

use crate::{CoreError, CoreResult, PermissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named permission, `action:resource` by convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Permission ID.
    pub id: PermissionId,
    /// Unique name, e.g. `update:users`.
    pub name: String,
    /// Human description.
    pub description: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Creates a permission with a fresh id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PermissionId::new(),
            name: name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Changes applied by a permission update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionChanges {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
}

impl PermissionChanges {
    /// Returns true when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Checks the `action:resource` naming convention.
///
/// Both halves must be non-empty and made of lowercase ASCII letters,
/// digits, `_` or `-`.
///
/// # Errors
/// Returns `CoreError::InvalidPermissionName` if the name does not match.
pub fn validate_permission_name(name: &str) -> CoreResult<()> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    };

    match name.split_once(':') {
        Some((action, resource)) if valid_part(action) && valid_part(resource) => Ok(()),
        _ => Err(CoreError::InvalidPermissionName(name.to_string())),
    }
}
