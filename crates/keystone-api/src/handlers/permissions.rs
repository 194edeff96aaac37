//! Permission catalog handlers.

use crate::{
    middleware::RequestActor,
    response::{Created, NoContent},
    ApiError, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use keystone_core::{Permission, PermissionChanges, PermissionId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// `action:resource` in lowercase ASCII, digits, `_` and `-`.
static PERMISSION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]+:[a-z0-9_-]+$").expect("valid pattern"));

/// Create permission request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePermissionRequest {
    /// Permission name.
    #[validate(
        length(min = 3, max = 100),
        regex(path = "PERMISSION_NAME", message = "must look like action:resource")
    )]
    pub name: String,
    /// Description.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
}

/// Update permission request.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePermissionRequest {
    /// New name.
    #[validate(
        length(min = 3, max = 100),
        regex(path = "PERMISSION_NAME", message = "must look like action:resource")
    )]
    pub name: Option<String>,
    /// New description.
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Lists the catalog. Requires `read:permissions`.
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
) -> ApiResult<Json<Vec<Permission>>> {
    actor.require(&state, "read:permissions").await?;
    Ok(Json(state.access.permissions().list().await?))
}

/// Returns one permission. Requires `read:permissions`.
pub async fn get_permission(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path(id): Path<PermissionId>,
) -> ApiResult<Json<Permission>> {
    actor.require(&state, "read:permissions").await?;
    Ok(Json(state.access.permissions().get(id).await?))
}

/// Creates a permission. Requires `manage:permissions`.
pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Json(request): Json<CreatePermissionRequest>,
) -> ApiResult<Created<Permission>> {
    actor.require(&state, "manage:permissions").await?;
    request.validate()?;

    let permission = state
        .access
        .permissions()
        .create(&actor.context(), &request.name, &request.description)
        .await?;

    let location = format!("/api/v1/permissions/{}", permission.id);
    Ok(Created::new(permission, location))
}

/// Renames or re-describes a permission. Requires `manage:permissions`.
pub async fn update_permission(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path(id): Path<PermissionId>,
    Json(request): Json<UpdatePermissionRequest>,
) -> ApiResult<Json<Permission>> {
    actor.require(&state, "manage:permissions").await?;
    request.validate()?;

    let changes = PermissionChanges {
        name: request.name,
        description: request.description,
    };
    if changes.is_empty() {
        return Err(ApiError::BadRequest("No changes supplied".to_string()));
    }

    Ok(Json(
        state
            .access
            .permissions()
            .update(&actor.context(), id, changes)
            .await?,
    ))
}

/// Deletes a permission and its grants. Requires `manage:permissions`.
pub async fn delete_permission(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path(id): Path<PermissionId>,
) -> ApiResult<NoContent> {
    actor.require(&state, "manage:permissions").await?;
    state
        .access
        .permissions()
        .delete(&actor.context(), id)
        .await?;
    Ok(NoContent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_validation() {
        let ok = CreatePermissionRequest {
            name: "read:widgets".into(),
            description: String::new(),
        };
        assert!(ok.validate().is_ok());

        let bad = CreatePermissionRequest {
            name: "Read Widgets".into(),
            description: String::new(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_update_request_skips_absent_fields() {
        let request = UpdatePermissionRequest {
            name: None,
            description: Some("Read widgets".into()),
        };
        assert!(request.validate().is_ok());
    }
}
