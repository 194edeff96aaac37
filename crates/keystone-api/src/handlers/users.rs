//! Principal and grant handlers.

use crate::{
    middleware::RequestActor,
    pagination::{PagedResponse, Pagination},
    response::{Created, NoContent},
    ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use keystone_core::{NewUser, Permission, PermissionId, Role, User, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Create user request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    /// Email address.
    #[validate(email)]
    pub email: String,
    /// Display name.
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// Role, `user` when omitted.
    #[serde(default)]
    pub role: Role,
}

/// Role change request.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    /// New role.
    pub role: Role,
}

/// Result of a grant or revoke.
#[derive(Debug, Serialize, Deserialize)]
pub struct GrantResponse {
    /// Principal.
    pub user_id: UserId,
    /// Permission.
    pub permission_id: PermissionId,
    /// False when the call was a no-op.
    pub changed: bool,
}

/// Creates a principal. Requires `create:users`.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<Created<User>> {
    actor.require(&state, "create:users").await?;
    request.validate()?;

    let mut new_user = NewUser::new(request.email).with_role(request.role);
    new_user.name = request.name;

    let user = state
        .access
        .users()
        .create_user(&actor.context(), new_user)
        .await?;

    let location = format!("/api/v1/users/{}", user.id);
    Ok(Created::new(user, location))
}

/// Lists principals. Requires `read:users`.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<PagedResponse<User>>> {
    actor.require(&state, "read:users").await?;
    let page = state.access.users().list_users(pagination.to_request()).await?;
    Ok(Json(page.into()))
}

/// Returns one principal. Requires `read:users`.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path(id): Path<UserId>,
) -> ApiResult<Json<User>> {
    actor.require(&state, "read:users").await?;
    Ok(Json(state.access.users().get_user(id).await?))
}

/// Changes a principal's role. Requires `update:users`.
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path(id): Path<UserId>,
    Json(request): Json<UpdateRoleRequest>,
) -> ApiResult<Json<User>> {
    actor.require(&state, "update:users").await?;
    Ok(Json(
        state
            .access
            .users()
            .update_role(&actor.context(), id, request.role)
            .await?,
    ))
}

/// Deletes a principal. Requires `delete:users`.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path(id): Path<UserId>,
) -> ApiResult<NoContent> {
    actor.require(&state, "delete:users").await?;
    state
        .access
        .users()
        .delete_user(&actor.context(), id)
        .await?;
    Ok(NoContent)
}

/// Lists a principal's explicit grants. Requires `read:permissions`.
pub async fn list_user_permissions(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path(id): Path<UserId>,
) -> ApiResult<Json<Vec<Permission>>> {
    actor.require(&state, "read:permissions").await?;
    Ok(Json(state.access.grants().list(id).await?))
}

/// Grants a permission. Requires `assign:permissions`.
pub async fn grant_permission(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path((user_id, permission_id)): Path<(UserId, PermissionId)>,
) -> ApiResult<Json<GrantResponse>> {
    actor.require(&state, "assign:permissions").await?;
    let changed = state
        .access
        .grants()
        .grant(&actor.context(), user_id, permission_id)
        .await?;

    Ok(Json(GrantResponse {
        user_id,
        permission_id,
        changed,
    }))
}

/// Revokes a permission. Requires `assign:permissions`.
pub async fn revoke_permission(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
    Path((user_id, permission_id)): Path<(UserId, PermissionId)>,
) -> ApiResult<Json<GrantResponse>> {
    actor.require(&state, "assign:permissions").await?;
    let changed = state
        .access
        .grants()
        .revoke(&actor.context(), user_id, permission_id)
        .await?;

    Ok(Json(GrantResponse {
        user_id,
        permission_id,
        changed,
    }))
}
