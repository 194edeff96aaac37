//! Caller self-inspection.

use crate::{middleware::RequestActor, ApiError, ApiResult, AppState};
use axum::{extract::State, Json};
use keystone_access::{AccessError, EffectivePermissions};
use keystone_core::UserId;
use serde::Serialize;
use std::sync::Arc;

/// Effective permissions of the caller.
#[derive(Debug, Serialize)]
pub struct MyPermissionsResponse {
    /// Caller id.
    pub user_id: UserId,
    /// Resolved permissions.
    pub permissions: EffectivePermissions,
}

/// Returns the caller's effective permissions. Requires only authentication.
pub async fn my_permissions(
    State(state): State<Arc<AppState>>,
    actor: RequestActor,
) -> ApiResult<Json<MyPermissionsResponse>> {
    let user_id = actor
        .principal
        .ok_or_else(|| ApiError::from(AccessError::Unauthenticated))?;

    let permissions = match state.access.resolver().resolve(user_id).await {
        Ok(permissions) => permissions,
        Err(AccessError::NotFound { .. }) => return Err(AccessError::Unauthenticated.into()),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(MyPermissionsResponse {
        user_id,
        permissions,
    }))
}
