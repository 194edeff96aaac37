//! API routes.

use crate::{
    handlers::{audit, health, me, permissions, users},
    middleware::{auth_layer, cors_layer, logging_layer},
    state::AppState,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

/// Creates the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints (no auth required)
        .nest("/health", health_routes())
        .nest("/api/v1", api_v1_routes(state.clone()))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config.cors_origins))
        .layer(middleware::from_fn(logging_layer))
        .with_state(state)
}

/// Health routes.
fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health::health_handler))
        .route("/live", get(health::liveness_handler))
        .route("/ready", get(health::readiness_handler))
}

/// API v1 routes.
fn api_v1_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me/permissions", get(me::my_permissions))
        .nest("/permissions", permission_routes())
        .nest("/users", user_routes())
        .nest("/audit", audit_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_layer))
}

/// Permission catalog routes.
fn permission_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(permissions::list_permissions).post(permissions::create_permission),
        )
        .route(
            "/:id",
            get(permissions::get_permission)
                .put(permissions::update_permission)
                .delete(permissions::delete_permission),
        )
}

/// Principal and grant routes.
fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/:id", get(users::get_user).delete(users::delete_user))
        .route("/:id/role", put(users::update_user_role))
        .route("/:id/permissions", get(users::list_user_permissions))
        .route(
            "/:id/permissions/:permission_id",
            post(users::grant_permission).delete(users::revoke_permission),
        )
}

/// Audit routes.
fn audit_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(audit::query_audit_log))
        .route("/stats", get(audit::audit_stats))
        .route("/cleanup", post(audit::cleanup_audit_log))
}
