//! Health check handlers.

use crate::response::{HealthCheck, HealthResponse, HealthStatus};
use crate::AppState;
use axum::extract::State;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Application start time for uptime calculation.
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initializes the start time.
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Returns the uptime in seconds.
pub fn uptime_seconds() -> u64 {
    START_TIME.get().map_or(0, |t| t.elapsed().as_secs())
}

/// Health check handler.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> HealthResponse {
    HealthResponse::healthy(
        state.config.service_name.clone(),
        env!("CARGO_PKG_VERSION"),
        uptime_seconds(),
    )
}

/// Liveness probe handler.
pub async fn liveness_handler() -> &'static str {
    "OK"
}

/// Readiness probe handler. Fails when the permission store is unreachable.
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> HealthResponse {
    let start = Instant::now();
    let (status, message) = match state.access.permissions().list().await {
        Ok(_) => (HealthStatus::Healthy, None),
        Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
    };

    HealthResponse::healthy(
        state.config.service_name.clone(),
        env!("CARGO_PKG_VERSION"),
        uptime_seconds(),
    )
    .with_check(HealthCheck {
        name: "storage".to_string(),
        status,
        message,
        response_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}
