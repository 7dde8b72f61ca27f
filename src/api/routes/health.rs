//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (hub answers within a second)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::hub_snapshot;
use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Kubernetes readiness probe.
/// Returns 200 once the hub's event loop answers a snapshot request.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match hub_snapshot(&state).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /health
///
/// Full health status with component details. The bridge being down only
/// degrades the service: local delivery still works.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let hub_ok = hub_snapshot(&state).await.is_ok();
    let bridge = state.bridge.as_ref().map(|metrics| metrics.status());
    let bridge_ok = bridge.as_ref().map_or(true, |status| status.connected);

    let overall_status = match (hub_ok, bridge_ok) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    };

    Json(HealthResponse {
        status: overall_status.to_string(),
        hub: if hub_ok { "ok" } else { "error" }.to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.hub.instance_id().to_string(),
        stats: state.hub.stats(),
        bridge,
    })
}
