//! Prometheus endpoint and request accounting

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::metrics::TEXT_CONTENT_TYPE;

/// Prometheus text export
///
/// GET /metrics
pub async fn export(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let metrics = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("metrics are disabled".to_string()))?;

    if let Some(bridge) = &state.bridge {
        metrics.observe_bridge(&bridge.status());
    }

    match metrics.export() {
        Ok(text) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
            text,
        )
            .into_response()),
        Err(e) => {
            tracing::error!(error = %e, "Metrics export failed");
            Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// Count every request and time its response
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(metrics) = state.metrics.clone() else {
        return next.run(request).await;
    };

    // Route templates keep the label set bounded
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let started = Instant::now();
    let response = next.run(request).await;

    metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();
    metrics
        .http_request_duration_seconds
        .with_label_values(&[method.as_str(), path.as_str()])
        .observe(started.elapsed().as_secs_f64());

    response
}
