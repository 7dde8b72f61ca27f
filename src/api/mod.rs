//! Roomcast HTTP API
//!
//! HTTP and WebSocket surface, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /ws?room=<name>` - Chat connection
//!
//! ## Rooms
//! - `GET /api/v1/rooms` - Local rooms and cross-instance presence
//! - `GET /api/v1/rooms/:room` - Member count of one local room
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## Metrics
//! - `GET /metrics` - Prometheus text format
//!
//! # Example
//!
//! ```rust,ignore
//! use roomcast::api::{serve, AppState};
//! use roomcast::config::ServerConfig;
//! use roomcast::hub::{Hub, HubConfig, HubServices, InstanceId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), HubServices::default());
//!     let config = ServerConfig::default();
//!
//!     let state = AppState::new(hub, config.clone());
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/rooms", get(routes::rooms::list_rooms))
        .route("/rooms/:room", get(routes::rooms::get_room));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .route("/metrics", get(routes::metrics::export))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&shared_state),
            routes::metrics::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server and run until a shutdown signal arrives
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Roomcast listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Roomcast shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{ClientHandle, Hub, HubConfig, HubServices, InstanceId};
    use crate::metrics::RoomcastMetrics;
    use crate::presence::{InMemoryPresence, Presence, PresenceChange};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_state() -> AppState {
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), HubServices::default());
        AppState::new(hub, ServerConfig::default())
    }

    async fn send_get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = build_router(create_test_state());
        let response = send_get(app, "/health/live").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let app = build_router(create_test_state());
        let response = send_get(app, "/health/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_fails_without_hub() {
        let (hub, task) = Hub::spawn(InstanceId::new(), HubConfig::default(), HubServices::default());
        task.abort();
        let _ = task.await;

        let app = build_router(AppState::new(hub, ServerConfig::default()));
        let response = send_get(app, "/health/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_full() {
        let state = create_test_state();
        let instance = state.hub.instance_id().to_string();
        let app = build_router(state);

        let response = send_get(app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["instance_id"], instance.as_str());
        assert_eq!(body["stats"]["clients"], 0);
        assert!(body.get("bridge").is_none());
    }

    #[tokio::test]
    async fn test_health_degraded_when_bridge_down() {
        let metrics = Arc::new(crate::fanout::BridgeMetrics::default());
        let app = build_router(create_test_state().with_bridge(metrics));

        let body = json_body(send_get(app, "/health").await).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["bridge"]["connected"], false);
    }

    #[tokio::test]
    async fn test_list_rooms_empty() {
        let app = build_router(create_test_state());
        let response = send_get(app, "/api/v1/rooms").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["rooms"], serde_json::json!([]));
        assert_eq!(body["clients"], 0);
        assert!(body.get("presence").is_none());
    }

    #[tokio::test]
    async fn test_list_rooms_with_members_and_presence() {
        let presence = Arc::new(InMemoryPresence::new());
        presence.record(PresenceChange::Joined("Elsewhere".to_string()));

        let state = create_test_state().with_presence(presence);
        let (client, _rx) = ClientHandle::channel(8);
        state.hub.join("General", client).await.unwrap();

        let app = build_router(state);
        let body = json_body(send_get(app, "/api/v1/rooms").await).await;
        assert_eq!(body["rooms"][0]["name"], "General");
        assert_eq!(body["rooms"][0]["members"], 1);
        assert_eq!(body["clients"], 1);
        assert_eq!(body["presence"][0]["room"], "Elsewhere");
        assert_eq!(body["presence"][0]["members"], 1);
    }

    #[tokio::test]
    async fn test_get_room() {
        let state = create_test_state();
        let (client, _rx) = ClientHandle::channel(8);
        state.hub.join("Music", client).await.unwrap();
        let app = build_router(state);

        let response = send_get(app.clone(), "/api/v1/rooms/Music").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["name"], "Music");
        assert_eq!(body["members"], 1);

        // Room names are case-sensitive
        let response = send_get(app, "/api/v1/rooms/music").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert!(body["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_disabled_by_default() {
        let app = build_router(create_test_state());
        let response = send_get(app, "/metrics").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(RoomcastMetrics::new().unwrap());
        let services = HubServices {
            metrics: Some(metrics.clone()),
            ..HubServices::default()
        };
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), services);
        let (client, _rx) = ClientHandle::channel(8);
        hub.join("General", client).await.unwrap();
        hub.broadcast("General", "hi").await.unwrap();
        hub.snapshot().await.unwrap();

        let bridge = Arc::new(crate::fanout::BridgeMetrics::default());
        let state = AppState::new(hub, ServerConfig::default())
            .with_metrics(metrics)
            .with_bridge(bridge);
        let app = build_router(state);

        // Counted by the time /metrics renders
        let response = send_get(app.clone(), "/health/live").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send_get(app, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            crate::metrics::TEXT_CONTENT_TYPE
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains(r#"roomcast_messages_broadcast_total{room="General"} 1"#));
        assert!(text.contains("roomcast_rooms_active 1"));
        assert!(text.contains("roomcast_bridge_connected 0"));
        assert!(text.contains(
            r#"roomcast_http_requests_total{method="GET",path="/health/live",status="200"} 1"#
        ));
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let app = build_router(create_test_state());
        let response = send_get(app, "/ws?room=General").await;
        assert!(response.status().is_client_error());
    }
}
