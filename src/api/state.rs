//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::fanout::BridgeMetrics;
use crate::hub::Hub;
use crate::metrics::RoomcastMetrics;
use crate::persist::{LogSink, MessageSink};
use crate::presence::Presence;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the room hub
    pub hub: Hub,
    /// Server configuration
    pub server: Arc<ServerConfig>,
    /// Where chat messages are persisted
    pub sink: Arc<dyn MessageSink>,
    /// Cross-instance presence view (optional)
    pub presence: Option<Arc<dyn Presence>>,
    /// Fanout bridge counters, when the bridge is running
    pub bridge: Option<Arc<BridgeMetrics>>,
    /// Prometheus registry served at `/metrics` (optional)
    pub metrics: Option<Arc<RoomcastMetrics>>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state for a single instance with log-only persistence
    pub fn new(hub: Hub, server: ServerConfig) -> Self {
        Self {
            hub,
            server: Arc::new(server),
            sink: Arc::new(LogSink),
            presence: None,
            bridge: None,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_presence(mut self, presence: Arc<dyn Presence>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn with_bridge(mut self, metrics: Arc<BridgeMetrics>) -> Self {
        self.bridge = Some(metrics);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RoomcastMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
