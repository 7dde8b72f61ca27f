//! Prometheus Metrics
//!
//! Registered metrics:
//! - `roomcast_messages_broadcast_total{room}` - Counter: broadcasts processed per room
//! - `roomcast_remote_broadcasts_total` - Counter: broadcasts received from other instances
//! - `roomcast_deliveries_total` - Counter: payloads enqueued for clients
//! - `roomcast_evictions_total` - Counter: clients evicted for a full queue
//! - `roomcast_ws_connections` - Gauge: open WebSocket connections
//! - `roomcast_rooms_active` - Gauge: rooms with at least one local member
//! - `roomcast_fanout_enqueued_total` - Counter: broadcasts handed to the bridge
//! - `roomcast_fanout_rejected_total` - Counter: broadcasts the bridge refused
//! - `roomcast_bridge_connected` - Gauge: 1 while the subscriber is connected
//! - `roomcast_bridge_events{event}` - Gauge: bridge counters, read at scrape time
//! - `roomcast_http_requests_total{method,path,status}` - Counter: HTTP requests
//! - `roomcast_http_request_duration_seconds{method,path}` - Histogram: HTTP latency

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use thiserror::Error;

use crate::fanout::BridgeStatus;

/// Content type of the text exposition format
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// All Roomcast metrics, registered in one registry
#[derive(Clone)]
pub struct RoomcastMetrics {
    registry: Registry,

    // Hub
    pub messages_broadcast_total: IntCounterVec,
    pub remote_broadcasts_total: IntCounter,
    pub deliveries_total: IntCounter,
    pub evictions_total: IntCounter,
    pub rooms_active: IntGauge,
    pub fanout_enqueued_total: IntCounter,
    pub fanout_rejected_total: IntCounter,

    // Connections
    pub ws_connections: IntGauge,

    // Bridge
    pub bridge_connected: IntGauge,
    pub bridge_events: IntGaugeVec,

    // HTTP
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl RoomcastMetrics {
    /// Create every metric and register it in a fresh registry
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let messages_broadcast_total = IntCounterVec::new(
            Opts::new(
                "roomcast_messages_broadcast_total",
                "Broadcasts processed by the hub, per room",
            ),
            &["room"],
        )?;
        registry.register(Box::new(messages_broadcast_total.clone()))?;

        let remote_broadcasts_total = IntCounter::with_opts(Opts::new(
            "roomcast_remote_broadcasts_total",
            "Broadcasts received from other instances",
        ))?;
        registry.register(Box::new(remote_broadcasts_total.clone()))?;

        let deliveries_total = IntCounter::with_opts(Opts::new(
            "roomcast_deliveries_total",
            "Payloads enqueued on client outbound queues",
        ))?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let evictions_total = IntCounter::with_opts(Opts::new(
            "roomcast_evictions_total",
            "Clients evicted because their outbound queue was full",
        ))?;
        registry.register(Box::new(evictions_total.clone()))?;

        let rooms_active = IntGauge::with_opts(Opts::new(
            "roomcast_rooms_active",
            "Rooms with at least one local member",
        ))?;
        registry.register(Box::new(rooms_active.clone()))?;

        let fanout_enqueued_total = IntCounter::with_opts(Opts::new(
            "roomcast_fanout_enqueued_total",
            "Local broadcasts accepted by the fanout bridge",
        ))?;
        registry.register(Box::new(fanout_enqueued_total.clone()))?;

        let fanout_rejected_total = IntCounter::with_opts(Opts::new(
            "roomcast_fanout_rejected_total",
            "Local broadcasts the fanout bridge could not accept",
        ))?;
        registry.register(Box::new(fanout_rejected_total.clone()))?;

        let ws_connections = IntGauge::with_opts(Opts::new(
            "roomcast_ws_connections",
            "Open WebSocket connections",
        ))?;
        registry.register(Box::new(ws_connections.clone()))?;

        let bridge_connected = IntGauge::with_opts(Opts::new(
            "roomcast_bridge_connected",
            "1 while the fanout subscriber is connected",
        ))?;
        registry.register(Box::new(bridge_connected.clone()))?;

        let bridge_events = IntGaugeVec::new(
            Opts::new(
                "roomcast_bridge_events",
                "Fanout bridge counters since start",
            ),
            &["event"],
        )?;
        registry.register(Box::new(bridge_events.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("roomcast_http_requests_total", "HTTP requests served"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "roomcast_http_request_duration_seconds",
                "HTTP response time in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            messages_broadcast_total,
            remote_broadcasts_total,
            deliveries_total,
            evictions_total,
            rooms_active,
            fanout_enqueued_total,
            fanout_rejected_total,
            ws_connections,
            bridge_connected,
            bridge_events,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Copy the bridge's own counters into the registry
    pub fn observe_bridge(&self, status: &BridgeStatus) {
        self.bridge_connected.set(i64::from(status.connected));

        let events = [
            ("published", status.published),
            ("publish_errors", status.publish_errors),
            ("dropped", status.dropped),
            ("received", status.received),
            ("relayed", status.relayed),
            ("skipped_own", status.skipped_own),
            ("malformed", status.malformed),
            ("reconnects", status.reconnects),
        ];
        for (event, value) in events {
            self.bridge_events
                .with_label_values(&[event])
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        }
    }

    /// Export every metric in the Prometheus text format
    pub fn export(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Errors creating or exporting metrics
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Exported metrics are not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
