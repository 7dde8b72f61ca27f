//! # Roomcast
//!
//! Real-time chat room fanout hub: tracks which WebSocket connections are in
//! which room and delivers every message sent to a room to all of its
//! current members, across any number of server instances.
//!
//! ## Features
//!
//! - **Ordered**: one event loop applies joins, leaves and broadcasts in submission order
//! - **Backpressure-aware**: a member that cannot keep up is evicted, never waited on
//! - **Horizontal**: Redis pub/sub carries broadcasts between instances
//! - **Presence**: approximate per-room member counts shared through Redis
//!
//! ## Modules
//!
//! - [`hub`]: Room registry and the hub event loop
//! - [`fanout`]: Cross-instance delivery over Redis pub/sub
//! - [`presence`]: Active room accounting
//! - [`metrics`]: Prometheus metrics
//! - [`websocket`]: Chat connection endpoint
//! - [`api`]: HTTP server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomcast::hub::{ClientHandle, Hub, HubConfig, HubServices, InstanceId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), HubServices::default());
//!
//!     let (client, mut queue) = ClientHandle::channel(256);
//!     hub.join("General", client).await?;
//!     hub.broadcast("General", "hello").await?;
//!
//!     let payload = queue.recv().await;
//!     println!("received {:?}", payload);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod fanout;
pub mod hub;
pub mod metrics;
pub mod persist;
pub mod presence;
mod redis_link;
pub mod websocket;

// Re-export top-level types for convenience
pub use hub::{
    ClientHandle, ClientId, Envelope, Hub, HubConfig, HubError, HubServices, InstanceId, Origin,
    RegistrySnapshot, RoomRegistry, WeakHub,
};

pub use fanout::{BridgeError, BridgeMetrics, Fanout, RedisBridge, RedisFanout};

pub use presence::{InMemoryPresence, Presence, PresenceChange, PresenceError, RedisPresence};

pub use metrics::{MetricsError, RoomcastMetrics};

pub use persist::{LogSink, MessageSink, PersistError};

pub use redis_link::LinkError;

pub use api::{build_router, serve, ApiError, AppState};

pub use websocket::{websocket_handler, ChatMessage};

pub use config::{Config, ConfigError, LoggingConfig, RedisConfig, ServerConfig};
