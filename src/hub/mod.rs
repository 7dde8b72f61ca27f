//! Room Hub
//!
//! Tracks which connections belong to which room and delivers each
//! broadcast to every current member of its room.
//!
//! ## Architecture
//!
//! - **Hub**: cloneable handle; every request goes through one bounded channel
//! - **RoomRegistry**: the room -> members map, owned by the hub's event loop
//! - **ClientHandle**: the hub's side of one connection's outbound queue
//! - **Envelope**: a broadcast plus the instance it originated from
//!
//! ## Backpressure
//!
//! Outbound queues are bounded. A member whose queue is full when a
//! broadcast arrives is evicted from its room and its queue is closed, which
//! ends that connection's writer. Everyone else still receives the message.

mod actor;
mod client;
mod envelope;
mod registry;

pub use actor::{Hub, HubConfig, HubError, HubServices, HubStats, HubStatsSnapshot, WeakHub};
pub use client::{ClientHandle, ClientId, DeliveryFailure, OutboundQueue, DEFAULT_OUTBOUND_CAPACITY};
pub use envelope::{Envelope, InstanceId, Origin};
pub use registry::{Departure, DeliveryReport, JoinOutcome, RegistrySnapshot, RoomRegistry};
