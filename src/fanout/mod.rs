//! Cross-Instance Fanout
//!
//! Makes room broadcasts visible across independently running hub
//! processes through an external pub/sub channel.
//!
//! ## Channels
//!
//! Every room maps to one channel, `<prefix><room>` (default prefix `chat:`).
//! Each instance publishes the broadcasts its own connections submit, and
//! listens on the pattern `<prefix>*`.
//!
//! ## Origin tagging
//!
//! Channel payloads carry the publishing instance's id alongside the opaque
//! message bytes. A subscriber drops messages tagged with its own id (those
//! were already delivered locally), and the hub never republishes a message
//! it received from the bridge. Together these stop both local double
//! delivery and ping-pong between instances.
//!
//! The bridge is optional: when Redis is unreachable, publishing drops
//! messages and local delivery carries on unaffected.

mod redis_bridge;

pub use redis_bridge::{RedisBridge, RedisFanout};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::hub::{Envelope, InstanceId};
use crate::redis_link::LinkError;

/// Default prefix of per-room channels
pub const DEFAULT_CHANNEL_PREFIX: &str = "chat:";

/// Outbound side of the bridge, called from the hub's event loop
///
/// Implementations must return immediately: a stall here stalls every room.
pub trait Fanout: Send + Sync {
    /// Publish a locally-originated broadcast to other instances
    ///
    /// Returns false if the message was dropped instead of queued.
    fn publish(&self, room: &str, payload: &Bytes) -> bool;
}

/// Mapping between room names and pub/sub channel names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNaming {
    prefix: String,
}

impl ChannelNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Channel carrying broadcasts for `room`
    pub fn channel(&self, room: &str) -> String {
        format!("{}{}", self.prefix, room)
    }

    /// Pattern matching every room channel
    pub fn pattern(&self) -> String {
        format!("{}*", self.prefix)
    }

    /// Room name encoded in a channel name
    pub fn room<'a>(&self, channel: &'a str) -> Option<&'a str> {
        channel.strip_prefix(self.prefix.as_str())
    }
}

impl Default for ChannelNaming {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_PREFIX)
    }
}

/// What actually travels over the pub/sub channel
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    origin: InstanceId,
    payload: Vec<u8>,
}

/// Encode a payload published by `origin`
pub fn encode(origin: InstanceId, payload: &[u8]) -> Result<Vec<u8>, BridgeError> {
    let wire = WireEnvelope {
        origin,
        payload: payload.to_vec(),
    };
    Ok(bincode::serialize(&wire)?)
}

/// Decode a channel payload into its origin and message bytes
pub fn decode(data: &[u8]) -> Result<(InstanceId, Bytes), BridgeError> {
    let wire: WireEnvelope = bincode::deserialize(data)?;
    Ok((wire.origin, Bytes::from(wire.payload)))
}

/// Turn a received channel message into an envelope for local delivery
///
/// Returns `Ok(None)` for messages this instance published itself.
pub fn accept_inbound(
    local: InstanceId,
    naming: &ChannelNaming,
    channel: &str,
    data: &[u8],
) -> Result<Option<Envelope>, BridgeError> {
    let room = naming
        .room(channel)
        .ok_or_else(|| BridgeError::UnknownChannel(channel.to_string()))?;

    let (origin, payload) = decode(data)?;
    if origin == local {
        return Ok(None);
    }

    Ok(Some(Envelope::remote(room, payload, origin)))
}

/// Errors in the fanout bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Redis link error: {0}")]
    Link(#[from] LinkError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Channel {0:?} does not match the room prefix")]
    UnknownChannel(String),

    #[error("Subscription stream ended")]
    StreamEnded,
}

impl From<bincode::Error> for BridgeError {
    fn from(err: bincode::Error) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

/// Bridge counters
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    pub published: AtomicU64,
    pub publish_errors: AtomicU64,
    pub dropped: AtomicU64,
    pub received: AtomicU64,
    pub relayed: AtomicU64,
    pub skipped_own: AtomicU64,
    pub malformed: AtomicU64,
    pub reconnects: AtomicU64,
    pub connected: AtomicBool,
}

/// Serializable view of `BridgeMetrics`
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub connected: bool,
    pub published: u64,
    pub publish_errors: u64,
    pub dropped: u64,
    pub received: u64,
    pub relayed: u64,
    pub skipped_own: u64,
    pub malformed: u64,
    pub reconnects: u64,
}

impl BridgeMetrics {
    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connected: self.connected.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            skipped_own: self.skipped_own.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Exponential reconnect backoff with ±20% jitter
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self::with_bounds(Duration::from_millis(100), Duration::from_secs(30))
    }

    pub fn with_bounds(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let jitter = 0.8 + 0.4 * f64::from(nanos % 1000) / 1000.0;

        let max = self.max.as_secs_f64();
        let base = self.current.as_secs_f64();
        self.current = Duration::from_secs_f64((base * 2.0).min(max));
        Duration::from_secs_f64((base * jitter).min(max))
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
