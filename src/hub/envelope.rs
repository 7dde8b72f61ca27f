//! Broadcast Envelopes
//!
//! A broadcast is a (room, payload) pair plus a marker saying where it came
//! from. The marker is what keeps the fanout bridge from echoing a message
//! back into the instance that published it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one running hub process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Generate a fresh random instance identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a broadcast entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Submitted by a connection on this instance
    Local,
    /// Received from the fanout bridge, published by another instance
    Remote(InstanceId),
}

/// A message addressed to every member of a room
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Target room (case-sensitive)
    pub room: String,
    /// Opaque payload, never inspected by the hub
    pub payload: Bytes,
    /// Where the message came from
    pub origin: Origin,
}

impl Envelope {
    /// Envelope for a message submitted by a local connection
    pub fn local(room: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            room: room.into(),
            payload: payload.into(),
            origin: Origin::Local,
        }
    }

    /// Envelope for a message relayed from another instance
    pub fn remote(room: impl Into<String>, payload: impl Into<Bytes>, origin: InstanceId) -> Self {
        Self {
            room: room.into(),
            payload: payload.into(),
            origin: Origin::Remote(origin),
        }
    }

    /// Whether this envelope should be republished to other instances
    pub fn is_local(&self) -> bool {
        matches!(self.origin, Origin::Local)
    }
}
