//! Presence Accounting
//!
//! A best-effort record of which rooms have members and roughly how many,
//! kept outside any one hub so other instances can discover active rooms.
//! Nothing in the hub depends on its accuracy; it may drift during
//! partitions or restarts.

mod redis_store;

pub use redis_store::RedisPresence;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::redis_link::LinkError;

/// A membership change reported by the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Joined(String),
    Left(String),
}

impl PresenceChange {
    pub fn room(&self) -> &str {
        match self {
            PresenceChange::Joined(room) | PresenceChange::Left(room) => room,
        }
    }
}

/// Approximate membership of one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomPresence {
    pub room: String,
    pub members: i64,
}

/// Presence store
#[async_trait]
pub trait Presence: Send + Sync {
    /// Record a change; called from the hub's event loop and must not block
    fn record(&self, change: PresenceChange);

    /// Rooms currently recorded as non-empty
    async fn active_rooms(&self) -> Result<Vec<RoomPresence>, PresenceError>;
}

/// Errors reading presence
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("Presence store unavailable: {0}")]
    Link(#[from] LinkError),
}

/// Counter semantics shared by every presence store
///
/// Joined adds the room to the active set and increments its counter. Left
/// decrements, and once the counter drops to zero or below the room is
/// purged from both.
#[derive(Debug, Default)]
pub struct PresenceLedger {
    rooms: BTreeSet<String>,
    members: BTreeMap<String, i64>,
}

impl PresenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a counter value means the room should be forgotten
    pub fn should_purge(count: i64) -> bool {
        count <= 0
    }

    /// Apply a change, returning the room's new counter value
    pub fn apply(&mut self, change: &PresenceChange) -> i64 {
        match change {
            PresenceChange::Joined(room) => {
                self.rooms.insert(room.clone());
                let count = self.members.entry(room.clone()).or_insert(0);
                *count += 1;
                *count
            }
            PresenceChange::Left(room) => {
                let count = self.members.entry(room.clone()).or_insert(0);
                *count -= 1;
                let count = *count;
                if Self::should_purge(count) {
                    self.members.remove(room);
                    self.rooms.remove(room);
                }
                count
            }
        }
    }

    pub fn count(&self, room: &str) -> Option<i64> {
        self.members.get(room).copied()
    }

    pub fn is_active(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    pub fn rooms(&self) -> Vec<RoomPresence> {
        self.rooms
            .iter()
            .map(|room| RoomPresence {
                room: room.clone(),
                members: self.members.get(room).copied().unwrap_or(0),
            })
            .collect()
    }
}

/// Process-local presence, for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct InMemoryPresence {
    ledger: Mutex<PresenceLedger>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, room: &str) -> Option<i64> {
        self.ledger.lock().count(room)
    }
}

#[async_trait]
impl Presence for InMemoryPresence {
    fn record(&self, change: PresenceChange) {
        self.ledger.lock().apply(&change);
    }

    async fn active_rooms(&self) -> Result<Vec<RoomPresence>, PresenceError> {
        Ok(self.ledger.lock().rooms())
    }
}
