//! Room Registry
//!
//! The authoritative room -> members map. It is plain synchronous data: the
//! hub's event loop owns the only instance and is the only code that touches
//! it, so there is no locking here.
//!
//! Invariants:
//! - a room key exists iff its member set is non-empty
//! - a client is in at most one room, and `index` always names that room

use bytes::Bytes;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::client::{ClientHandle, ClientId, DeliveryFailure};

/// A client leaving a room, for presence accounting and logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub client: ClientId,
    pub room: String,
    /// The room became empty and was removed
    pub room_closed: bool,
}

/// Result of adding a client to a room
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinOutcome {
    /// The room did not exist before this join
    pub created: bool,
    /// The client was not already a member of this room
    pub added: bool,
    /// The client was moved out of another room first
    pub moved_from: Option<Departure>,
}

/// Result of delivering one payload to a room
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    /// Members whose queue accepted the payload
    pub delivered: usize,
    /// Members evicted because their queue was full
    pub evicted: Vec<ClientId>,
    /// Members dropped because their connection was already gone
    pub disconnected: Vec<ClientId>,
    /// The room became empty as a result and was removed
    pub room_closed: bool,
}

impl DeliveryReport {
    /// Number of members removed from the room by this delivery
    pub fn removed(&self) -> usize {
        self.evicted.len() + self.disconnected.len()
    }
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    /// Room name -> member count
    pub rooms: BTreeMap<String, usize>,
    /// Total registered clients
    pub clients: usize,
}

impl RegistrySnapshot {
    pub fn members(&self, room: &str) -> Option<usize> {
        self.rooms.get(room).copied()
    }
}

/// Room membership state
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, HashMap<ClientId, ClientHandle>>,
    index: HashMap<ClientId, String>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client to a room, moving it out of any other room first
    pub fn join(&mut self, room: &str, client: ClientHandle) -> JoinOutcome {
        let id = client.id();

        let elsewhere = self.index.get(&id).is_some_and(|current| current != room);
        let moved_from = if elsewhere {
            self.detach(id).map(|(_, departure)| departure)
        } else {
            None
        };

        let created = !self.rooms.contains_key(room);
        let previous = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(id, client);
        self.index.insert(id, room.to_string());

        JoinOutcome {
            created,
            added: previous.is_none(),
            moved_from,
        }
    }

    /// Remove a client from `room`; a no-op if it is not a member there
    pub fn leave(&mut self, room: &str, id: ClientId) -> Option<Departure> {
        if self.room_of(id) != Some(room) {
            return None;
        }
        self.detach(id).map(|(_, departure)| departure)
    }

    /// Remove a client from whichever room it is in
    pub fn disconnect(&mut self, id: ClientId) -> Option<Departure> {
        self.detach(id).map(|(_, departure)| departure)
    }

    /// Move a registered client to another room in one step
    ///
    /// Returns `None` if the client is not registered.
    pub fn switch(&mut self, id: ClientId, room: &str) -> Option<JoinOutcome> {
        if self.index.get(&id).map(String::as_str) == Some(room) {
            return Some(JoinOutcome::default());
        }

        let (client, departure) = self.detach(id)?;
        let mut outcome = self.join(room, client);
        outcome.moved_from = Some(departure);
        Some(outcome)
    }

    /// Offer a payload to every member of `room` without blocking
    ///
    /// Members whose queue is full are evicted: their handle is dropped,
    /// which closes the queue and ends their write pump.
    pub fn deliver(&mut self, room: &str, payload: &Bytes) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let Some(members) = self.rooms.get_mut(room) else {
            return report;
        };

        for (id, client) in members.iter() {
            match client.try_deliver(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryFailure::Full) => report.evicted.push(*id),
                Err(DeliveryFailure::Closed) => report.disconnected.push(*id),
            }
        }

        for id in report.evicted.iter().chain(report.disconnected.iter()) {
            members.remove(id);
            self.index.remove(id);
        }

        if members.is_empty() {
            self.rooms.remove(room);
            report.room_closed = true;
        }

        report
    }

    /// Room the client currently belongs to
    pub fn room_of(&self, id: ClientId) -> Option<&str> {
        self.index.get(&id).map(String::as_str)
    }

    /// Number of members in a room (0 if absent)
    pub fn members(&self, room: &str) -> usize {
        self.rooms.get(room).map(HashMap::len).unwrap_or(0)
    }

    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn client_count(&self) -> usize {
        self.index.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            rooms: self
                .rooms
                .iter()
                .map(|(room, members)| (room.clone(), members.len()))
                .collect(),
            clients: self.index.len(),
        }
    }

    fn detach(&mut self, id: ClientId) -> Option<(ClientHandle, Departure)> {
        let room = self.index.remove(&id)?;
        let members = self.rooms.get_mut(&room)?;
        let client = members.remove(&id)?;

        let room_closed = members.is_empty();
        if room_closed {
            self.rooms.remove(&room);
        }

        Some((
            client,
            Departure {
                client: id,
                room,
                room_closed,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::client::OutboundQueue;

    fn client(capacity: usize) -> (ClientHandle, OutboundQueue) {
        ClientHandle::channel(capacity)
    }

    #[test]
    fn test_join_creates_room() {
        let mut registry = RoomRegistry::new();
        let (c1, _rx1) = client(4);
        let (c2, _rx2) = client(4);

        let first = registry.join("general", c1);
        assert!(first.created);
        assert!(first.added);

        let second = registry.join("general", c2);
        assert!(!second.created);
        assert_eq!(registry.members("general"), 2);
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn test_last_leave_removes_room() {
        let mut registry = RoomRegistry::new();
        let (c1, _rx1) = client(4);
        let id = c1.id();
        registry.join("general", c1);

        let departure = registry.leave("general", id).unwrap();
        assert!(departure.room_closed);
        assert!(!registry.contains_room("general"));
        assert_eq!(registry.client_count(), 0);
    }

    #[test]
    fn test_leave_wrong_room_is_noop() {
        let mut registry = RoomRegistry::new();
        let (c1, _rx1) = client(4);
        let (c2, _rx2) = client(4);
        let id1 = c1.id();
        registry.join("general", c1);
        registry.join("general", c2);

        assert_eq!(registry.leave("random", id1), None);
        assert_eq!(registry.leave("general", ClientId::new()), None);
        assert_eq!(registry.members("general"), 2);
        assert_eq!(registry.room_of(id1), Some("general"));
    }

    #[test]
    fn test_join_other_room_moves_client() {
        let mut registry = RoomRegistry::new();
        let (c1, rx1) = client(4);
        let id = c1.id();
        registry.join("general", c1);

        // Re-registering the same id elsewhere is a move, not a second membership
        let (moved, _rx) = ClientHandle::channel_with_id(id, 4);
        let outcome = registry.join("gaming", moved);

        assert!(outcome.created);
        assert_eq!(
            outcome.moved_from,
            Some(Departure {
                client: id,
                room: "general".to_string(),
                room_closed: true,
            })
        );
        assert!(!registry.contains_room("general"));
        assert_eq!(registry.room_of(id), Some("gaming"));
        assert_eq!(registry.client_count(), 1);
        drop(rx1);
    }

    #[test]
    fn test_switch_keeps_queue() {
        let mut registry = RoomRegistry::new();
        let (c1, mut rx1) = client(4);
        let (c2, _rx2) = client(4);
        let id1 = c1.id();
        registry.join("general", c1);
        registry.join("general", c2);

        let outcome = registry.switch(id1, "music").unwrap();
        assert!(outcome.created);
        let departure = outcome.moved_from.unwrap();
        assert_eq!(departure.room, "general");
        assert!(!departure.room_closed);

        registry.deliver("music", &Bytes::from_static(b"tune"));
        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"tune"));

        registry.deliver("general", &Bytes::from_static(b"chat"));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_switch_unknown_client() {
        let mut registry = RoomRegistry::new();
        assert_eq!(registry.switch(ClientId::new(), "music"), None);
    }

    #[test]
    fn test_deliver_reaches_every_member_once() {
        let mut registry = RoomRegistry::new();
        let mut queues = Vec::new();
        for _ in 0..5 {
            let (c, rx) = client(4);
            registry.join("general", c);
            queues.push(rx);
        }
        let (outsider, mut outsider_rx) = client(4);
        registry.join("random", outsider);

        let report = registry.deliver("general", &Bytes::from_static(b"hi"));
        assert_eq!(report.delivered, 5);
        assert_eq!(report.removed(), 0);

        for rx in queues.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"hi"));
            assert!(rx.try_recv().is_err());
        }
        assert!(outsider_rx.try_recv().is_err());
    }

    #[test]
    fn test_deliver_to_absent_room() {
        let mut registry = RoomRegistry::new();
        let report = registry.deliver("nowhere", &Bytes::from_static(b"hi"));
        assert_eq!(report, DeliveryReport::default());
        assert!(!registry.contains_room("nowhere"));
    }

    #[test]
    fn test_full_queue_is_evicted() {
        let mut registry = RoomRegistry::new();
        let (slow, mut slow_rx) = client(1);
        let (fast, mut fast_rx) = client(4);
        let (gone, mut gone_rx) = client(4);
        let slow_id = slow.id();
        let gone_id = gone.id();

        slow.try_deliver(Bytes::from_static(b"backlog")).unwrap();
        gone_rx.close();
        registry.join("general", slow);
        registry.join("general", fast);
        registry.join("general", gone);

        let report = registry.deliver("general", &Bytes::from_static(b"hi"));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, vec![slow_id]);
        assert_eq!(report.disconnected, vec![gone_id]);
        assert_eq!(registry.members("general"), 1);
        assert_eq!(registry.room_of(slow_id), None);

        assert_eq!(fast_rx.try_recv().unwrap(), Bytes::from_static(b"hi"));

        // Evicted queue drains its backlog and then reports closed
        assert_eq!(slow_rx.try_recv().unwrap(), Bytes::from_static(b"backlog"));
        assert!(matches!(
            slow_rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));

        // No further deliveries reach the evicted client
        registry.deliver("general", &Bytes::from_static(b"more"));
        assert!(slow_rx.try_recv().is_err());
    }

    #[test]
    fn test_evicting_last_member_closes_room() {
        let mut registry = RoomRegistry::new();
        let (slow, _slow_rx) = client(1);
        slow.try_deliver(Bytes::from_static(b"backlog")).unwrap();
        registry.join("general", slow);

        let report = registry.deliver("general", &Bytes::from_static(b"hi"));
        assert!(report.room_closed);
        assert!(!registry.contains_room("general"));
        assert_eq!(registry.client_count(), 0);
    }

    #[test]
    fn test_membership_follows_join_leave_parity() {
        let mut registry = RoomRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(client(4));
        }
        let ids: Vec<ClientId> = handles.iter().map(|(c, _)| c.id()).collect();
        let mut queues = Vec::new();
        for (c, rx) in handles {
            registry.join("general", c);
            queues.push(rx);
        }

        registry.leave("general", ids[0]);
        registry.leave("general", ids[0]);
        registry.leave("general", ids[2]);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.members("general"), Some(1));
        assert_eq!(registry.room_of(ids[1]), Some("general"));

        registry.leave("general", ids[1]);
        assert_eq!(registry.snapshot(), RegistrySnapshot::default());
    }

    #[test]
    fn test_case_sensitive_rooms() {
        let mut registry = RoomRegistry::new();
        let (c1, _rx1) = client(4);
        let (c2, _rx2) = client(4);
        registry.join("General", c1);
        registry.join("general", c2);
        assert_eq!(registry.room_count(), 2);
    }
}
