//! Hub Event Loop
//!
//! The hub is an actor: a single task owns the `RoomRegistry` and processes
//! one command at a time from one channel. Every join, leave and broadcast
//! is therefore totally ordered in submission order, and the registry needs
//! no lock.
//!
//! Nothing in the loop awaits. Client delivery is `try_send`, and the
//! fanout bridge and presence store only ever enqueue, so one slow consumer
//! or an unreachable Redis cannot stall other rooms.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::client::{ClientHandle, ClientId, OutboundQueue, DEFAULT_OUTBOUND_CAPACITY};
use super::envelope::{Envelope, InstanceId};
use super::registry::{Departure, RegistrySnapshot, RoomRegistry};
use crate::fanout::Fanout;
use crate::metrics::RoomcastMetrics;
use crate::presence::{Presence, PresenceChange};

/// Configuration for the hub
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Capacity of the command channel
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    /// Bound of each client's outbound queue
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

fn default_command_capacity() -> usize {
    4096
}

fn default_outbound_capacity() -> usize {
    DEFAULT_OUTBOUND_CAPACITY
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: default_command_capacity(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

/// Optional collaborators of the hub
#[derive(Clone, Default)]
pub struct HubServices {
    /// Cross-instance publisher
    pub fanout: Option<Arc<dyn Fanout>>,
    /// Presence store
    pub presence: Option<Arc<dyn Presence>>,
    /// Prometheus metrics
    pub metrics: Option<Arc<RoomcastMetrics>>,
}

/// Requests processed by the event loop
enum HubCommand {
    Join { room: String, client: ClientHandle },
    Leave { room: String, client: ClientId },
    Switch { client: ClientId, room: String },
    Disconnect { client: ClientId },
    Broadcast(Envelope),
    Snapshot(oneshot::Sender<RegistrySnapshot>),
}

/// Hub counters, readable without going through the event loop
#[derive(Debug, Default)]
pub struct HubStats {
    broadcasts: AtomicU64,
    remote_broadcasts: AtomicU64,
    deliveries: AtomicU64,
    evictions: AtomicU64,
    published: AtomicU64,
    unpublished: AtomicU64,
    rooms: AtomicU64,
    clients: AtomicU64,
}

/// Serializable view of `HubStats`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HubStatsSnapshot {
    pub broadcasts: u64,
    pub remote_broadcasts: u64,
    pub deliveries: u64,
    pub evictions: u64,
    pub published: u64,
    /// Local broadcasts the fanout refused, so peers never saw them
    pub unpublished: u64,
    pub rooms: u64,
    pub clients: u64,
}

impl HubStats {
    pub fn snapshot(&self) -> HubStatsSnapshot {
        HubStatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            remote_broadcasts: self.remote_broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            unpublished: self.unpublished.load(Ordering::Relaxed),
            rooms: self.rooms.load(Ordering::Relaxed),
            clients: self.clients.load(Ordering::Relaxed),
        }
    }
}

/// Handle for submitting requests to the hub
///
/// Cheap to clone. The event loop stops once every handle is dropped.
#[derive(Clone)]
pub struct Hub {
    tx: mpsc::Sender<HubCommand>,
    instance: InstanceId,
    config: Arc<HubConfig>,
    stats: Arc<HubStats>,
}

impl Hub {
    /// Start the event loop and return a handle to it
    pub fn spawn(
        instance: InstanceId,
        config: HubConfig,
        services: HubServices,
    ) -> (Hub, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
        let stats = Arc::new(HubStats::default());

        let event_loop = EventLoop {
            registry: RoomRegistry::new(),
            services,
            stats: Arc::clone(&stats),
            instance,
        };
        let task = tokio::spawn(event_loop.run(rx));

        let hub = Hub {
            tx,
            instance,
            config: Arc::new(config),
            stats,
        };
        (hub, task)
    }

    /// Identity of this hub process, used to tag fanout messages
    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Create a client handle sized by this hub's configuration
    pub fn new_client(&self) -> (ClientHandle, OutboundQueue) {
        ClientHandle::channel(self.config.outbound_capacity)
    }

    /// Add `client` to `room`, creating the room if needed
    ///
    /// A client already in another room is moved out of it first.
    pub async fn join(&self, room: impl Into<String>, client: ClientHandle) -> Result<(), HubError> {
        self.submit(HubCommand::Join {
            room: room.into(),
            client,
        })
        .await
    }

    /// Remove `client` from `room`; a no-op if it is not a member there
    pub async fn leave(&self, room: impl Into<String>, client: ClientId) -> Result<(), HubError> {
        self.submit(HubCommand::Leave {
            room: room.into(),
            client,
        })
        .await
    }

    /// Move a registered client to another room
    pub async fn switch_room(
        &self,
        client: ClientId,
        room: impl Into<String>,
    ) -> Result<(), HubError> {
        self.submit(HubCommand::Switch {
            client,
            room: room.into(),
        })
        .await
    }

    /// Remove `client` from whatever room it is in
    pub async fn disconnect(&self, client: ClientId) -> Result<(), HubError> {
        self.submit(HubCommand::Disconnect { client }).await
    }

    /// Deliver a locally-submitted payload to `room` and share it with other instances
    pub async fn broadcast(
        &self,
        room: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Result<(), HubError> {
        self.submit(HubCommand::Broadcast(Envelope::local(room, payload)))
            .await
    }

    /// Deliver an envelope received from another instance to local members only
    pub async fn deliver_remote(&self, envelope: Envelope) -> Result<(), HubError> {
        self.submit(HubCommand::Broadcast(envelope)).await
    }

    /// Registry state after every previously submitted request
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::Snapshot(reply)).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Current counters
    pub fn stats(&self) -> HubStatsSnapshot {
        self.stats.snapshot()
    }

    /// A handle that does not keep the event loop running
    pub fn downgrade(&self) -> WeakHub {
        WeakHub {
            tx: self.tx.downgrade(),
            instance: self.instance,
            config: Arc::clone(&self.config),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Resolves once the event loop has stopped
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    async fn submit(&self, command: HubCommand) -> Result<(), HubError> {
        self.tx.send(command).await.map_err(|_| HubError::Closed)
    }
}

/// Non-owning handle to a hub
///
/// Background tasks that feed the hub hold one of these, so the event loop
/// still stops once every `Hub` is dropped.
#[derive(Clone)]
pub struct WeakHub {
    tx: mpsc::WeakSender<HubCommand>,
    instance: InstanceId,
    config: Arc<HubConfig>,
    stats: Arc<HubStats>,
}

impl WeakHub {
    /// A full handle, or `None` once the event loop has stopped
    pub fn upgrade(&self) -> Option<Hub> {
        let tx = self.tx.upgrade()?;
        Some(Hub {
            tx,
            instance: self.instance,
            config: Arc::clone(&self.config),
            stats: Arc::clone(&self.stats),
        })
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }
}

struct EventLoop {
    registry: RoomRegistry,
    services: HubServices,
    stats: Arc<HubStats>,
    instance: InstanceId,
}

impl EventLoop {
    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        tracing::info!(instance = %self.instance, "Hub event loop started");

        while let Some(command) = rx.recv().await {
            self.handle(command);
            self.stats
                .rooms
                .store(self.registry.room_count() as u64, Ordering::Relaxed);
            self.stats
                .clients
                .store(self.registry.client_count() as u64, Ordering::Relaxed);
            if let Some(metrics) = &self.services.metrics {
                metrics.rooms_active.set(self.registry.room_count() as i64);
            }
        }

        tracing::info!(instance = %self.instance, "Hub event loop stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Join { room, client } => {
                let id = client.id();
                let outcome = self.registry.join(&room, client);
                if let Some(departure) = outcome.moved_from {
                    self.departed(departure);
                }
                if outcome.added {
                    self.record(PresenceChange::Joined(room.clone()));
                    tracing::debug!(
                        room = %room,
                        client_id = %id,
                        created = outcome.created,
                        "Client joined room"
                    );
                }
            }
            HubCommand::Leave { room, client } => match self.registry.leave(&room, client) {
                Some(departure) => self.departed(departure),
                None => {
                    tracing::trace!(room = %room, client_id = %client, "Leave for non-member ignored");
                }
            },
            HubCommand::Switch { client, room } => {
                let Some(outcome) = self.registry.switch(client, &room) else {
                    tracing::debug!(client_id = %client, room = %room, "Switch for unknown client ignored");
                    return;
                };
                if let Some(departure) = outcome.moved_from {
                    self.departed(departure);
                }
                if outcome.added {
                    self.record(PresenceChange::Joined(room.clone()));
                    tracing::debug!(room = %room, client_id = %client, "Client switched room");
                }
            }
            HubCommand::Disconnect { client } => {
                if let Some(departure) = self.registry.disconnect(client) {
                    self.departed(departure);
                }
            }
            HubCommand::Broadcast(envelope) => self.broadcast(envelope),
            HubCommand::Snapshot(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    fn broadcast(&mut self, envelope: Envelope) {
        let report = self.registry.deliver(&envelope.room, &envelope.payload);

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);

        if let Some(metrics) = &self.services.metrics {
            metrics
                .messages_broadcast_total
                .with_label_values(&[envelope.room.as_str()])
                .inc();
            metrics.deliveries_total.inc_by(report.delivered as u64);
            metrics.evictions_total.inc_by(report.evicted.len() as u64);
            if !envelope.is_local() {
                metrics.remote_broadcasts_total.inc();
            }
        }

        for id in &report.evicted {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                room = %envelope.room,
                client_id = %id,
                "Evicted slow client: outbound queue full"
            );
        }
        for id in &report.disconnected {
            tracing::debug!(room = %envelope.room, client_id = %id, "Dropped closed client");
        }
        for _ in 0..report.removed() {
            self.record(PresenceChange::Left(envelope.room.clone()));
        }

        if envelope.is_local() {
            if let Some(fanout) = &self.services.fanout {
                let accepted = fanout.publish(&envelope.room, &envelope.payload);
                if accepted {
                    self.stats.published.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.unpublished.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(metrics) = &self.services.metrics {
                    if accepted {
                        metrics.fanout_enqueued_total.inc();
                    } else {
                        metrics.fanout_rejected_total.inc();
                    }
                }
            }
        } else {
            self.stats.remote_broadcasts.fetch_add(1, Ordering::Relaxed);
        }

        tracing::trace!(
            room = %envelope.room,
            delivered = report.delivered,
            removed = report.removed(),
            local = envelope.is_local(),
            "Broadcast processed"
        );
    }

    fn departed(&self, departure: Departure) {
        tracing::debug!(
            room = %departure.room,
            client_id = %departure.client,
            room_closed = departure.room_closed,
            "Client left room"
        );
        self.record(PresenceChange::Left(departure.room));
    }

    fn record(&self, change: PresenceChange) {
        if let Some(presence) = &self.services.presence {
            presence.record(change);
        }
    }
}

/// Errors that can occur submitting to the hub
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    #[error("Hub event loop is not running")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::InMemoryPresence;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingFanout {
        published: Mutex<Vec<(String, Bytes)>>,
    }

    impl Fanout for RecordingFanout {
        fn publish(&self, room: &str, payload: &Bytes) -> bool {
            self.published.lock().push((room.to_string(), payload.clone()));
            true
        }
    }

    /// A fanout whose queue is always full
    struct RefusingFanout;

    impl Fanout for RefusingFanout {
        fn publish(&self, _room: &str, _payload: &Bytes) -> bool {
            false
        }
    }

    fn spawn_hub() -> Hub {
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), HubServices::default());
        hub
    }

    fn client(capacity: usize) -> (ClientHandle, OutboundQueue) {
        ClientHandle::channel(capacity)
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.command_capacity, 4096);
        assert_eq!(config.outbound_capacity, 256);
    }

    #[tokio::test]
    async fn test_join_broadcast_leave_scenario() {
        let hub = spawn_hub();
        let (c1, mut rx1) = client(8);
        let (c2, mut rx2) = client(8);
        let id1 = c1.id();
        let id2 = c2.id();

        hub.join("general", c1).await.unwrap();
        hub.join("general", c2).await.unwrap();
        hub.broadcast("general", "hi").await.unwrap();

        let snapshot = hub.snapshot().await.unwrap();
        assert_eq!(snapshot.members("general"), Some(2));
        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"hi"));
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());

        hub.leave("general", id1).await.unwrap();
        hub.broadcast("general", "bye").await.unwrap();

        let snapshot = hub.snapshot().await.unwrap();
        assert_eq!(snapshot.members("general"), Some(1));
        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"bye"));
        // c1's queue was closed when it left
        assert!(matches!(
            rx1.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));

        hub.leave("general", id2).await.unwrap();
        let snapshot = hub.snapshot().await.unwrap();
        assert_eq!(snapshot.members("general"), None);
        assert_eq!(snapshot, RegistrySnapshot::default());
    }

    #[tokio::test]
    async fn test_broadcasts_keep_submission_order() {
        let hub = spawn_hub();
        let (c1, mut rx1) = client(64);
        hub.join("general", c1).await.unwrap();

        for i in 0..32 {
            hub.broadcast("general", format!("msg-{}", i)).await.unwrap();
        }
        hub.snapshot().await.unwrap();

        for i in 0..32 {
            assert_eq!(rx1.try_recv().unwrap(), Bytes::from(format!("msg-{}", i)));
        }
    }

    #[tokio::test]
    async fn test_no_cross_room_leakage() {
        let hub = spawn_hub();
        let (a, mut rx_a) = client(8);
        let (b, mut rx_b) = client(8);
        hub.join("A", a).await.unwrap();
        hub.join("B", b).await.unwrap();

        hub.broadcast("A", "for-a").await.unwrap();
        hub.snapshot().await.unwrap();

        assert_eq!(rx_a.try_recv().unwrap(), Bytes::from_static(b"for-a"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_client_is_evicted_others_still_receive() {
        let presence = Arc::new(InMemoryPresence::new());
        let services = HubServices {
            presence: Some(presence.clone()),
            ..HubServices::default()
        };
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), services);

        let (slow, mut slow_rx) = client(2);
        let (fast, mut fast_rx) = client(8);
        slow.try_deliver(Bytes::from_static(b"1")).unwrap();
        slow.try_deliver(Bytes::from_static(b"2")).unwrap();
        hub.join("general", slow).await.unwrap();
        hub.join("general", fast).await.unwrap();

        hub.broadcast("general", "hi").await.unwrap();
        hub.broadcast("general", "again").await.unwrap();

        let snapshot = hub.snapshot().await.unwrap();
        assert_eq!(snapshot.members("general"), Some(1));
        assert_eq!(hub.stats().evictions, 1);
        assert_eq!(presence.count("general"), Some(1));

        assert_eq!(fast_rx.try_recv().unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(fast_rx.try_recv().unwrap(), Bytes::from_static(b"again"));

        // Slow client keeps its backlog, gets nothing new, then sees the close
        assert_eq!(slow_rx.recv().await, Some(Bytes::from_static(b"1")));
        assert_eq!(slow_rx.recv().await, Some(Bytes::from_static(b"2")));
        assert_eq!(slow_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_idempotent_leave() {
        let hub = spawn_hub();
        let (c1, mut rx1) = client(8);
        let (c2, _rx2) = client(8);
        let id2 = c2.id();
        hub.join("general", c1).await.unwrap();
        hub.join("random", c2).await.unwrap();

        hub.leave("general", id2).await.unwrap();
        hub.leave("general", ClientId::new()).await.unwrap();
        hub.broadcast("general", "still-here").await.unwrap();

        let snapshot = hub.snapshot().await.unwrap();
        assert_eq!(snapshot.members("general"), Some(1));
        assert_eq!(snapshot.members("random"), Some(1));
        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"still-here"));
    }

    #[tokio::test]
    async fn test_switch_room_moves_atomically() {
        let presence = Arc::new(InMemoryPresence::new());
        let services = HubServices {
            presence: Some(presence.clone()),
            ..HubServices::default()
        };
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), services);
        let (c1, mut rx1) = client(8);
        let id1 = c1.id();
        hub.join("general", c1).await.unwrap();

        hub.switch_room(id1, "music").await.unwrap();
        hub.broadcast("general", "old").await.unwrap();
        hub.broadcast("music", "new").await.unwrap();

        let snapshot = hub.snapshot().await.unwrap();
        assert_eq!(snapshot.members("general"), None);
        assert_eq!(snapshot.members("music"), Some(1));
        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"new"));
        assert!(rx1.try_recv().is_err());

        assert_eq!(presence.count("general"), None);
        assert_eq!(presence.count("music"), Some(1));
    }

    #[tokio::test]
    async fn test_disconnect_leaves_current_room() {
        let hub = spawn_hub();
        let (c1, _rx1) = client(8);
        let id1 = c1.id();
        hub.join("general", c1).await.unwrap();
        hub.switch_room(id1, "gaming").await.unwrap();

        hub.disconnect(id1).await.unwrap();
        hub.disconnect(id1).await.unwrap();

        assert_eq!(hub.snapshot().await.unwrap(), RegistrySnapshot::default());
    }

    #[tokio::test]
    async fn test_only_local_broadcasts_are_published() {
        let fanout = Arc::new(RecordingFanout::default());
        let services = HubServices {
            fanout: Some(fanout.clone()),
            ..HubServices::default()
        };
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), services);
        let (c1, mut rx1) = client(8);
        hub.join("general", c1).await.unwrap();

        hub.broadcast("general", "local").await.unwrap();
        hub.deliver_remote(Envelope::remote("general", "remote", InstanceId::new()))
            .await
            .unwrap();
        // Local broadcasts to rooms without local members still reach peers
        hub.broadcast("elsewhere", "peer-only").await.unwrap();
        hub.snapshot().await.unwrap();

        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"local"));
        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"remote"));

        let published = fanout.published.lock().clone();
        assert_eq!(
            published,
            vec![
                ("general".to_string(), Bytes::from_static(b"local")),
                ("elsewhere".to_string(), Bytes::from_static(b"peer-only")),
            ]
        );

        let stats = hub.stats();
        assert_eq!(stats.broadcasts, 3);
        assert_eq!(stats.remote_broadcasts, 1);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.unpublished, 0);
    }

    #[tokio::test]
    async fn test_refused_publish_is_not_counted_as_published() {
        let metrics = Arc::new(RoomcastMetrics::new().unwrap());
        let services = HubServices {
            fanout: Some(Arc::new(RefusingFanout)),
            metrics: Some(metrics.clone()),
            ..HubServices::default()
        };
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), services);
        let (c1, mut rx1) = client(8);
        hub.join("general", c1).await.unwrap();

        hub.broadcast("general", "local only").await.unwrap();
        hub.snapshot().await.unwrap();

        // Local delivery is unaffected
        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"local only"));

        let stats = hub.stats();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.unpublished, 1);
        assert_eq!(metrics.fanout_enqueued_total.get(), 0);
        assert_eq!(metrics.fanout_rejected_total.get(), 1);
    }

    #[tokio::test]
    async fn test_metrics_follow_broadcasts() {
        let metrics = Arc::new(RoomcastMetrics::new().unwrap());
        let services = HubServices {
            metrics: Some(metrics.clone()),
            ..HubServices::default()
        };
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), services);
        let (slow, _slow_rx) = client(1);
        let (fast, _fast_rx) = client(8);
        hub.join("general", slow).await.unwrap();
        hub.join("general", fast).await.unwrap();

        hub.broadcast("general", "one").await.unwrap();
        hub.broadcast("general", "two").await.unwrap();
        hub.deliver_remote(Envelope::remote("general", "three", InstanceId::new()))
            .await
            .unwrap();
        hub.snapshot().await.unwrap();

        let general = metrics.messages_broadcast_total.with_label_values(&["general"]);
        assert_eq!(general.get(), 3);
        assert_eq!(metrics.remote_broadcasts_total.get(), 1);
        assert_eq!(metrics.evictions_total.get(), 1);
        // "one" reaches both, then slow is evicted on "two"
        assert_eq!(metrics.deliveries_total.get(), 4);
    }

    #[tokio::test]
    async fn test_weak_handle_does_not_keep_loop_alive() {
        let (hub, task) = Hub::spawn(InstanceId::new(), HubConfig::default(), HubServices::default());
        let weak = hub.downgrade();
        assert_eq!(weak.instance_id(), hub.instance_id());

        let upgraded = weak.upgrade().unwrap();
        upgraded.snapshot().await.unwrap();
        drop(upgraded);

        drop(hub);
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_presence_tracks_membership() {
        let presence = Arc::new(InMemoryPresence::new());
        let services = HubServices {
            presence: Some(presence.clone()),
            ..HubServices::default()
        };
        let (hub, _task) = Hub::spawn(InstanceId::new(), HubConfig::default(), services);
        let (c1, _rx1) = client(8);
        let (c2, _rx2) = client(8);
        let id1 = c1.id();
        let id2 = c2.id();

        hub.join("general", c1).await.unwrap();
        hub.join("general", c2).await.unwrap();
        hub.snapshot().await.unwrap();
        assert_eq!(presence.count("general"), Some(2));

        // Leaving a room the client is not in must not touch the counter
        hub.leave("random", id1).await.unwrap();
        hub.leave("general", id1).await.unwrap();
        hub.snapshot().await.unwrap();
        assert_eq!(presence.count("general"), Some(1));

        hub.leave("general", id2).await.unwrap();
        hub.snapshot().await.unwrap();
        assert_eq!(presence.count("general"), None);
        assert!(presence.active_rooms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_track_gauges() {
        let hub = spawn_hub();
        let (c1, _rx1) = client(8);
        let (c2, _rx2) = client(8);
        hub.join("a", c1).await.unwrap();
        hub.join("b", c2).await.unwrap();
        hub.broadcast("a", "x").await.unwrap();
        hub.snapshot().await.unwrap();

        let stats = hub.stats();
        assert_eq!(stats.rooms, 2);
        assert_eq!(stats.clients, 2);
        assert_eq!(stats.deliveries, 1);
    }

    #[tokio::test]
    async fn test_closed_hub_rejects_requests() {
        let (hub, task) = Hub::spawn(InstanceId::new(), HubConfig::default(), HubServices::default());
        task.abort();
        let _ = task.await;

        let (c1, _rx1) = client(8);
        assert_eq!(hub.join("general", c1).await, Err(HubError::Closed));
        assert_eq!(hub.snapshot().await, Err(HubError::Closed));
        hub.closed().await;
    }
}
