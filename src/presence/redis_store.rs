//! Redis-backed presence
//!
//! Keys: a set of active room names (`rooms` by default) and a hash of
//! room -> member count (`room:members`). Updates run on a background
//! worker so the hub only ever does a `try_send`.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::{Presence, PresenceChange, PresenceError, PresenceLedger, RoomPresence};
use crate::config::RedisConfig;
use crate::redis_link::{LinkError, RedisLink};

#[derive(Debug, Clone)]
struct PresenceKeys {
    rooms: String,
    members: String,
}

/// Presence stored in Redis, shared by every instance
pub struct RedisPresence {
    tx: mpsc::Sender<PresenceChange>,
    reader: Mutex<RedisLink>,
    keys: PresenceKeys,
}

impl RedisPresence {
    /// Create the store and start its update worker
    pub fn spawn(config: &RedisConfig) -> Result<(Self, JoinHandle<()>), redis::RedisError> {
        let client = redis::Client::open(config.url.as_str())?;
        let keys = PresenceKeys {
            rooms: config.rooms_key.clone(),
            members: config.members_key.clone(),
        };
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let writer = RedisLink::new(client.clone(), config.op_timeout());
        let worker = tokio::spawn(apply_loop(writer, keys.clone(), rx));

        let presence = Self {
            tx,
            reader: Mutex::new(RedisLink::new(client, config.op_timeout())),
            keys,
        };
        Ok((presence, worker))
    }
}

#[async_trait]
impl Presence for RedisPresence {
    fn record(&self, change: PresenceChange) {
        if let Err(e) = self.tx.try_send(change) {
            let change = match e {
                mpsc::error::TrySendError::Full(change) => change,
                mpsc::error::TrySendError::Closed(change) => change,
            };
            tracing::warn!(room = %change.room(), "Presence update dropped");
        }
    }

    async fn active_rooms(&self) -> Result<Vec<RoomPresence>, PresenceError> {
        let mut pipe = redis::pipe();
        pipe.cmd("SMEMBERS")
            .arg(&self.keys.rooms)
            .cmd("HGETALL")
            .arg(&self.keys.members);

        let (mut rooms, counts): (Vec<String>, HashMap<String, i64>) =
            self.reader.lock().await.query(&pipe).await?;
        rooms.sort();

        Ok(rooms
            .into_iter()
            .map(|room| {
                let members = counts.get(&room).copied().unwrap_or(0);
                RoomPresence { room, members }
            })
            .collect())
    }
}

async fn apply_loop(
    mut link: RedisLink,
    keys: PresenceKeys,
    mut rx: mpsc::Receiver<PresenceChange>,
) {
    while let Some(change) = rx.recv().await {
        if let Err(e) = apply_change(&mut link, &keys, &change).await {
            tracing::warn!(room = %change.room(), error = %e, "Presence update failed");
        }
    }
    tracing::debug!("Presence worker stopped");
}

async fn apply_change(
    link: &mut RedisLink,
    keys: &PresenceKeys,
    change: &PresenceChange,
) -> Result<(), LinkError> {
    match change {
        PresenceChange::Joined(room) => {
            let mut pipe = redis::pipe();
            pipe.cmd("SADD")
                .arg(&keys.rooms)
                .arg(room)
                .ignore()
                .cmd("HINCRBY")
                .arg(&keys.members)
                .arg(room)
                .arg(1)
                .ignore();
            link.query::<()>(&pipe).await
        }
        PresenceChange::Left(room) => {
            let mut pipe = redis::pipe();
            pipe.cmd("HINCRBY").arg(&keys.members).arg(room).arg(-1);
            let (count,): (i64,) = link.query(&pipe).await?;

            if PresenceLedger::should_purge(count) {
                let mut purge = redis::pipe();
                purge
                    .cmd("HDEL")
                    .arg(&keys.members)
                    .arg(room)
                    .ignore()
                    .cmd("SREM")
                    .arg(&keys.rooms)
                    .arg(room)
                    .ignore();
                link.query::<()>(&purge).await?;
            }
            Ok(())
        }
    }
}
