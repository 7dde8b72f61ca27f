//! Redis Pub/Sub Bridge
//!
//! `RedisFanout` is the hub-facing publisher: it encodes and queues without
//! ever waiting on Redis. `RedisBridge` owns the two background loops, a
//! pipelined publisher draining that queue and a pattern subscriber that
//! feeds other instances' broadcasts back into the local hub.

use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{accept_inbound, encode, Backoff, BridgeError, BridgeMetrics, ChannelNaming, Fanout};
use crate::config::RedisConfig;
use crate::hub::{Hub, InstanceId, WeakHub};
use crate::redis_link::RedisLink;

const MAX_PIPELINE_SIZE: usize = 64;

struct Outgoing {
    channel: String,
    data: Vec<u8>,
}

/// Non-blocking publisher handed to the hub
pub struct RedisFanout {
    tx: mpsc::Sender<Outgoing>,
    naming: ChannelNaming,
    instance: InstanceId,
    metrics: Arc<BridgeMetrics>,
}

impl Fanout for RedisFanout {
    fn publish(&self, room: &str, payload: &Bytes) -> bool {
        let data = match encode(self.instance, payload) {
            Ok(data) => data,
            Err(e) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(room = %room, error = %e, "Failed to encode fanout message");
                return false;
            }
        };

        let outgoing = Outgoing {
            channel: self.naming.channel(room),
            data,
        };

        let Err(e) = self.tx.try_send(outgoing) else {
            return true;
        };

        self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(room = %room, "Fanout publish queue full, message not shared");
            }
            mpsc::error::TrySendError::Closed(_) => {
                tracing::debug!(room = %room, "Fanout publisher stopped, message not shared");
            }
        }
        false
    }
}

/// Background side of the Redis bridge
pub struct RedisBridge {
    client: redis::Client,
    naming: ChannelNaming,
    instance: InstanceId,
    timeout: Duration,
    publish_rx: mpsc::Receiver<Outgoing>,
    metrics: Arc<BridgeMetrics>,
}

impl RedisBridge {
    /// Create the publisher/bridge pair
    ///
    /// Only validates the URL; no connection is made until the bridge runs.
    pub fn new(
        config: &RedisConfig,
        instance: InstanceId,
    ) -> Result<(RedisFanout, RedisBridge), BridgeError> {
        let client = redis::Client::open(config.url.as_str())?;
        let naming = ChannelNaming::new(config.channel_prefix.clone());
        let metrics = Arc::new(BridgeMetrics::default());
        let (tx, publish_rx) = mpsc::channel(config.queue_capacity.max(1));

        let fanout = RedisFanout {
            tx,
            naming: naming.clone(),
            instance,
            metrics: Arc::clone(&metrics),
        };

        let bridge = RedisBridge {
            client,
            naming,
            instance,
            timeout: config.op_timeout(),
            publish_rx,
            metrics,
        };

        Ok((fanout, bridge))
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Start publishing and relaying for `hub`
    ///
    /// The bridge only holds `hub` weakly. It stops when every `RedisFanout`
    /// is dropped, which happens when the hub's event loop stops if the
    /// fanout was handed to the hub, or when a relayed message finds the hub
    /// gone.
    pub fn spawn(self, hub: &Hub) -> JoinHandle<()> {
        let RedisBridge {
            client,
            naming,
            instance,
            timeout,
            publish_rx,
            metrics,
        } = self;
        let hub = hub.downgrade();

        tokio::spawn(async move {
            let link = RedisLink::new(client.clone(), timeout);
            let publisher = publish_loop(link, publish_rx, Arc::clone(&metrics));
            let subscriber = subscribe_loop(client, naming, instance, timeout, hub, metrics);

            tokio::select! {
                _ = publisher => {
                    tracing::info!("Fanout publisher stopped");
                }
                _ = subscriber => {
                    tracing::info!("Fanout subscriber stopped");
                }
            }
        })
    }
}

async fn publish_loop(
    mut link: RedisLink,
    mut rx: mpsc::Receiver<Outgoing>,
    metrics: Arc<BridgeMetrics>,
) {
    let mut batch: Vec<Outgoing> = Vec::with_capacity(MAX_PIPELINE_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_PIPELINE_SIZE {
            match rx.try_recv() {
                Ok(next) => batch.push(next),
                Err(_) => break,
            }
        }

        let count = batch.len() as u64;
        let mut pipe = redis::pipe();
        for outgoing in &batch {
            pipe.cmd("PUBLISH")
                .arg(&outgoing.channel)
                .arg(&outgoing.data)
                .ignore();
        }

        match link.query::<()>(&pipe).await {
            Ok(()) => {
                metrics.published.fetch_add(count, Ordering::Relaxed);
            }
            Err(e) => {
                metrics.publish_errors.fetch_add(count, Ordering::Relaxed);
                tracing::warn!(error = %e, dropped = count, "Fanout publish failed");
            }
        }
        batch.clear();
    }
}

async fn subscribe_loop(
    client: redis::Client,
    naming: ChannelNaming,
    instance: InstanceId,
    timeout: Duration,
    hub: WeakHub,
    metrics: Arc<BridgeMetrics>,
) {
    let mut backoff = Backoff::new();

    loop {
        if hub.upgrade().is_none() {
            return;
        }

        let result = run_subscription(
            &client,
            &naming,
            instance,
            timeout,
            &hub,
            &metrics,
            &mut backoff,
        )
        .await;
        metrics.connected.store(false, Ordering::Relaxed);

        let e = match result {
            Ok(()) => return,
            Err(e) => e,
        };

        metrics.reconnects.fetch_add(1, Ordering::Relaxed);
        let delay = backoff.next_delay();
        tracing::warn!(
            error = %e,
            retry_in_ms = delay.as_millis() as u64,
            "Fanout subscriber disconnected"
        );

        tokio::time::sleep(delay).await;
    }
}

/// One subscriber connection; `Ok` means the hub is gone
async fn run_subscription(
    client: &redis::Client,
    naming: &ChannelNaming,
    instance: InstanceId,
    timeout: Duration,
    hub: &WeakHub,
    metrics: &BridgeMetrics,
    backoff: &mut Backoff,
) -> Result<(), BridgeError> {
    let mut pubsub = match tokio::time::timeout(timeout, client.get_async_pubsub()).await {
        Ok(result) => result?,
        Err(_) => return Err(crate::redis_link::LinkError::Timeout(timeout).into()),
    };

    let pattern = naming.pattern();
    pubsub.psubscribe(&pattern).await?;

    metrics.connected.store(true, Ordering::Relaxed);
    backoff.reset();
    tracing::info!(pattern = %pattern, instance = %instance, "Fanout subscriber listening");

    let messages = pubsub.into_on_message();
    tokio::pin!(messages);

    loop {
        let Some(msg) = messages.next().await else {
            return Err(BridgeError::StreamEnded);
        };

        metrics.received.fetch_add(1, Ordering::Relaxed);
        let channel = msg.get_channel_name();

        match accept_inbound(instance, naming, channel, msg.get_payload_bytes()) {
            Ok(Some(envelope)) => {
                let Some(live) = hub.upgrade() else {
                    return Ok(());
                };
                if live.deliver_remote(envelope).await.is_err() {
                    return Ok(());
                }
                metrics.relayed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                metrics.skipped_own.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                metrics.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(channel = %channel, error = %e, "Ignoring fanout message");
            }
        }
    }
}
