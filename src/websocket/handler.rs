//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//!
//! Each connection gets a bounded outbound queue registered with the hub and
//! two tasks: a write pump draining that queue into the socket, and a read
//! pump turning client frames into hub requests. When either ends the other
//! is aborted and the client is disconnected from the hub.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use super::messages::{ChatMessage, Frame, MessageKind};
use crate::api::AppState;
use crate::hub::{ClientId, Hub, OutboundQueue};
use crate::persist::MessageSink;

/// Query parameters of `/ws`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub room: Option<String>,
}

/// WebSocket upgrade handler
///
/// `GET /ws?room=<name>`; without a room the connection joins the
/// configured default room.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let room = state.server.resolve_room(params.room.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, room))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room: String) {
    let hub = state.hub.clone();
    let (client, outbound) = hub.new_client();
    let client_id = client.id();

    if let Err(e) = hub.join(room.as_str(), client).await {
        tracing::error!(client_id = %client_id, room = %room, error = %e, "Failed to register connection");
        return;
    }
    tracing::info!(client_id = %client_id, room = %room, "WebSocket connected");
    if let Some(metrics) = &state.metrics {
        metrics.ws_connections.inc();
    }

    let (sender, receiver) = socket.split();

    let mut send_task = tokio::spawn(write_pump(sender, outbound, client_id));

    let pump = ReadPump {
        hub: hub.clone(),
        sink: Arc::clone(&state.sink),
        client: client_id,
        room,
    };
    let mut recv_task = tokio::spawn(pump.run(receiver));

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    if let Err(e) = hub.disconnect(client_id).await {
        tracing::debug!(client_id = %client_id, error = %e, "Hub gone during disconnect");
    }
    if let Some(metrics) = &state.metrics {
        metrics.ws_connections.dec();
    }
    tracing::info!(client_id = %client_id, "WebSocket disconnected");
}

/// Forward queued payloads to the socket until the hub closes the queue
async fn write_pump(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: OutboundQueue,
    client_id: ClientId,
) {
    while let Some(payload) = outbound.recv().await {
        if sender.send(to_frame(payload)).await.is_err() {
            tracing::debug!(client_id = %client_id, "WebSocket send failed, closing connection");
            return;
        }
    }

    // Queue closed by the hub: evicted or removed
    let _ = sender.close().await;
}

/// UTF-8 payloads go out as text frames, anything else as binary
fn to_frame(payload: Bytes) -> Message {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

struct ReadPump {
    hub: Hub,
    sink: Arc<dyn MessageSink>,
    client: ClientId,
    room: String,
}

impl ReadPump {
    async fn run(mut self, mut receiver: SplitStream<WebSocket>) {
        while let Some(result) = receiver.next().await {
            let keep_open = match result {
                Ok(Message::Text(text)) => self.handle_payload(text.into_bytes()).await,
                Ok(Message::Binary(data)) => self.handle_payload(data).await,
                // Axum answers pings itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => true,
                Ok(Message::Close(_)) => {
                    tracing::debug!(client_id = %self.client, "Client requested close");
                    false
                }
                Err(e) => {
                    tracing::debug!(client_id = %self.client, error = %e, "WebSocket receive error");
                    false
                }
            };

            if !keep_open {
                break;
            }
        }
    }

    /// Returns false if the connection should be closed
    async fn handle_payload(&mut self, raw: Vec<u8>) -> bool {
        let frame = match Frame::decode(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(client_id = %self.client, error = %e, "Undecodable frame, closing connection");
                return false;
            }
        };

        let kind = frame.kind();
        if kind == MessageKind::Other {
            return self.hub.broadcast(self.room.as_str(), raw).await.is_ok();
        }

        let message = match frame.into_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(client_id = %self.client, error = %e, "Malformed chat frame, closing connection");
                return false;
            }
        };

        if kind == MessageKind::Join {
            self.switch_room(&message).await
        } else {
            self.send_message(message).await
        }
    }

    async fn switch_room(&mut self, message: &ChatMessage) -> bool {
        let Some(target) = message.target_room() else {
            return true;
        };
        let target = target.to_string();
        if self.hub.switch_room(self.client, target.as_str()).await.is_err() {
            return false;
        }
        tracing::debug!(client_id = %self.client, from = %self.room, room = %target, "Switching room");
        self.room = target;
        true
    }

    async fn send_message(&mut self, mut message: ChatMessage) -> bool {
        message.stamp(&self.room, Utc::now());
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(client_id = %self.client, error = %e, "Failed to encode chat message");
                return true;
            }
        };

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.persist(&message).await {
                tracing::warn!(error = %e, "Failed to persist chat message");
            }
        });

        self.hub.broadcast(self.room.as_str(), payload).await.is_ok()
    }
}
