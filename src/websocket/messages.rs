//! WebSocket Message Types
//!
//! Frames exchanged with chat clients are JSON objects of the form
//! `{type, room, content, sender, timestamp}`. The hub itself treats
//! payloads as opaque bytes; only the connection's read pump looks inside.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a client frame asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Chat message for the current room
    Message,
    /// Move to the room named in the frame
    Join,
    /// Anything else; relayed unchanged
    Other,
}

impl MessageKind {
    fn of(kind: Option<&str>) -> Self {
        match kind {
            Some("message") => MessageKind::Message,
            Some("join") => MessageKind::Join,
            _ => MessageKind::Other,
        }
    }
}

/// A client frame, decoded only far enough to read its `type`
///
/// Relayed frames are free to use any field layout; only `message` and
/// `join` frames have to fit [`ChatMessage`].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    fields: Map<String, Value>,
}

impl Frame {
    /// Decode a client frame; anything but a JSON object is rejected
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            fields: serde_json::from_slice(data)?,
        })
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::of(self.fields.get("type").and_then(Value::as_str))
    }

    /// Read the frame as a chat message
    pub fn into_message(self) -> Result<ChatMessage, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields))
    }
}

/// A chat frame
///
/// Fields the server does not know about are kept, so a stamped message
/// re-encodes with everything the client sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Decode a client frame; anything but a JSON object is rejected
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::of(Some(self.kind.as_str()))
    }

    /// Room named by a join frame, if it names one
    pub fn target_room(&self) -> Option<&str> {
        self.room.as_deref().filter(|room| !room.is_empty())
    }

    /// Pin the message to `room` and fill in the time if the client left it out
    pub fn stamp(&mut self, room: &str, now: DateTime<Utc>) {
        self.room = Some(room.to_string());
        if self.timestamp.is_none() {
            self.timestamp = Some(now);
        }
    }
}
