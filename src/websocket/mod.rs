//! WebSocket Chat Endpoint
//!
//! Clients connect to `/ws?room=<name>` and are joined to that room (or the
//! configured default). Frames are JSON chat messages:
//!
//! - `{"type": "join", "room": "Music"}` moves the connection to another room
//! - `{"type": "message", "content": "..."}` is stamped with the current room
//!   and time, persisted, and broadcast to the room
//! - any other frame is broadcast to the room unchanged
//!
//! A frame that is not a JSON object closes the connection, as does a
//! `message` or `join` frame whose fields do not fit [`ChatMessage`]. Other
//! frames are only checked for being an object.
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8000/ws?room=General');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'message', sender: 'ana', content: 'hello'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   console.log(`[${msg.room}] ${msg.sender}: ${msg.content}`);
//! };
//! ```

mod handler;
mod messages;

pub use handler::{websocket_handler, ConnectParams};
pub use messages::{ChatMessage, Frame, MessageKind};
