//! Client Handles
//!
//! A `ClientHandle` is the hub's end of one live connection: a stable id and
//! the sending half of a bounded outbound queue. The handle is deliberately
//! not `Clone`. Once it is handed to the hub with `join`, the hub holds the
//! only sender, so dropping the handle closes the queue and the connection's
//! write pump observes end-of-stream.

use bytes::Bytes;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default bound of a client's outbound queue
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Unique identifier for a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving half of a client's outbound queue, drained by the write pump
pub type OutboundQueue = mpsc::Receiver<Bytes>;

/// The hub-side handle of one connection
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    outbound: mpsc::Sender<Bytes>,
}

/// Why a payload could not be enqueued for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The queue is at capacity: the consumer is too slow
    Full,
    /// The write pump is gone
    Closed,
}

impl ClientHandle {
    /// Create a handle and its outbound queue with the given bound
    pub fn channel(capacity: usize) -> (Self, OutboundQueue) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: ClientId::new(),
            outbound,
        };
        (handle, rx)
    }

    /// Like `channel`, but reusing an existing id
    pub(crate) fn channel_with_id(id: ClientId, capacity: usize) -> (Self, OutboundQueue) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        (Self { id, outbound }, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Non-blocking enqueue onto the outbound queue
    pub fn try_deliver(&self, payload: Bytes) -> Result<(), DeliveryFailure> {
        self.outbound.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}
