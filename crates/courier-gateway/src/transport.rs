use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use courier_types::events::ServerEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// The connection's outbound side is gone.
    #[error("connection closed")]
    Closed,
}

/// Outbound side of one client connection.
///
/// Pushes are fire-and-forget: `Ok` means the event was handed to the
/// transport, not that the client rendered it. An acknowledging transport
/// can implement this trait without the delivery engine changing.
pub trait EventSink: Send + Sync {
    fn push(&self, event: ServerEvent) -> Result<(), PushError>;
}

impl EventSink for mpsc::UnboundedSender<ServerEvent> {
    fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.send(event).map_err(|_| PushError::Closed)
    }
}

/// A connection as seen by the presence registry: a unique id plus the sink.
/// Two handles are equal only if they came from the same connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    sink: Arc<dyn EventSink>,
}

impl ConnectionHandle {
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            sink: Arc::new(sink),
        }
    }

    /// Handle backed by an unbounded channel; the receiver feeds the socket.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.sink.push(event)
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle").field("id", &self.id).finish()
    }
}
