//! Connection handles and the per-peer client object.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::RouterError;

/// Process-unique identifier for one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Stable per-peer identifier: 10 random bytes rendered as 20 hex chars,
/// assigned on first observation of the connection and kept until close.
pub type ClientId = String;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A live transport connection: an identity plus the outbound byte channel
/// drained by the transport's writer task.
///
/// Cloning is cheap; all clones refer to the same connection.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    outbound: UnboundedSender<Vec<u8>>,
}

impl Connection {
    /// Wrap an outbound channel into a connection with a fresh id.
    #[must_use]
    pub fn new(outbound: UnboundedSender<Vec<u8>>) -> Self {
        Self {
            id: ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            outbound,
        }
    }

    /// Returns the connection's process-unique id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue a binary frame for the writer task.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConnectionClosed`] when the writer is gone.
    pub fn send(&self, payload: Vec<u8>) -> Result<(), RouterError> {
        self.outbound
            .send(payload)
            .map_err(|_| RouterError::ConnectionClosed)
    }
}

/// A connected peer as seen by handlers: stable [`ClientId`] plus the
/// underlying [`Connection`].
#[derive(Debug)]
pub struct NetworkClient {
    id: ClientId,
    conn: Connection,
}

impl NetworkClient {
    pub(crate) fn new(id: ClientId, conn: Connection) -> Self {
        Self { id, conn }
    }

    /// Returns the peer's stable client id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the id of the underlying connection.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// Serialize a message through the default router's mapper and send it
    /// to this peer.
    ///
    /// # Errors
    ///
    /// Returns the serialization error, or
    /// [`RouterError::ConnectionClosed`] if the connection is gone.
    pub fn send_message<T>(&self, msg: &T) -> Result<(), RouterError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let payload = crate::global().serialize(msg)?;
        self.send_bytes(payload)
    }

    /// Send an already-serialized frame to this peer.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConnectionClosed`] if the connection is gone.
    pub fn send_bytes(&self, payload: Vec<u8>) -> Result<(), RouterError> {
        self.conn.send(payload)
    }
}

/// Generate a fresh [`ClientId`]: the first 10 bytes of a v4 UUID in hex.
#[must_use]
pub(crate) fn generate_client_id() -> ClientId {
    use std::fmt::Write as _;

    let uuid = uuid::Uuid::new_v4();
    let mut id = String::with_capacity(20);
    for byte in &uuid.as_bytes()[..10] {
        let _ = write!(id, "{byte:02x}");
    }
    id
}
