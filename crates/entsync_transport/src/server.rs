//! WebSocket server transport.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use entsync_router::Connection;

use crate::error::TransportError;
use crate::frame::{drive_writer, read_loop};
use crate::{HANDSHAKE_TIMEOUT, LISTEN_ADDR_ENV, MAX_CONNECTION_TIME, MAX_PING_TIME};

/// Accepts WebSocket connections and wires them into the default router.
#[derive(Debug, Clone)]
pub struct WsServerTransport {
    addr: String,
}

impl WsServerTransport {
    /// Create a transport listening on `addr` (`host:port`).
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Create a transport from the `ENTSYNC_LISTEN_ADDR` environment
    /// variable, falling back to [`DEFAULT_LISTEN_ADDR`](crate::DEFAULT_LISTEN_ADDR).
    #[must_use]
    pub fn from_env() -> Self {
        let addr =
            std::env::var(LISTEN_ADDR_ENV).unwrap_or_else(|_| crate::DEFAULT_LISTEN_ADDR.to_string());
        Self::new(addr)
    }

    /// Bind the listening socket without accepting yet.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the address cannot be bound.
    pub async fn bind(&self) -> Result<BoundWsServer, TransportError> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!(addr = %self.addr, "websocket server listening");
        Ok(BoundWsServer { listener })
    }

    /// Bind and serve until an accept error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] on bind or accept failure.
    pub async fn serve(&self) -> Result<(), TransportError> {
        self.bind().await?.serve().await
    }
}

/// A bound server socket, ready to accept connections.
#[derive(Debug)]
pub struct BoundWsServer {
    listener: TcpListener,
}

impl BoundWsServer {
    /// The locally bound address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the socket address is unavailable.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, driving each on its own task.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] when accepting fails.
    pub async fn serve(self) -> Result<(), TransportError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            tokio::spawn(handle_connection(stream, peer));
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr) {
    let ws = match timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(err)) => {
            warn!(%peer, %err, "websocket handshake failed");
            return;
        }
        Err(_) => {
            warn!(%peer, "websocket handshake timed out");
            return;
        }
    };
    debug!(%peer, "peer connected");

    let (sink, stream) = futures_util::StreamExt::split(ws);
    let (outbound_tx, outbound_rx) = unbounded_channel();
    let conn = Connection::new(outbound_tx);

    let writer = tokio::spawn(drive_writer(sink, outbound_rx, Some(MAX_PING_TIME)));

    let router = entsync_router::global();
    router.handle_connect(&conn);

    let err = read_loop(stream, &conn, MAX_CONNECTION_TIME).await;
    debug!(%peer, "peer disconnected");
    router.handle_disconnect(&conn, err);
    writer.abort();
}
