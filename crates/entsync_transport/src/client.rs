//! WebSocket client transport.

use tokio::sync::mpsc::unbounded_channel;
use tokio::time::timeout;
use tracing::{debug, info};

use entsync_router::Connection;

use crate::error::TransportError;
use crate::frame::{drive_writer, read_loop};
use crate::{HANDSHAKE_TIMEOUT, IDLE_TIMEOUT, SERVER_URL_ENV};

/// Dials a WebSocket server and wires the connection into the default
/// router.
#[derive(Debug, Clone)]
pub struct WsClientTransport {
    url: String,
}

impl WsClientTransport {
    /// Create a transport dialing the given absolute URL (`ws://host:port`).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Create a transport from the `ENTSYNC_SERVER_URL` environment
    /// variable, falling back to [`DEFAULT_SERVER_URL`](crate::DEFAULT_SERVER_URL).
    #[must_use]
    pub fn from_env() -> Self {
        let url =
            std::env::var(SERVER_URL_ENV).unwrap_or_else(|_| crate::DEFAULT_SERVER_URL.to_string());
        Self::new(url)
    }

    /// Dial the server and run the connection until it closes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the dial or handshake fails. Errors
    /// after the connection is established surface through the router's
    /// error and disconnect handlers instead.
    pub async fn dial(&self) -> Result<(), TransportError> {
        self.dial_with(|_conn| {}).await
    }

    /// Like [`dial`](Self::dial), invoking `on_open` with the connection
    /// before the first read, for callers that want to keep the handle.
    ///
    /// # Errors
    ///
    /// See [`dial`](Self::dial).
    pub async fn dial_with<F>(&self, on_open: F) -> Result<(), TransportError>
    where
        F: FnOnce(&Connection),
    {
        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let (ws, _response) = match timeout(HANDSHAKE_TIMEOUT, connect).await {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::HandshakeTimeout),
        };
        info!(url = %self.url, "connected");

        let (sink, stream) = futures_util::StreamExt::split(ws);
        let (outbound_tx, outbound_rx) = unbounded_channel();
        let conn = Connection::new(outbound_tx);

        let writer = tokio::spawn(drive_writer(sink, outbound_rx, None));

        on_open(&conn);

        let router = entsync_router::global();
        router.handle_connect(&conn);

        let err = read_loop(stream, &conn, IDLE_TIMEOUT).await;
        debug!(url = %self.url, "connection closed");
        router.handle_disconnect(&conn, err);
        writer.abort();
        Ok(())
    }
}
