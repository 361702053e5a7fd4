//! Transport error types.

/// Errors that can occur while serving or dialing WebSocket connections.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// WebSocket protocol or connection error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Socket-level I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket handshake did not complete in time.
    #[error("websocket handshake timed out")]
    HandshakeTimeout,
}
