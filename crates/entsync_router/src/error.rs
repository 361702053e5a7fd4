//! Router error types.

use entsync_codec::CodecError;

/// Errors surfaced by message dispatch and connection sends.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// An incoming frame could not be decoded into a registered callback type.
    #[error("callback type not registered: {0}")]
    CallbackNotRegistered(#[source] CodecError),

    /// The decoded message type has no registered handler.
    #[error("message type is not registered: {0}")]
    MessageNotRegistered(&'static str),

    /// The peer's outbound channel is gone; the connection has closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Serialization of an outgoing message failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An error reported by the transport driving this connection.
    #[error("transport error: {0}")]
    Transport(String),
}
