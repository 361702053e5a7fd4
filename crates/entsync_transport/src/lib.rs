//! # entsync_transport
//!
//! WebSocket transport driving the entsync router.
//!
//! This crate provides:
//!
//! - [`WsServerTransport`] — accepts connections on `host:port`, default
//!   path `/`, binary frames only.
//! - [`WsClientTransport`] — dials an absolute `ws://` URL.
//! - [`TransportError`] — transport-layer error type.
//!
//! Both transports register every connection with the default router:
//! connect and disconnect events fan out through the router's lifecycle
//! handlers, incoming binary frames dispatch synchronously on the read task,
//! and outgoing frames drain through a per-connection writer task. The
//! server additionally pings peers periodically to keep intermediaries from
//! dropping idle connections.

pub mod client;
pub mod error;
mod frame;
pub mod server;

pub use client::WsClientTransport;
pub use error::TransportError;
pub use server::{BoundWsServer, WsServerTransport};

use std::time::Duration;

/// Maximum time without a readable frame before a client connection is
/// considered dead.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(55);

/// Hard cap on the lifetime of a single connection.
pub const MAX_CONNECTION_TIME: Duration = Duration::from_secs(12 * 60 * 60);

/// Interval between server-side heartbeat pings.
pub const MAX_PING_TIME: Duration = Duration::from_secs(3 * 60);

/// Cap on the WebSocket handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default server listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7373";

/// Environment variable overriding the server listen address.
pub const LISTEN_ADDR_ENV: &str = "ENTSYNC_LISTEN_ADDR";

/// Default URL clients dial.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:7373";

/// Environment variable overriding the dial URL.
pub const SERVER_URL_ENV: &str = "ENTSYNC_SERVER_URL";

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Greeting {
        text: String,
    }

    #[tokio::test]
    async fn test_end_to_end_message_exchange() {
        entsync_router::reset();

        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        entsync_router::on::<Greeting, _>(move |_sender, message| {
            let _ = seen_tx.send(message.text.clone());
        });
        entsync_router::on_connect(|client| {
            let _ = client.send_message(&Greeting {
                text: "hello".to_string(),
            });
        });

        let server = WsServerTransport::new("127.0.0.1:0").bind().await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());

        let client = WsClientTransport::new(format!("ws://{addr}"));
        let dial = tokio::spawn(async move { client.dial().await });

        let text = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("no message within timeout")
            .expect("channel closed");
        assert_eq!(text, "hello");

        dial.abort();
    }

    #[tokio::test]
    async fn test_dial_refused_errors() {
        let client = WsClientTransport::new("ws://127.0.0.1:1");
        assert!(client.dial().await.is_err());
    }
}
