//! Shared read/write loops for established WebSocket connections.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message};
use tracing::debug;

use entsync_router::{Connection, RouterError};

use crate::MAX_CONNECTION_TIME;

/// Drain the connection's outbound channel into the WebSocket sink,
/// optionally emitting heartbeat pings while idle.
///
/// Returns when the channel closes or a send fails; the peer's read loop
/// notices the closed socket and tears the connection down.
pub(crate) async fn drive_writer<S>(
    mut sink: S,
    mut outbound: UnboundedReceiver<Vec<u8>>,
    heartbeat: Option<Duration>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let mut ticker = heartbeat.map(tokio::time::interval);
    if let Some(ticker) = ticker.as_mut() {
        // The first tick completes immediately.
        ticker.tick().await;
    }

    loop {
        let ping_due = async {
            match ticker.as_mut() {
                Some(ticker) => {
                    ticker.tick().await;
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(payload) => {
                    if sink.send(Message::Binary(payload.into())).await.is_err() {
                        return;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return;
                }
            },
            () = ping_due => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Pump incoming frames into the router until the connection ends.
///
/// Binary frames dispatch through the router on this task; dispatch errors
/// fan out through the error handlers without ending the connection. Returns
/// the error to report to the disconnect handlers, or `None` for a clean
/// close.
pub(crate) async fn read_loop<S>(
    mut stream: S,
    conn: &Connection,
    read_timeout: Duration,
) -> Option<RouterError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let router = entsync_router::global();
    let deadline = Instant::now() + MAX_CONNECTION_TIME;

    loop {
        let frame = match tokio::time::timeout(read_timeout, stream.next()).await {
            Err(_) => return Some(RouterError::Transport("read timed out".to_string())),
            Ok(None) => return None,
            Ok(Some(Err(err))) => {
                router.handle_error(conn, RouterError::Transport(err.to_string()));
                return Some(RouterError::Transport(err.to_string()));
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Binary(payload) => {
                if let Err(err) = router.handle_message(conn, payload.as_ref()) {
                    router.handle_error(conn, err);
                }
            }
            Message::Close(reason) => {
                debug!(?reason, "peer closed the connection");
                return None;
            }
            // Ping/pong bookkeeping happens in the protocol layer; text
            // frames are not part of the wire format.
            _ => {}
        }

        if Instant::now() >= deadline {
            return Some(RouterError::Transport(
                "connection time limit reached".to_string(),
            ));
        }
    }
}
