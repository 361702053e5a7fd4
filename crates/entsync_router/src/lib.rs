//! # entsync_router
//!
//! Typed message router and connection registry for entsync.
//!
//! Transports hand the router raw connections and decoded frames; the router
//! resolves each frame's type through its message [`TypeMapper`]
//! (registered lazily with content-based ids) and dispatches to typed
//! handlers, synchronously and in registration order. Connection lifecycle
//! events fan out concurrently, one bounded task per handler.
//!
//! A process-wide default instance backs the free functions in this module,
//! mirroring the usual single-router deployment; tests can either build
//! their own [`Router`] or call [`reset`].

pub mod client;
pub mod error;
pub mod router;

pub use client::{ClientId, Connection, ConnectionId, NetworkClient};
pub use error::RouterError;
pub use router::Router;

use std::sync::LazyLock;

use serde::Serialize;
use serde::de::DeserializeOwned;

static GLOBAL: LazyLock<Router> = LazyLock::new(Router::new);

/// The process-wide default router.
#[must_use]
pub fn global() -> &'static Router {
    &GLOBAL
}

/// Register a handler on the default router for messages of type `T`.
pub fn on<T, F>(handler: F)
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&std::sync::Arc<NetworkClient>, &T) + Send + Sync + 'static,
{
    GLOBAL.on(handler);
}

/// Register a connect handler on the default router.
pub fn on_connect<F>(handler: F)
where
    F: Fn(std::sync::Arc<NetworkClient>) + Send + Sync + 'static,
{
    GLOBAL.on_connect(handler);
}

/// Register a disconnect handler on the default router.
pub fn on_disconnect<F>(handler: F)
where
    F: Fn(std::sync::Arc<NetworkClient>, Option<std::sync::Arc<RouterError>>) + Send + Sync + 'static,
{
    GLOBAL.on_disconnect(handler);
}

/// Register an error handler on the default router.
pub fn on_error<F>(handler: F)
where
    F: Fn(std::sync::Arc<NetworkClient>, std::sync::Arc<RouterError>) + Send + Sync + 'static,
{
    GLOBAL.on_error(handler);
}

/// Broadcast a message to every peer of the default router.
///
/// # Errors
///
/// Returns the serialization error or the first failed send.
pub fn broadcast<T>(msg: &T) -> Result<(), RouterError>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    GLOBAL.broadcast(msg)
}

/// Snapshot of the default router's connected peers.
#[must_use]
pub fn peers() -> Vec<std::sync::Arc<NetworkClient>> {
    GLOBAL.peers()
}

/// Clear all handlers and connections on the default router. Test hook.
pub fn reset() {
    GLOBAL.reset();
}
