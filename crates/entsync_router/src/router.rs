//! Message dispatch, connection registry, and lifecycle fan-out.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use entsync_codec::{TypeMapper, UNREGISTERED, type_hash};

use crate::client::{ClientId, Connection, ConnectionId, NetworkClient, generate_client_id};
use crate::error::RouterError;

/// Upper bound on concurrently running lifecycle handler tasks, so flapping
/// connections cannot grow the task set without limit.
const LIFECYCLE_FANOUT_LIMIT: usize = 64;

type MessageHandler = Arc<dyn Fn(&Arc<NetworkClient>, &(dyn Any + Send + Sync)) + Send + Sync>;
type ConnectHandler = Arc<dyn Fn(Arc<NetworkClient>) + Send + Sync>;
type DisconnectHandler = Arc<dyn Fn(Arc<NetworkClient>, Option<Arc<RouterError>>) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(Arc<NetworkClient>, Arc<RouterError>) + Send + Sync>;

/// Routes decoded messages to typed handlers and tracks live connections.
///
/// Message dispatch is synchronous on the calling task, preserving
/// per-connection ordering. Connect, disconnect, and error events fan out
/// concurrently — one task per handler, bounded by a semaphore.
pub struct Router {
    mapper: TypeMapper,
    handlers: Mutex<HashMap<TypeId, Vec<MessageHandler>>>,
    connect_handlers: Mutex<Vec<ConnectHandler>>,
    disconnect_handlers: Mutex<Vec<DisconnectHandler>>,
    error_handlers: Mutex<Vec<ErrorHandler>>,
    clients: Mutex<HashMap<ConnectionId, Arc<NetworkClient>>>,
    ids: Mutex<HashMap<ConnectionId, ClientId>>,
    fanout: Arc<Semaphore>,
}

impl Router {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mapper: TypeMapper::new(),
            handlers: Mutex::new(HashMap::new()),
            connect_handlers: Mutex::new(Vec::new()),
            disconnect_handlers: Mutex::new(Vec::new()),
            error_handlers: Mutex::new(Vec::new()),
            clients: Mutex::new(HashMap::new()),
            ids: Mutex::new(HashMap::new()),
            fanout: Arc::new(Semaphore::new(LIFECYCLE_FANOUT_LIMIT)),
        }
    }

    // ── Handler registration ────────────────────────────────────────────

    /// Register a handler for messages of type `T`.
    ///
    /// `T` is entered into the message mapper under its content-based id if
    /// not already present; an existing registration is left untouched.
    /// Handlers for the same type run in registration order.
    pub fn on<T, F>(&self, handler: F)
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(&Arc<NetworkClient>, &T) + Send + Sync + 'static,
    {
        // Already-registered ids are fine here; the mapper keeps the first
        // mapping and dispatch goes by resolved type either way.
        let _ = self.mapper.register::<T>(type_hash::<T>());

        let wrapper: MessageHandler = Arc::new(move |client, value| {
            if let Some(message) = value.downcast_ref::<T>() {
                handler(client, message);
            }
        });
        self.handlers
            .lock()
            .unwrap()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(wrapper);
    }

    /// Register a handler invoked when a session connects.
    pub fn on_connect<F>(&self, handler: F)
    where
        F: Fn(Arc<NetworkClient>) + Send + Sync + 'static,
    {
        self.connect_handlers.lock().unwrap().push(Arc::new(handler));
    }

    /// Register a handler invoked when a session disconnects.
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn(Arc<NetworkClient>, Option<Arc<RouterError>>) + Send + Sync + 'static,
    {
        self.disconnect_handlers.lock().unwrap().push(Arc::new(handler));
    }

    /// Register a handler invoked when a message or transport error occurs.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(Arc<NetworkClient>, Arc<RouterError>) + Send + Sync + 'static,
    {
        self.error_handlers.lock().unwrap().push(Arc::new(handler));
    }

    // ── Message processing ──────────────────────────────────────────────

    /// Decode a frame and invoke the handlers registered for its type,
    /// synchronously on the calling task and in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::CallbackNotRegistered`] when the frame does
    /// not decode, and [`RouterError::MessageNotRegistered`] when the
    /// resolved type has no handlers.
    pub fn process_message(
        &self,
        client: &Arc<NetworkClient>,
        payload: &[u8],
    ) -> Result<(), RouterError> {
        let decoded = self
            .mapper
            .deserialize(payload)
            .map_err(RouterError::CallbackNotRegistered)?;

        let handlers = self.handlers.lock().unwrap().get(&decoded.type_id).cloned();
        let Some(handlers) = handlers else {
            return Err(RouterError::MessageNotRegistered(decoded.type_name));
        };

        for handler in &handlers {
            handler(client, decoded.value.as_ref());
        }
        Ok(())
    }

    /// Serialize a message through the router's mapper, entering `T` under
    /// its content-based id if not already present.
    ///
    /// # Errors
    ///
    /// Returns the underlying codec error.
    pub fn serialize<T>(&self, msg: &T) -> Result<Vec<u8>, RouterError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        if self.mapper.lookup_id(TypeId::of::<T>()) == UNREGISTERED {
            let _ = self.mapper.register::<T>(type_hash::<T>());
        }
        Ok(self.mapper.serialize(msg)?)
    }

    // ── Connection registry ─────────────────────────────────────────────

    /// Look up or create the [`NetworkClient`] for a connection.
    ///
    /// Idempotent: repeated calls for the same connection return the same
    /// client with the same stable id.
    pub fn client(&self, conn: &Connection) -> Arc<NetworkClient> {
        let mut clients = self.clients.lock().unwrap();
        if let Some(client) = clients.get(&conn.id()) {
            return Arc::clone(client);
        }
        let id = self.client_id(conn.id());
        let client = Arc::new(NetworkClient::new(id, conn.clone()));
        clients.insert(conn.id(), Arc::clone(&client));
        client
    }

    fn client_id(&self, conn_id: ConnectionId) -> ClientId {
        let mut ids = self.ids.lock().unwrap();
        ids.entry(conn_id).or_insert_with(generate_client_id).clone()
    }

    /// Snapshot of the currently connected peers.
    #[must_use]
    pub fn peers(&self) -> Vec<Arc<NetworkClient>> {
        self.clients.lock().unwrap().values().cloned().collect()
    }

    /// Serialize `msg` once and send the bytes to every current peer.
    ///
    /// # Errors
    ///
    /// Returns the serialization error, or the first failed send (remaining
    /// peers are skipped).
    pub fn broadcast<T>(&self, msg: &T) -> Result<(), RouterError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let payload = self.serialize(msg)?;
        for client in self.peers() {
            client.send_bytes(payload.clone())?;
        }
        Ok(())
    }

    // ── Transport glue ──────────────────────────────────────────────────

    /// Handle an incoming frame from a transport read loop.
    ///
    /// # Errors
    ///
    /// See [`Router::process_message`].
    pub fn handle_message(&self, conn: &Connection, payload: &[u8]) -> Result<(), RouterError> {
        let client = self.client(conn);
        self.process_message(&client, payload)
    }

    /// Fan a connect event out to every connect handler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle_connect(&self, conn: &Connection) {
        let client = self.client(conn);
        let handlers = self.connect_handlers.lock().unwrap().clone();
        for handler in handlers {
            let client = Arc::clone(&client);
            self.spawn_bounded(move || handler(client));
        }
    }

    /// Fan a disconnect event out to every disconnect handler, then drop the
    /// connection from the registry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle_disconnect(&self, conn: &Connection, err: Option<RouterError>) {
        let client = self.client(conn);
        let err = err.map(Arc::new);
        let handlers = self.disconnect_handlers.lock().unwrap().clone();
        for handler in handlers {
            let client = Arc::clone(&client);
            let err = err.clone();
            self.spawn_bounded(move || handler(client, err));
        }

        self.clients.lock().unwrap().remove(&conn.id());
        self.ids.lock().unwrap().remove(&conn.id());
    }

    /// Fan an error event out to every error handler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle_error(&self, conn: &Connection, err: RouterError) {
        let client = self.client(conn);
        let err = Arc::new(err);
        let handlers = self.error_handlers.lock().unwrap().clone();
        for handler in handlers {
            let client = Arc::clone(&client);
            let err = Arc::clone(&err);
            self.spawn_bounded(move || handler(client, err));
        }
    }

    fn spawn_bounded<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let semaphore = Arc::clone(&self.fanout);
        tokio::spawn(async move {
            if let Ok(_permit) = semaphore.acquire_owned().await {
                f();
            }
        });
    }

    // ── Reset ───────────────────────────────────────────────────────────

    /// Clear all handlers, connections, and message registrations. Test hook.
    pub fn reset(&self) {
        self.mapper.clear();
        self.handlers.lock().unwrap().clear();
        self.connect_handlers.lock().unwrap().clear();
        self.disconnect_handlers.lock().unwrap().clear();
        self.error_handlers.lock().unwrap().clear();
        self.clients.lock().unwrap().clear();
        self.ids.lock().unwrap().clear();
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
