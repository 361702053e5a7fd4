//! Server-side synchronization: sync marking, snapshot building, broadcast.
//!
//! The server owns the authoritative world. Entities become visible to peers
//! by being marked with [`network_sync`]; each call assigns a fresh
//! [`NetworkId`] and records which components to serialize. [`do_sync`],
//! called from the game loop, builds one snapshot per peer (applying any
//! registered visibility filters) and sends them concurrently.

use std::any::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock};

use dashmap::DashMap;
use tokio::task::JoinSet;
use tracing::warn;

use entsync_codec::UNREGISTERED_INTERP;
use entsync_ecs::{Component, Entity, World};
use entsync_router::NetworkClient;

use crate::error::SyncError;
use crate::registry::{INTERP, MAPPER};
use crate::snapshot::{EntityState, InterpData, NetworkId, SerializedEntity, WorldSnapshot};

/// A world shared between the game loop and the sync layer.
pub type SharedWorld = Arc<Mutex<World>>;

/// Per-peer visibility predicate. Filters apply conjunctively; an entity is
/// included in a peer's snapshot only if every filter accepts it.
pub type NetworkFilter = Arc<dyn Fn(&Arc<NetworkClient>, Entity, &World) -> bool + Send + Sync>;

static NETWORK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

struct ServerState {
    sync_entities: DashMap<Entity, Vec<TypeId>>,
    filters: RwLock<Vec<NetworkFilter>>,
    world: RwLock<Option<SharedWorld>>,
}

static STATE: LazyLock<ServerState> = LazyLock::new(|| ServerState {
    sync_entities: DashMap::new(),
    filters: RwLock::new(Vec::new()),
    world: RwLock::new(None),
});

/// Serializes whole `do_sync` calls; snapshots are never built concurrently.
static SYNC_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Install the world instance to synchronize from.
pub fn use_sync_world(world: SharedWorld) {
    *STATE.world.write().unwrap() = Some(world);
}

/// Append a per-peer visibility filter. Returning `false` excludes the
/// entity from that peer's snapshots.
pub fn add_network_filter<F>(filter: F)
where
    F: Fn(&Arc<NetworkClient>, Entity, &World) -> bool + Send + Sync + 'static,
{
    STATE.filters.write().unwrap().push(Arc::new(filter));
}

#[derive(Clone, Copy)]
struct SpecEntry {
    type_id: TypeId,
    type_name: &'static str,
    interpolated: bool,
}

/// Declares which of an entity's components to synchronize.
///
/// ```rust,ignore
/// let spec = SyncSpec::new()
///     .component::<Health>()
///     .interpolated::<Position>();
/// let network_id = network_sync(&mut world, entity, spec)?;
/// ```
#[derive(Default)]
pub struct SyncSpec {
    entries: Vec<SpecEntry>,
}

impl SyncSpec {
    /// Create an empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronize the entity's `T` component by overwriting it on clients.
    #[must_use]
    pub fn component<T: Component>(mut self) -> Self {
        self.entries.push(SpecEntry {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            interpolated: false,
        });
        self
    }

    /// Synchronize the entity's `T` component with client-side interpolation.
    ///
    /// `T` must have been registered with
    /// [`register_interpolated`](crate::register_interpolated).
    #[must_use]
    pub fn interpolated<T: Component>(mut self) -> Self {
        self.entries.push(SpecEntry {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            interpolated: true,
        });
        self
    }

    /// Mark `entity` for synchronization.
    ///
    /// Assigns and installs a fresh [`NetworkId`] (ids are consumed even when
    /// validation fails afterwards), validates that every listed component is
    /// attached, installs [`InterpData`] when interpolated components are
    /// listed, and records the sync set.
    ///
    /// # Errors
    ///
    /// Fails when the entity is dead, a listed component is missing, or an
    /// interpolated component has no interpolation registration.
    pub fn apply(self, world: &mut World, entity: Entity) -> Result<NetworkId, SyncError> {
        let network_id = NetworkId(NETWORK_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1);

        if !world.contains(entity) {
            return Err(SyncError::EntityNotAlive(entity));
        }
        world.insert(entity, network_id)?;

        let mut synced = Vec::with_capacity(self.entries.len() + 2);
        let mut interp_ids = Vec::new();
        for entry in &self.entries {
            if !world.has_type(entity, entry.type_id) {
                return Err(SyncError::MissingComponent(entity, entry.type_name));
            }
            if entry.interpolated {
                let id = INTERP.lookup_id(entry.type_id);
                if id == UNREGISTERED_INTERP {
                    return Err(SyncError::NotInterpolated(entry.type_name));
                }
                interp_ids.push(id);
            }
            synced.push(entry.type_id);
        }

        if !interp_ids.is_empty() {
            world.insert(entity, InterpData::new(interp_ids))?;
            synced.push(TypeId::of::<InterpData>());
        }
        synced.push(TypeId::of::<NetworkId>());

        STATE.sync_entities.insert(entity, synced);
        Ok(network_id)
    }
}

/// Mark an entity for synchronization. See [`SyncSpec::apply`].
///
/// # Errors
///
/// See [`SyncSpec::apply`].
pub fn network_sync(
    world: &mut World,
    entity: Entity,
    spec: SyncSpec,
) -> Result<NetworkId, SyncError> {
    spec.apply(world, entity)
}

/// Build world snapshots and send one to every connected peer.
///
/// Safe to call periodically from a single game-loop task; whole calls are
/// serialized by an internal lock. Sends fan out concurrently and the call
/// waits for all of them, returning the first failure.
///
/// # Errors
///
/// Fails when no world is installed, or with the first failed send.
pub async fn do_sync() -> Result<(), SyncError> {
    let _guard = SYNC_LOCK.lock().await;

    let world = STATE
        .world
        .read()
        .unwrap()
        .clone()
        .ok_or(SyncError::WorldNotSet)?;

    let mut sends = JoinSet::new();
    {
        let world = world.lock().unwrap();
        for client in entsync_router::global().peers() {
            let snapshot = build_snapshot(&client, &world);
            sends.spawn(async move { client.send_message(&snapshot) });
        }
    }

    let mut first_err = None;
    while let Some(result) = sends.join_next().await {
        let send_result = match result {
            Ok(send_result) => send_result,
            Err(join_err) => {
                if first_err.is_none() {
                    first_err = Some(SyncError::SendTask(join_err.to_string()));
                }
                continue;
            }
        };
        if let Err(err) = send_result
            && first_err.is_none()
        {
            first_err = Some(err.into());
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Build the snapshot one peer should receive.
pub(crate) fn build_snapshot(client: &Arc<NetworkClient>, world: &World) -> WorldSnapshot {
    let filters = STATE.filters.read().unwrap();
    let mut entities = Vec::new();

    for entity in crate::registry::network_entities(world) {
        if filters.iter().any(|filter| !filter(client, entity, world)) {
            continue;
        }
        let Some(&network_id) = world.get::<NetworkId>(entity) else {
            continue;
        };
        let state = match build_entity_state(world, entity) {
            Ok(state) => state,
            Err(err) => {
                warn!(%entity, %err, "entity omitted from snapshot: serialization failed");
                continue;
            }
        };
        entities.push(SerializedEntity {
            id: network_id,
            state,
        });
    }

    WorldSnapshot(entities)
}

/// Serialize the components in the entity's sync set.
///
/// Zero-sized (tag) components are skipped; any other serialization failure
/// fails the whole entity.
fn build_entity_state(world: &World, entity: Entity) -> Result<EntityState, SyncError> {
    let synced = STATE
        .sync_entities
        .get(&entity)
        .map(|entry| entry.value().clone())
        .unwrap_or_default();

    let mut state = EntityState::new();
    for type_id in world.component_types(entity) {
        if !synced.contains(&type_id) {
            continue;
        }
        if MAPPER.is_zero_sized(type_id) {
            continue;
        }
        let Some(value) = world.get_boxed(entity, type_id) else {
            continue;
        };
        let bytes = MAPPER.serialize_any(type_id, value)?;
        state.insert(MAPPER.lookup_id(type_id), bytes);
    }
    Ok(state)
}

#[cfg(test)]
pub(crate) fn reset_server_state() {
    STATE.sync_entities.clear();
    STATE.filters.write().unwrap().clear();
    *STATE.world.write().unwrap() = None;
    NETWORK_ID_COUNTER.store(0, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use entsync_codec::{ComponentId, TypeMapper, type_hash};
    use entsync_router::Connection;

    use super::*;
    use crate::test_support::{TestHealth, TestPos, register_test_components, serial_guard};

    fn decode_snapshot(payload: &[u8]) -> WorldSnapshot {
        let mapper = TypeMapper::new();
        mapper
            .register::<WorldSnapshot>(type_hash::<WorldSnapshot>())
            .unwrap();
        let decoded = mapper.deserialize(payload).unwrap();
        decoded.value.downcast_ref::<WorldSnapshot>().unwrap().clone()
    }

    #[test]
    fn test_network_sync_assigns_sequential_ids() {
        let _guard = serial_guard();
        reset_server_state();
        register_test_components();

        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        world.insert(a, TestHealth { current: 1, max: 2 }).unwrap();
        world.insert(b, TestHealth { current: 3, max: 4 }).unwrap();

        let first = network_sync(&mut world, a, SyncSpec::new().component::<TestHealth>()).unwrap();
        let second = network_sync(&mut world, b, SyncSpec::new().component::<TestHealth>()).unwrap();

        assert_eq!(first, NetworkId(1));
        assert_eq!(second, NetworkId(2));
        assert_eq!(world.get::<NetworkId>(a), Some(&NetworkId(1)));
        assert_eq!(world.get::<NetworkId>(b), Some(&NetworkId(2)));
    }

    #[test]
    fn test_network_sync_requires_listed_components() {
        let _guard = serial_guard();
        reset_server_state();
        register_test_components();

        let mut world = World::new();
        let entity = world.spawn();
        let err =
            network_sync(&mut world, entity, SyncSpec::new().component::<TestHealth>()).unwrap_err();
        assert!(matches!(err, SyncError::MissingComponent(_, _)));
        // The id was consumed and the component installed regardless.
        assert!(world.has::<NetworkId>(entity));
    }

    #[test]
    fn test_network_sync_interpolated_installs_interp_data() {
        let _guard = serial_guard();
        reset_server_state();
        register_test_components();

        let mut world = World::new();
        let entity = world.spawn();
        world.insert(entity, TestPos { x: 0.0, y: 0.0 }).unwrap();

        network_sync(&mut world, entity, SyncSpec::new().interpolated::<TestPos>()).unwrap();
        let interp = world.get::<InterpData>(entity).unwrap();
        assert_eq!(interp.component_keys().len(), 1);
    }

    #[test]
    fn test_network_sync_rejects_uninterpolated_component() {
        let _guard = serial_guard();
        reset_server_state();
        register_test_components();

        let mut world = World::new();
        let entity = world.spawn();
        world.insert(entity, TestHealth { current: 1, max: 1 }).unwrap();

        let err = network_sync(
            &mut world,
            entity,
            SyncSpec::new().interpolated::<TestHealth>(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::NotInterpolated(_)));
    }

    #[test]
    fn test_snapshot_contains_only_synced_components() {
        let _guard = serial_guard();
        reset_server_state();
        register_test_components();

        let mut world = World::new();
        let entity = world.spawn();
        world.insert(entity, TestPos { x: 1.0, y: 2.0 }).unwrap();
        world.insert(entity, TestHealth { current: 5, max: 9 }).unwrap();
        // Health stays local: only the position is listed.
        let nid = network_sync(&mut world, entity, SyncSpec::new().component::<TestPos>()).unwrap();

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let client = entsync_router::global().client(&Connection::new(tx));
        let snapshot = build_snapshot(&client, &world);

        assert_eq!(snapshot.len(), 1);
        let entry = &snapshot.0[0];
        assert_eq!(entry.id, nid);
        let mut ids: Vec<ComponentId> = entry.state.keys().copied().collect();
        ids.sort();
        assert_eq!(
            ids,
            vec![crate::registry::NETWORK_ID_COMPONENT, ComponentId(1001)]
        );
    }

    #[test]
    fn test_filters_exclude_entities_per_peer() {
        let _guard = serial_guard();
        reset_server_state();
        register_test_components();
        entsync_router::reset();

        let mut world = World::new();
        let entity = world.spawn();
        world.insert(entity, TestHealth { current: 1, max: 1 }).unwrap();
        network_sync(&mut world, entity, SyncSpec::new().component::<TestHealth>()).unwrap();

        let (tx_a, _rx_a) = tokio::sync::mpsc::unbounded_channel();
        let (tx_b, _rx_b) = tokio::sync::mpsc::unbounded_channel();
        let blocked = entsync_router::global().client(&Connection::new(tx_a));
        let allowed = entsync_router::global().client(&Connection::new(tx_b));

        let blocked_id = blocked.id().to_string();
        add_network_filter(move |client, _entity, _world| client.id() != blocked_id);

        assert!(build_snapshot(&blocked, &world).is_empty());
        assert_eq!(build_snapshot(&allowed, &world).len(), 1);
    }

    #[tokio::test]
    async fn test_do_sync_sends_snapshot_to_every_peer() {
        let _guard = serial_guard();
        reset_server_state();
        register_test_components();
        entsync_router::reset();

        let mut world = World::new();
        let entity = world.spawn();
        world.insert(entity, TestPos { x: 4.0, y: 2.0 }).unwrap();
        world.insert(entity, TestHealth { current: 7, max: 7 }).unwrap();
        let nid = network_sync(
            &mut world,
            entity,
            SyncSpec::new().component::<TestPos>().component::<TestHealth>(),
        )
        .unwrap();

        use_sync_world(Arc::new(Mutex::new(world)));

        let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
        entsync_router::global().client(&Connection::new(tx_a));
        entsync_router::global().client(&Connection::new(tx_b));

        do_sync().await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let payload = rx.try_recv().unwrap();
            let snapshot = decode_snapshot(&payload);
            assert_eq!(snapshot.len(), 1);
            let entry = &snapshot.0[0];
            assert_eq!(entry.id, nid);
            let mut ids: Vec<ComponentId> = entry.state.keys().copied().collect();
            ids.sort();
            assert_eq!(
                ids,
                vec![
                    crate::registry::NETWORK_ID_COMPONENT,
                    ComponentId(1001),
                    ComponentId(1002)
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_do_sync_without_world_fails() {
        let _guard = serial_guard();
        reset_server_state();
        assert!(matches!(do_sync().await, Err(SyncError::WorldNotSet)));
    }
}
