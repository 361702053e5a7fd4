//! Shared component registries and world lookup helpers.
//!
//! Both sides of a connection register their synced component types here,
//! with identical ids. The mapper and the interpolation registry are
//! process-wide, like the router: one world synchronizes per process.

use std::any::TypeId;
use std::sync::LazyLock;

use serde::Serialize;
use serde::de::DeserializeOwned;

use entsync_codec::{CodecError, ComponentId, InterpId, InterpRegistry, TypeMapper};
use entsync_ecs::{Component, Entity, World};

use crate::snapshot::{InterpData, NetworkId};

/// Reserved component id for [`NetworkId`].
pub const NETWORK_ID_COMPONENT: ComponentId = ComponentId(1);

/// Reserved component id for [`InterpData`].
pub const INTERP_DATA_COMPONENT: ComponentId = ComponentId(2);

/// The shared component mapper, pre-seeded with the reserved registrations.
pub static MAPPER: LazyLock<TypeMapper> = LazyLock::new(|| {
    let mapper = TypeMapper::new();
    mapper
        .register::<NetworkId>(NETWORK_ID_COMPONENT)
        .expect("reserved registration on a fresh mapper");
    mapper
        .register::<InterpData>(INTERP_DATA_COMPONENT)
        .expect("reserved registration on a fresh mapper");
    mapper
});

/// The shared interpolation registry.
pub static INTERP: LazyLock<InterpRegistry> = LazyLock::new(InterpRegistry::new);

/// Register a component type for synchronization under a stable id.
///
/// Server and client must register the same types with the same ids. Ids 1
/// and 2 are reserved for [`NetworkId`] and [`InterpData`].
///
/// # Errors
///
/// Fails when the id or the type is already bound (including attempts to
/// reuse the reserved ids).
pub fn register_component<T>(id: ComponentId) -> Result<(), CodecError>
where
    T: Component + Serialize + DeserializeOwned,
{
    MAPPER.register::<T>(id)
}

/// Register a component type for client-side interpolation.
///
/// `id` lives in its own namespace, independent of the component id; the
/// component must additionally be registered via [`register_component`] to
/// travel in snapshots. The lerp receives `(from, to, t)` and returns the
/// blended value.
///
/// # Errors
///
/// Fails when the interpolation id or the type is already bound, or for the
/// reserved id 0.
pub fn register_interpolated<T, F>(id: InterpId, lerp: F) -> Result<(), CodecError>
where
    T: Component + Clone + Default,
    F: Fn(&T, &T, f64) -> T + Send + Sync + 'static,
{
    INTERP.register::<T, F>(id, lerp)
}

/// Every entity carrying a [`NetworkId`], in world iteration order.
#[must_use]
pub fn network_entities(world: &World) -> Vec<Entity> {
    world.query(&[TypeId::of::<NetworkId>()])
}

/// Find the local entity with the given network id.
#[must_use]
pub fn find_by_network_id(world: &World, id: NetworkId) -> Option<Entity> {
    network_entities(world)
        .into_iter()
        .find(|&entity| world.get::<NetworkId>(entity) == Some(&id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Unregisterable(u8);
    impl Component for Unregisterable {}

    #[test]
    fn test_reserved_ids_cannot_be_reused() {
        let err = register_component::<Unregisterable>(NETWORK_ID_COMPONENT).unwrap_err();
        assert!(matches!(err, CodecError::ComponentIdInUse { .. }));
        let err = register_component::<Unregisterable>(INTERP_DATA_COMPONENT).unwrap_err();
        assert!(matches!(err, CodecError::ComponentIdInUse { .. }));
    }

    #[test]
    fn test_find_by_network_id() {
        let mut world = World::new();
        let a = world.spawn();
        world.insert(a, NetworkId(4)).unwrap();
        let b = world.spawn();
        world.insert(b, NetworkId(9)).unwrap();

        assert_eq!(find_by_network_id(&world, NetworkId(9)), Some(b));
        assert_eq!(find_by_network_id(&world, NetworkId(4)), Some(a));
        assert_eq!(find_by_network_id(&world, NetworkId(5)), None);
        assert_eq!(network_entities(&world), vec![a, b]);
    }
}
