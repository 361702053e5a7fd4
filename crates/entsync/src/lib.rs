//! # entsync
//!
//! Server-authoritative entity synchronization with client-side
//! interpolation.
//!
//! A server marks ECS entities for sync and calls [`do_sync`] from its game
//! loop; every connected peer receives a full [`WorldSnapshot`] of the
//! entities visible to it. Clients install [`register_client`] to mirror the
//! snapshot stream into a local world, and run the system returned by
//! [`new_interpolate_system`] each tick to smooth components registered with
//! [`register_interpolated`].
//!
//! Component types travel as self-delimiting MessagePack envelopes keyed by
//! stable ids; see [`register_component`]. Ids 1 and 2 are reserved for
//! [`NetworkId`] and [`InterpData`].
//!
//! The module split mirrors the three roles:
//!
//! - [`server`] — sync marking, per-peer snapshot building, broadcast.
//! - [`client`] — snapshot application, reaping, interpolation history.
//! - [`interpolate`] — delay estimation and the per-tick blend system.

pub mod client;
pub mod error;
pub mod interpolate;
pub mod registry;
pub mod server;
pub mod snapshot;

pub use client::{InterpHistory, MAX_HISTORY_SIZE, register_client};
pub use error::SyncError;
pub use interpolate::new_interpolate_system;
pub use registry::{
    INTERP_DATA_COMPONENT, NETWORK_ID_COMPONENT, find_by_network_id, network_entities,
    register_component, register_interpolated,
};
pub use server::{
    NetworkFilter, SharedWorld, SyncSpec, add_network_filter, do_sync, network_sync,
    use_sync_world,
};
pub use snapshot::{EntityState, InterpData, NetworkId, SerializedEntity, WorldSnapshot};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard};

    use entsync_codec::{ComponentId, InterpId};
    use entsync_ecs::Component;

    use crate::registry::{register_component, register_interpolated};

    /// Serializes tests that touch the process-wide registries and server
    /// state.
    static GUARD: Mutex<()> = Mutex::new(());

    pub(crate) fn serial_guard() -> MutexGuard<'static, ()> {
        GUARD.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    pub(crate) struct TestPos {
        pub x: f64,
        pub y: f64,
    }
    impl Component for TestPos {}

    #[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    pub(crate) struct TestHealth {
        pub current: u8,
        pub max: u8,
    }
    impl Component for TestHealth {}

    pub(crate) const TEST_POS_INTERP: InterpId = InterpId(1);

    /// Register the test components. Idempotent: re-registering the same
    /// pairs is a no-op.
    pub(crate) fn register_test_components() {
        register_component::<TestPos>(ComponentId(1001)).expect("consistent test registration");
        register_component::<TestHealth>(ComponentId(1002)).expect("consistent test registration");
        register_interpolated::<TestPos, _>(TEST_POS_INTERP, |from, to, t| TestPos {
            x: from.x + (to.x - from.x) * t,
            y: from.y + (to.y - from.y) * t,
        })
        .expect("consistent test registration");
    }
}
