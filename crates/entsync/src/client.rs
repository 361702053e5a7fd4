//! Client-side synchronization: snapshot application and entity reaping.
//!
//! [`register_client`] installs the [`WorldSnapshot`] handler. Each snapshot
//! materializes unknown entities, overwrites plain component values, appends
//! interpolated values to per-component history buffers, and destroys local
//! entities the snapshot no longer mentions.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use tracing::warn;

use entsync_codec::{Decoded, InterpId, UNREGISTERED_INTERP};
use entsync_ecs::{Component, World};

use crate::error::SyncError;
use crate::interpolate;
use crate::registry::{INTERP, MAPPER, find_by_network_id, network_entities};
use crate::server::SharedWorld;
use crate::snapshot::{InterpData, NetworkId, WorldSnapshot};

/// Upper bound on samples kept per interpolated component.
pub const MAX_HISTORY_SIZE: usize = 32;

/// One received value with its receive time from the steady clock.
pub(crate) struct TimedSample {
    pub(crate) value: Box<dyn Any + Send + Sync>,
    pub(crate) ts: Instant,
}

/// Time-indexed value history for an entity's interpolated components.
///
/// Written only by snapshot application; read by the interpolation system.
/// Timestamps within a buffer are non-decreasing because they are receive
/// times, and buffers never exceed [`MAX_HISTORY_SIZE`].
#[derive(Default)]
pub struct InterpHistory {
    pub(crate) buffers: HashMap<InterpId, VecDeque<TimedSample>>,
}

impl Component for InterpHistory {}

impl InterpHistory {
    fn push(&mut self, key: InterpId, value: Box<dyn Any + Send + Sync>, ts: Instant) {
        let buffer = self.buffers.entry(key).or_default();
        buffer.push_back(TimedSample { value, ts });
        if buffer.len() > MAX_HISTORY_SIZE {
            buffer.pop_front();
        }
    }
}

/// Install the snapshot handler that keeps `world` mirroring the server.
///
/// The handler runs synchronously on the transport read task, so snapshots
/// apply in arrival order.
pub fn register_client(world: SharedWorld) {
    entsync_router::on::<WorldSnapshot, _>(move |_sender, snapshot| {
        let mut world = world.lock().unwrap();
        let now = Instant::now();
        interpolate::record_snapshot(now);
        if let Err(err) = apply_snapshot(&mut world, snapshot, now) {
            warn!(%err, "failed to apply world snapshot");
        }
        reap_missing(&mut world, snapshot);
    });
}

/// Apply one snapshot: create or update every mentioned entity.
///
/// Individual component decode failures are logged and skipped; they never
/// abort the rest of the snapshot.
pub(crate) fn apply_snapshot(
    world: &mut World,
    snapshot: &WorldSnapshot,
    now: Instant,
) -> Result<(), SyncError> {
    for serialized in snapshot.iter() {
        let mut decoded: Vec<Decoded> = Vec::with_capacity(serialized.state.len());
        for (component_id, bytes) in &serialized.state {
            match MAPPER.deserialize(bytes) {
                Ok(value) => decoded.push(value),
                Err(err) => {
                    warn!(component = %component_id, %err, "skipping component: decode failed");
                }
            }
        }
        // Identity and interpolation metadata first, so the interpolation
        // check below sees this frame's InterpData on newly created entities.
        decoded.sort_by_key(|d| match d.type_id {
            t if t == TypeId::of::<InterpData>() => 0,
            t if t == TypeId::of::<NetworkId>() => 1,
            _ => 2,
        });

        let entity = match find_by_network_id(world, serialized.id) {
            Some(entity) if world.contains(entity) => entity,
            _ => world.spawn(),
        };

        for value in decoded {
            apply_component(world, entity, value, now)?;
        }
    }
    Ok(())
}

fn apply_component(
    world: &mut World,
    entity: entsync_ecs::Entity,
    decoded: Decoded,
    now: Instant,
) -> Result<(), SyncError> {
    let key = INTERP.lookup_id(decoded.type_id);
    if key == UNREGISTERED_INTERP || !world.has::<InterpData>(entity) {
        world.insert_boxed(entity, decoded.value)?;
        return Ok(());
    }

    // Interpolated path: seed the component slot on first sight, then record
    // the sample; the interpolation system produces the visible value.
    if !world.has_type(entity, decoded.type_id)
        && let Some(default) = INTERP.new_default(key)
    {
        world.insert_boxed(entity, default)?;
    }
    if !world.has::<InterpHistory>(entity) {
        world.insert(entity, InterpHistory::default())?;
    }
    if let Some(history) = world.get_mut::<InterpHistory>(entity) {
        history.push(key, decoded.value, now);
    }
    Ok(())
}

/// Destroy every local network entity the snapshot no longer mentions.
pub(crate) fn reap_missing(world: &mut World, snapshot: &WorldSnapshot) {
    let present: HashSet<NetworkId> = snapshot.iter().map(|e| e.id).collect();
    for entity in network_entities(world) {
        let Some(&id) = world.get::<NetworkId>(entity) else {
            continue;
        };
        if !present.contains(&id) {
            world.despawn(entity);
        }
    }
}
