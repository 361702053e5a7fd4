//! World — runtime entity-component storage.
//!
//! Components are stored per entity slot, keyed by [`TypeId`]. Both typed
//! accessors ([`World::insert`], [`World::get`]) and type-erased accessors
//! ([`World::insert_boxed`], [`World::get_boxed`]) are provided; the erased
//! forms exist for callers that address components by `TypeId` at runtime,
//! such as a decoder materializing values from the network.
//!
//! Every access validates the handle's generation, so handles that survived
//! a despawn cannot read or write the entity that reused their slot.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use thiserror::Error;

use crate::component::{BoxedComponent, Component};
use crate::entity::{Entity, EntityAllocator};

/// Errors that can occur during world operations.
#[derive(Debug, Error)]
pub enum WorldError {
    /// The entity is not alive (never spawned, despawned, or a stale handle
    /// to a reused slot).
    #[error("entity {0} not found")]
    EntityNotFound(Entity),
}

/// A single entity's component set.
#[derive(Default)]
struct EntityRecord {
    components: HashMap<TypeId, BoxedComponent>,
}

/// Entity storage with typed and type-erased component access.
///
/// Entities are iterated in slot order, so query results are deterministic
/// for a given sequence of operations.
#[derive(Default)]
pub struct World {
    allocator: EntityAllocator,
    records: Vec<Option<EntityRecord>>,
}

impl World {
    /// Create a new empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Entity lifecycle ────────────────────────────────────────────────

    /// Spawn a new entity with no components.
    pub fn spawn(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        let index = entity.index() as usize;
        if index >= self.records.len() {
            self.records.resize_with(index + 1, || None);
        }
        self.records[index] = Some(EntityRecord::default());
        entity
    }

    /// Destroy an entity and drop all of its components. The slot is
    /// recycled for later spawns; this handle stays stale forever.
    ///
    /// Returns `true` if the entity was alive.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.allocator.deallocate(entity) {
            return false;
        }
        self.records[entity.index() as usize] = None;
        true
    }

    /// Returns `true` if the entity is currently alive in this world.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.record(entity).is_some()
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.allocator.live_count()
    }

    // ── Typed component access ──────────────────────────────────────────

    /// Attach a component to an entity, replacing any existing value of the
    /// same type.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), WorldError> {
        self.insert_boxed(entity, Box::new(value))
    }

    /// Returns `true` if the entity carries a component of type `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.has_type(entity, TypeId::of::<T>())
    }

    /// Get a reference to the entity's component of type `T`.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.get_boxed(entity, TypeId::of::<T>())?.downcast_ref()
    }

    /// Get a mutable reference to the entity's component of type `T`.
    #[must_use]
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.record_mut(entity)?
            .components
            .get_mut(&TypeId::of::<T>())?
            .downcast_mut()
    }

    /// Remove and return the entity's component of type `T`.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        let boxed = self
            .record_mut(entity)?
            .components
            .remove(&TypeId::of::<T>())?;
        boxed.downcast().map(|b| *b).ok()
    }

    // ── Type-erased component access ────────────────────────────────────

    /// Attach an already-boxed component, keyed by the value's runtime type.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn insert_boxed(&mut self, entity: Entity, value: BoxedComponent) -> Result<(), WorldError> {
        let record = self
            .record_mut(entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        record.components.insert((*value).type_id(), value);
        Ok(())
    }

    /// Returns `true` if the entity carries a component with the given type id.
    #[must_use]
    pub fn has_type(&self, entity: Entity, type_id: TypeId) -> bool {
        self.record(entity)
            .is_some_and(|r| r.components.contains_key(&type_id))
    }

    /// Get a type-erased reference to the entity's component with the given
    /// type id.
    #[must_use]
    pub fn get_boxed(&self, entity: Entity, type_id: TypeId) -> Option<&(dyn Any + Send + Sync)> {
        self.record(entity)?
            .components
            .get(&type_id)
            .map(|boxed| boxed.as_ref())
    }

    /// Returns the type ids of every component attached to the entity.
    ///
    /// The order is unspecified.
    #[must_use]
    pub fn component_types(&self, entity: Entity) -> Vec<TypeId> {
        self.record(entity)
            .map(|r| r.components.keys().copied().collect())
            .unwrap_or_default()
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Returns every entity carrying all of the given component types, in
    /// slot order.
    #[must_use]
    pub fn query(&self, required: &[TypeId]) -> Vec<Entity> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let record = slot.as_ref()?;
                if !required.iter().all(|ty| record.components.contains_key(ty)) {
                    return None;
                }
                self.allocator.handle_at(index as u32)
            })
            .collect()
    }

    fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        if !self.allocator.is_live(entity) {
            return None;
        }
        self.records.get(entity.index() as usize)?.as_ref()
    }

    fn record_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        if !self.allocator.is_live(entity) {
            return None;
        }
        self.records.get_mut(entity.index() as usize)?.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Health {
        current: f32,
        max: f32,
    }
    impl Component for Health {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }
    impl Component for Velocity {}

    #[test]
    fn test_spawn_and_contains() {
        let mut world = World::new();
        let e = world.spawn();
        assert!(world.contains(e));
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_insert_and_get() {
        let mut world = World::new();
        let e = world.spawn();
        world
            .insert(
                e,
                Health {
                    current: 80.0,
                    max: 100.0,
                },
            )
            .unwrap();
        assert!(world.has::<Health>(e));
        let health = world.get::<Health>(e).unwrap();
        assert_eq!(health.current, 80.0);
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert(e, Velocity { x: 1.0, y: 0.0 }).unwrap();
        world.insert(e, Velocity { x: 2.0, y: 3.0 }).unwrap();
        assert_eq!(
            world.get::<Velocity>(e),
            Some(&Velocity { x: 2.0, y: 3.0 })
        );
    }

    #[test]
    fn test_insert_on_dead_entity_fails() {
        let mut world = World::new();
        let e = world.spawn();
        world.despawn(e);
        let err = world.insert(e, Velocity { x: 0.0, y: 0.0 }).unwrap_err();
        assert!(matches!(err, WorldError::EntityNotFound(_)));
    }

    #[test]
    fn test_despawn_drops_components() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert(e, Velocity { x: 1.0, y: 1.0 }).unwrap();
        assert!(world.despawn(e));
        assert!(!world.contains(e));
        assert!(world.get::<Velocity>(e).is_none());
        assert!(!world.despawn(e));
    }

    #[test]
    fn test_stale_handle_cannot_touch_slot_reuser() {
        let mut world = World::new();
        let reaped = world.spawn();
        world.insert(reaped, Velocity { x: 1.0, y: 0.0 }).unwrap();
        world.despawn(reaped);

        // A later spawn reuses the slot.
        let respawned = world.spawn();
        world
            .insert(
                respawned,
                Health {
                    current: 9.0,
                    max: 9.0,
                },
            )
            .unwrap();
        assert_eq!(respawned.index(), reaped.index());
        assert_ne!(reaped, respawned);

        // The stale handle sees nothing and mutates nothing.
        assert!(!world.contains(reaped));
        assert!(world.get::<Health>(reaped).is_none());
        assert!(world.insert(reaped, Velocity { x: 5.0, y: 5.0 }).is_err());
        assert!(!world.despawn(reaped));
        assert!(world.contains(respawned));
        assert!(!world.has::<Velocity>(respawned));
    }

    #[test]
    fn test_boxed_roundtrip() {
        let mut world = World::new();
        let e = world.spawn();
        world
            .insert_boxed(e, Box::new(Velocity { x: 4.0, y: 5.0 }))
            .unwrap();
        let erased = world.get_boxed(e, TypeId::of::<Velocity>()).unwrap();
        assert_eq!(
            erased.downcast_ref::<Velocity>(),
            Some(&Velocity { x: 4.0, y: 5.0 })
        );
    }

    #[test]
    fn test_query_matches_required_types() {
        let mut world = World::new();
        let a = world.spawn();
        world.insert(a, Velocity { x: 0.0, y: 0.0 }).unwrap();
        world
            .insert(
                a,
                Health {
                    current: 1.0,
                    max: 1.0,
                },
            )
            .unwrap();
        let b = world.spawn();
        world.insert(b, Velocity { x: 0.0, y: 0.0 }).unwrap();

        let both = world.query(&[TypeId::of::<Velocity>(), TypeId::of::<Health>()]);
        assert_eq!(both, vec![a]);

        let velocity_only = world.query(&[TypeId::of::<Velocity>()]);
        assert_eq!(velocity_only, vec![a, b]);
    }

    #[test]
    fn test_query_returns_current_generation_handles() {
        let mut world = World::new();
        let reaped = world.spawn();
        world.insert(reaped, Velocity { x: 0.0, y: 0.0 }).unwrap();
        world.despawn(reaped);
        let respawned = world.spawn();
        world.insert(respawned, Velocity { x: 0.0, y: 0.0 }).unwrap();

        let matches = world.query(&[TypeId::of::<Velocity>()]);
        assert_eq!(matches, vec![respawned]);
    }

    #[test]
    fn test_query_is_in_slot_order() {
        let mut world = World::new();
        let mut spawned = Vec::new();
        for _ in 0..5 {
            let e = world.spawn();
            world.insert(e, Velocity { x: 0.0, y: 0.0 }).unwrap();
            spawned.push(e);
        }
        assert_eq!(world.query(&[TypeId::of::<Velocity>()]), spawned);
    }

    #[test]
    fn test_component_types_lists_attached() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert(e, Velocity { x: 0.0, y: 0.0 }).unwrap();
        let types = world.component_types(e);
        assert_eq!(types, vec![TypeId::of::<Velocity>()]);
    }
}
