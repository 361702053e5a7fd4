//! Entity handles and slot allocation.
//!
//! Snapshot application destroys and recreates entities constantly: any
//! entity the server stops mentioning is reaped, and its storage slot is
//! recycled for whatever the next snapshot materializes. A bare integer id
//! would let a handle cached before the reap silently alias the slot's new
//! occupant. Handles are therefore generational: a slot index paired with
//! the generation under which the handle was minted. Reusing a slot bumps
//! its generation, so stale handles fail liveness checks and component
//! lookups instead of reading another entity's data.
//!
//! Handles never travel on the wire; cross-process correlation is the sync
//! layer's `NetworkId`.

/// Handle to an entity: a storage slot plus the generation observed when
/// the handle was minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// The storage slot this handle points at.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// The slot generation this handle was minted under.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Slot allocator backing a [`World`](crate::World).
///
/// Freed slots are recycled under a bumped generation. Handles are only
/// minted by [`allocate`](Self::allocate), so a generation match is enough
/// to decide whether a handle still names its slot's current occupant.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a live entity, recycling a freed slot when one exists.
    pub fn allocate(&mut self) -> Entity {
        if let Some(index) = self.free.pop() {
            return Entity {
                index,
                generation: self.generations[index as usize],
            };
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        Entity {
            index,
            generation: 0,
        }
    }

    /// Retire a live entity, bumping its slot generation so the handle (and
    /// every copy of it) goes stale.
    ///
    /// Returns `false` if the handle was already stale.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        if !self.is_live(entity) {
            return false;
        }
        self.generations[entity.index as usize] += 1;
        self.free.push(entity.index);
        true
    }

    /// Returns `true` while the handle names its slot's current occupant.
    #[must_use]
    pub fn is_live(&self, entity: Entity) -> bool {
        self.generations.get(entity.index as usize) == Some(&entity.generation)
    }

    /// The handle for `index` under the slot's current generation.
    ///
    /// Whether the slot is occupied is the caller's bookkeeping; the
    /// allocator only tracks generations.
    #[must_use]
    pub fn handle_at(&self, index: u32) -> Option<Entity> {
        self.generations
            .get(index as usize)
            .map(|&generation| Entity { index, generation })
    }

    /// Number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.generations.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_distinct_live_handles() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_ne!(a, b);
        assert!(alloc.is_live(a));
        assert!(alloc.is_live(b));
        assert_eq!(alloc.live_count(), 2);
    }

    #[test]
    fn test_reaped_handle_goes_stale_when_slot_is_reused() {
        let mut alloc = EntityAllocator::new();
        let reaped = alloc.allocate();
        assert!(alloc.deallocate(reaped));

        // The next snapshot materializes a new entity into the same slot.
        let respawned = alloc.allocate();
        assert_eq!(respawned.index(), reaped.index());
        assert_eq!(respawned.generation(), reaped.generation() + 1);
        assert_ne!(reaped, respawned);
        assert!(!alloc.is_live(reaped));
        assert!(alloc.is_live(respawned));
    }

    #[test]
    fn test_deallocating_a_stale_handle_is_rejected() {
        let mut alloc = EntityAllocator::new();
        let entity = alloc.allocate();
        assert!(alloc.deallocate(entity));
        assert!(!alloc.deallocate(entity));

        // A stale handle must not retire the slot's new occupant either.
        let respawned = alloc.allocate();
        assert!(!alloc.deallocate(entity));
        assert!(alloc.is_live(respawned));
    }

    #[test]
    fn test_handle_at_tracks_current_generation() {
        let mut alloc = EntityAllocator::new();
        let first = alloc.allocate();
        assert_eq!(alloc.handle_at(first.index()), Some(first));

        alloc.deallocate(first);
        let second = alloc.allocate();
        assert_eq!(alloc.handle_at(first.index()), Some(second));
        assert_eq!(alloc.handle_at(99), None);
    }

    #[test]
    fn test_live_count_survives_reuse_churn() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let _b = alloc.allocate();
        alloc.deallocate(a);
        assert_eq!(alloc.live_count(), 1);
        let _c = alloc.allocate();
        assert_eq!(alloc.live_count(), 2);
    }
}
