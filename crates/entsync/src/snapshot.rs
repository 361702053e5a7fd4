//! Wire model: network identity and world snapshots.

use std::collections::HashMap;

use serde::de::{self, Deserialize, Deserializer, SeqAccess, Visitor};
use serde::{Serialize, Serializer};

use entsync_codec::{ComponentId, InterpId};
use entsync_ecs::Component;

/// Server-assigned identifier correlating one entity across the wire.
///
/// Monotonically increasing, unique per entity for the lifetime of the
/// server process, never reused. 0 is never assigned.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize,
)]
pub struct NetworkId(pub u64);

impl Component for NetworkId {}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized component state of one entity: complete wire envelopes keyed
/// by component id. Each value is self-contained, so unknown ids can be
/// skipped without desynchronizing the decoder.
pub type EntityState = HashMap<ComponentId, Vec<u8>>;

/// One entity as it travels in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct SerializedEntity {
    /// The entity's network identity.
    pub id: NetworkId,
    /// Serialized component envelopes.
    pub state: EntityState,
}

/// A full enumeration of the synced entities visible to one peer.
///
/// Order carries no meaning but is preserved through transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct WorldSnapshot(pub Vec<SerializedEntity>);

impl WorldSnapshot {
    /// Iterate the snapshot's entities.
    pub fn iter(&self) -> impl Iterator<Item = &SerializedEntity> {
        self.0.iter()
    }

    /// Number of entities in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the snapshot carries no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the snapshot mentions the given network id.
    #[must_use]
    pub fn contains(&self, id: NetworkId) -> bool {
        self.0.iter().any(|e| e.id == id)
    }
}

/// The interpolation ids active on an entity.
///
/// Attached server-side when an entity is marked for sync with interpolated
/// components, and shipped to clients so they know which history buffers to
/// maintain. On the wire this is a plain byte stream of the `u8` ids; the
/// length is inferred from the enclosing envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpData {
    ids: Vec<InterpId>,
}

impl Component for InterpData {}

impl InterpData {
    /// Create from the interpolation ids to track.
    #[must_use]
    pub fn new(ids: Vec<InterpId>) -> Self {
        Self { ids }
    }

    /// The interpolation ids listed on this entity.
    #[must_use]
    pub fn component_keys(&self) -> &[InterpId] {
        &self.ids
    }
}

impl Serialize for InterpData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes: Vec<u8> = self.ids.iter().map(|id| id.0).collect();
        serializer.serialize_bytes(&bytes)
    }
}

impl<'de> Deserialize<'de> for InterpData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct InterpDataVisitor;

        impl<'de> Visitor<'de> for InterpDataVisitor {
            type Value = InterpData;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a byte string of interpolation ids")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<InterpData, E> {
                Ok(InterpData::new(v.iter().copied().map(InterpId).collect()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<InterpData, E> {
                Ok(InterpData::new(v.into_iter().map(InterpId).collect()))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<InterpData, A::Error> {
                let mut ids = Vec::new();
                while let Some(byte) = seq.next_element::<u8>()? {
                    ids.push(InterpId(byte));
                }
                Ok(InterpData::new(ids))
            }
        }

        deserializer.deserialize_byte_buf(InterpDataVisitor)
    }
}
