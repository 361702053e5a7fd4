//! Component id registry and envelope codec.
//!
//! [`TypeMapper`] maps between registered [`ComponentId`]s and Rust types,
//! and translates values into self-delimiting wire envelopes: the MessagePack
//! encoding of the id followed by the **named** (map-style) MessagePack
//! encoding of the value. Named encoding keeps the payload self-describing
//! for any MessagePack decoder, regardless of struct field order.
//!
//! The registry stores monomorphized encode/decode functions captured at
//! registration time, so decoding can construct a value of the right type
//! from nothing but the wire id — no runtime reflection involved.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Wire identifier for a component type.
///
/// Stable across server and client for a given type. Id 0 is reserved as the
/// "unregistered" sentinel and can never be registered; lookups return it to
/// signal absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

/// The "unregistered" sentinel id.
pub const UNREGISTERED: ComponentId = ComponentId(0);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type EncodeFn = fn(&dyn Any, &mut Vec<u8>) -> Result<(), CodecError>;
type DecodeFn = fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>, CodecError>;

/// A registered type entry: runtime type identity plus its codec functions.
#[derive(Clone)]
struct TypeEntry {
    type_id: TypeId,
    type_name: &'static str,
    zero_sized: bool,
    encode: EncodeFn,
    decode: DecodeFn,
}

/// A decoded envelope: the wire id, the resolved type, and the value.
#[derive(Debug)]
pub struct Decoded {
    /// The wire id read from the envelope.
    pub id: ComponentId,
    /// Runtime type id of `value`.
    pub type_id: TypeId,
    /// Name of the resolved type.
    pub type_name: &'static str,
    /// The freshly decoded value.
    pub value: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct MapperInner {
    id_to_entry: HashMap<ComponentId, TypeEntry>,
    type_to_id: HashMap<TypeId, ComponentId>,
}

/// Bidirectional `ComponentId ↔ type` registry with envelope encode/decode.
///
/// The two maps are kept mutual inverses: an id can never point at a type
/// whose own lookup resolves to a different id. Registration of an already
/// bound id or type fails; re-registering the identical pair is a no-op so
/// callers may register unconditionally.
///
/// All operations take a short-held internal mutex; encode and decode
/// allocate fresh buffers per call, so concurrent callers never share
/// mutable state.
#[derive(Default)]
pub struct TypeMapper {
    inner: Mutex<MapperInner>,
}

impl TypeMapper {
    /// Create an empty mapper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under the given id, binding both directions atomically.
    ///
    /// # Errors
    ///
    /// Fails with [`CodecError::ReservedComponentId`] for id 0, with
    /// [`CodecError::ComponentIdInUse`] if the id is bound to another type,
    /// and with [`CodecError::TypeInUse`] if `T` is bound to another id.
    pub fn register<T>(&self, id: ComponentId) -> Result<(), CodecError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        if id == UNREGISTERED {
            return Err(CodecError::ReservedComponentId);
        }

        let mut inner = self.inner.lock().unwrap();
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        if let Some(entry) = inner.id_to_entry.get(&id) {
            if entry.type_id == type_id {
                return Ok(());
            }
            return Err(CodecError::ComponentIdInUse {
                id,
                existing: entry.type_name,
                new: type_name,
            });
        }
        if let Some(&existing) = inner.type_to_id.get(&type_id) {
            return Err(CodecError::TypeInUse {
                id,
                name: type_name,
                existing,
            });
        }

        inner.id_to_entry.insert(
            id,
            TypeEntry {
                type_id,
                type_name,
                zero_sized: std::mem::size_of::<T>() == 0,
                encode: encode_payload::<T>,
                decode: decode_payload::<T>,
            },
        );
        inner.type_to_id.insert(type_id, id);
        Ok(())
    }

    /// Returns the runtime type id registered under `id`, if any.
    #[must_use]
    pub fn lookup(&self, id: ComponentId) -> Option<TypeId> {
        self.entry(id).map(|e| e.type_id)
    }

    /// Returns the component id registered for the runtime type, or
    /// [`UNREGISTERED`] if the type is unknown.
    #[must_use]
    pub fn lookup_id(&self, type_id: TypeId) -> ComponentId {
        self.inner
            .lock()
            .unwrap()
            .type_to_id
            .get(&type_id)
            .copied()
            .unwrap_or(UNREGISTERED)
    }

    /// Returns `true` if the registered type is zero-sized (a tag component
    /// with no data).
    #[must_use]
    pub fn is_zero_sized(&self, type_id: TypeId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .type_to_id
            .get(&type_id)
            .and_then(|id| inner.id_to_entry.get(id))
            .is_some_and(|e| e.zero_sized)
    }

    /// Serialize a value into a wire envelope.
    ///
    /// # Errors
    ///
    /// Fails if `T` has not been registered, or if encoding fails.
    pub fn serialize<T: Serialize + 'static>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        self.serialize_any(TypeId::of::<T>(), value)
    }

    /// Serialize a type-erased value into a wire envelope.
    ///
    /// The returned buffer is freshly allocated and owned by the caller.
    ///
    /// # Errors
    ///
    /// Fails if no id is registered for `type_id`, if `value` is not of the
    /// registered type, or if encoding fails.
    pub fn serialize_any(
        &self,
        type_id: TypeId,
        value: &dyn Any,
    ) -> Result<Vec<u8>, CodecError> {
        let (id, encode) = {
            let inner = self.inner.lock().unwrap();
            let id = *inner
                .type_to_id
                .get(&type_id)
                .ok_or(CodecError::UnregisteredTypeId(type_id))?;
            let entry = &inner.id_to_entry[&id];
            (id, entry.encode)
        };

        let mut buf = Vec::new();
        {
            let mut ser = rmp_serde::Serializer::new(&mut buf);
            id.serialize(&mut ser)?;
        }
        encode(value, &mut buf)?;
        Ok(buf)
    }

    /// Decode a wire envelope into a freshly allocated value of the
    /// registered type.
    ///
    /// # Errors
    ///
    /// Fails with [`CodecError::UnknownComponentId`] if the id has no
    /// registered type, and with [`CodecError::Decode`] if the payload does
    /// not decode under the resolved type.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Decoded, CodecError> {
        let mut cursor = Cursor::new(bytes);
        let id: ComponentId = {
            let mut de = rmp_serde::Deserializer::new(&mut cursor);
            Deserialize::deserialize(&mut de)?
        };

        let entry = self.entry(id).ok_or(CodecError::UnknownComponentId(id))?;
        let payload = &bytes[cursor.position() as usize..];
        let value = (entry.decode)(payload)?;
        Ok(Decoded {
            id,
            type_id: entry.type_id,
            type_name: entry.type_name,
            value,
        })
    }

    /// Remove every registration. Test hook.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.id_to_entry.clear();
        inner.type_to_id.clear();
    }

    fn entry(&self, id: ComponentId) -> Option<TypeEntry> {
        self.inner.lock().unwrap().id_to_entry.get(&id).cloned()
    }
}

fn encode_payload<T: Serialize + 'static>(
    value: &dyn Any,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let value = value
        .downcast_ref::<T>()
        .ok_or(CodecError::ValueTypeMismatch(std::any::type_name::<T>()))?;
    let mut ser = rmp_serde::Serializer::new(out).with_struct_map();
    value.serialize(&mut ser)?;
    Ok(())
}

fn decode_payload<T: DeserializeOwned + Send + Sync + 'static>(
    bytes: &[u8],
) -> Result<Box<dyn Any + Send + Sync>, CodecError> {
    let value: T = rmp_serde::from_slice(bytes)?;
    Ok(Box::new(value))
}
