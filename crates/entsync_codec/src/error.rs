//! Registry and codec error types.

use crate::interp::InterpId;
use crate::mapper::ComponentId;

/// Errors that can occur during registration, encoding, or decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Component id 0 is reserved as the "unregistered" sentinel.
    #[error("component id 0 is reserved and cannot be registered")]
    ReservedComponentId,

    /// The component id is already bound to a different type.
    #[error("cannot register {new} with id {id}: the id is reserved by {existing}")]
    ComponentIdInUse {
        /// The contested id.
        id: ComponentId,
        /// Name of the type already registered under `id`.
        existing: &'static str,
        /// Name of the type whose registration was rejected.
        new: &'static str,
    },

    /// The type is already registered under a different component id.
    #[error("cannot register {name} with id {id}: the type is already mapped to id {existing}")]
    TypeInUse {
        /// The rejected id.
        id: ComponentId,
        /// Name of the already-registered type.
        name: &'static str,
        /// The id the type is already bound to.
        existing: ComponentId,
    },

    /// Interpolation id 0 is reserved as the "unregistered" sentinel.
    #[error("interpolation id 0 is reserved and cannot be registered")]
    ReservedInterpId,

    /// The interpolation id is already bound to a different type.
    #[error("cannot register {new} with interpolation id {id}: the id is reserved by {existing}")]
    InterpIdInUse {
        /// The contested id.
        id: InterpId,
        /// Name of the type already registered under `id`.
        existing: &'static str,
        /// Name of the type whose registration was rejected.
        new: &'static str,
    },

    /// The type is already registered for interpolation under a different id.
    #[error("{name} is already registered for interpolation with id {existing}")]
    InterpTypeInUse {
        /// Name of the already-registered type.
        name: &'static str,
        /// The id the type is already bound to.
        existing: InterpId,
    },

    /// No component id registered for the value's type.
    #[error("no component id registered for {0}; register it before serializing")]
    UnregisteredType(&'static str),

    /// No component id registered for the given runtime type id.
    #[error("no component id registered for type {0:?}")]
    UnregisteredTypeId(std::any::TypeId),

    /// A decoded envelope carried an id with no registered type.
    #[error("no component type registered for id {0}")]
    UnknownComponentId(ComponentId),

    /// A type-erased value did not match the registered type.
    #[error("value does not match the registered type {0}")]
    ValueTypeMismatch(&'static str),

    /// Failed to encode a value to MessagePack.
    #[error("failed to encode value: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a value from MessagePack.
    #[error("failed to decode value: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
