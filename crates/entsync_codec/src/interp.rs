//! Interpolation registry.
//!
//! A secondary registry, independent of [`TypeMapper`](crate::TypeMapper)
//! ids: each interpolated component type gets a small [`InterpId`] paired
//! with its lerp function. The registry also captures erased clone and
//! default constructors for the type, which the client needs to seed
//! component slots and duplicate history samples without knowing the
//! concrete type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::CodecError;

/// Identifier for an interpolated component type.
///
/// A separate namespace from `ComponentId`, limited to `1..=255`; 0 means
/// "not registered for interpolation".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterpId(pub u8);

/// The "not registered" sentinel id.
pub const UNREGISTERED_INTERP: InterpId = InterpId(0);

impl std::fmt::Display for InterpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-erased lerp: `(from, to, t) → value`.
///
/// Returns `None` when either input is not of the registered type.
pub type ErasedLerp =
    Arc<dyn Fn(&dyn Any, &dyn Any, f64) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

type DefaultFn = fn() -> Box<dyn Any + Send + Sync>;
type CloneFn = fn(&dyn Any) -> Option<Box<dyn Any + Send + Sync>>;

#[derive(Clone)]
struct InterpEntry {
    type_id: TypeId,
    type_name: &'static str,
    lerp: ErasedLerp,
    default: DefaultFn,
    clone: CloneFn,
}

#[derive(Default)]
struct RegistryInner {
    id_to_entry: HashMap<InterpId, InterpEntry>,
    type_to_id: HashMap<TypeId, InterpId>,
}

/// `InterpId ↔ type ↔ lerp` registry.
///
/// Thread-safe like the main mapper: a short-held mutex guards the maps, and
/// lookups hand out owned clones.
#[derive(Default)]
pub struct InterpRegistry {
    inner: Mutex<RegistryInner>,
}

impl InterpRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` for interpolation under `id` with the given lerp.
    ///
    /// The lerp receives `(from, to, t)` and returns the blended value; `t`
    /// is typically in `[0, 1]` but may exceed it when the caller
    /// extrapolates.
    ///
    /// # Errors
    ///
    /// Fails with [`CodecError::ReservedInterpId`] for id 0, and with
    /// [`CodecError::InterpIdInUse`] / [`CodecError::InterpTypeInUse`] when
    /// either direction is already bound.
    pub fn register<T, F>(&self, id: InterpId, lerp: F) -> Result<(), CodecError>
    where
        T: Clone + Default + Send + Sync + 'static,
        F: Fn(&T, &T, f64) -> T + Send + Sync + 'static,
    {
        if id == UNREGISTERED_INTERP {
            return Err(CodecError::ReservedInterpId);
        }

        let mut inner = self.inner.lock().unwrap();
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        if let Some(entry) = inner.id_to_entry.get(&id) {
            if entry.type_id == type_id {
                return Ok(());
            }
            return Err(CodecError::InterpIdInUse {
                id,
                existing: entry.type_name,
                new: type_name,
            });
        }
        if let Some(&existing) = inner.type_to_id.get(&type_id) {
            return Err(CodecError::InterpTypeInUse {
                name: type_name,
                existing,
            });
        }

        let erased: ErasedLerp = Arc::new(move |from, to, t| {
            let from = from.downcast_ref::<T>()?;
            let to = to.downcast_ref::<T>()?;
            Some(Box::new(lerp(from, to, t)))
        });

        inner.id_to_entry.insert(
            id,
            InterpEntry {
                type_id,
                type_name,
                lerp: erased,
                default: default_boxed::<T>,
                clone: clone_boxed::<T>,
            },
        );
        inner.type_to_id.insert(type_id, id);
        Ok(())
    }

    /// Returns the runtime type id registered under `id`.
    #[must_use]
    pub fn lookup_type(&self, id: InterpId) -> Option<TypeId> {
        self.entry(id).map(|e| e.type_id)
    }

    /// Returns the interpolation id for the runtime type, or
    /// [`UNREGISTERED_INTERP`] if the type is not interpolated.
    #[must_use]
    pub fn lookup_id(&self, type_id: TypeId) -> InterpId {
        self.inner
            .lock()
            .unwrap()
            .type_to_id
            .get(&type_id)
            .copied()
            .unwrap_or(UNREGISTERED_INTERP)
    }

    /// Returns `true` if `id` has a registration.
    #[must_use]
    pub fn registered_id(&self, id: InterpId) -> bool {
        self.inner.lock().unwrap().id_to_entry.contains_key(&id)
    }

    /// Returns `true` if the runtime type is registered for interpolation.
    #[must_use]
    pub fn registered_type(&self, type_id: TypeId) -> bool {
        self.inner.lock().unwrap().type_to_id.contains_key(&type_id)
    }

    /// Returns the lerp function registered under `id`.
    #[must_use]
    pub fn lookup_lerp(&self, id: InterpId) -> Option<ErasedLerp> {
        self.entry(id).map(|e| e.lerp)
    }

    /// Construct a default-valued instance of the type registered under `id`.
    #[must_use]
    pub fn new_default(&self, id: InterpId) -> Option<Box<dyn Any + Send + Sync>> {
        self.entry(id).map(|e| (e.default)())
    }

    /// Clone a type-erased value of the type registered under `id`.
    #[must_use]
    pub fn clone_value(&self, id: InterpId, value: &dyn Any) -> Option<Box<dyn Any + Send + Sync>> {
        self.entry(id).and_then(|e| (e.clone)(value))
    }

    /// Remove every registration. Test hook.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.id_to_entry.clear();
        inner.type_to_id.clear();
    }

    fn entry(&self, id: InterpId) -> Option<InterpEntry> {
        self.inner.lock().unwrap().id_to_entry.get(&id).cloned()
    }
}

fn default_boxed<T: Default + Send + Sync + 'static>() -> Box<dyn Any + Send + Sync> {
    Box::new(T::default())
}

fn clone_boxed<T: Clone + Send + Sync + 'static>(
    value: &dyn Any,
) -> Option<Box<dyn Any + Send + Sync>> {
    value
        .downcast_ref::<T>()
        .map(|v| Box::new(v.clone()) as Box<dyn Any + Send + Sync>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f64,
        y: f64,
    }

    fn lerp_position(from: &Position, to: &Position, t: f64) -> Position {
        Position {
            x: from.x + (to.x - from.x) * t,
            y: from.y + (to.y - from.y) * t,
        }
    }

    #[test]
    fn test_register_and_lookup_both_directions() {
        let registry = InterpRegistry::new();
        registry.register::<Position, _>(InterpId(1), lerp_position).unwrap();

        assert_eq!(registry.lookup_type(InterpId(1)), Some(TypeId::of::<Position>()));
        assert_eq!(registry.lookup_id(TypeId::of::<Position>()), InterpId(1));
        assert!(registry.registered_id(InterpId(1)));
        assert!(registry.registered_type(TypeId::of::<Position>()));
        assert!(!registry.registered_id(InterpId(2)));
        assert_eq!(registry.lookup_id(TypeId::of::<String>()), UNREGISTERED_INTERP);
    }

    #[test]
    fn test_register_id_zero_fails() {
        let registry = InterpRegistry::new();
        let err = registry
            .register::<Position, _>(UNREGISTERED_INTERP, lerp_position)
            .unwrap_err();
        assert!(matches!(err, CodecError::ReservedInterpId));
    }

    #[test]
    fn test_register_conflicts_fail() {
        let registry = InterpRegistry::new();
        registry.register::<Position, _>(InterpId(1), lerp_position).unwrap();

        let err = registry
            .register::<f64, _>(InterpId(1), |a, b, t| a + (b - a) * t)
            .unwrap_err();
        assert!(matches!(err, CodecError::InterpIdInUse { .. }));

        let err = registry
            .register::<Position, _>(InterpId(2), lerp_position)
            .unwrap_err();
        assert!(matches!(err, CodecError::InterpTypeInUse { .. }));
    }

    #[test]
    fn test_erased_lerp_blends() {
        let registry = InterpRegistry::new();
        registry.register::<Position, _>(InterpId(1), lerp_position).unwrap();

        let lerp = registry.lookup_lerp(InterpId(1)).unwrap();
        let from = Position { x: 0.0, y: 0.0 };
        let to = Position { x: 10.0, y: 20.0 };
        let result = lerp(&from, &to, 0.5).unwrap();
        assert_eq!(
            result.downcast_ref::<Position>(),
            Some(&Position { x: 5.0, y: 10.0 })
        );
    }

    #[test]
    fn test_erased_lerp_rejects_wrong_types() {
        let registry = InterpRegistry::new();
        registry.register::<Position, _>(InterpId(1), lerp_position).unwrap();

        let lerp = registry.lookup_lerp(InterpId(1)).unwrap();
        assert!(lerp(&1u32, &2u32, 0.5).is_none());
    }

    #[test]
    fn test_default_and_clone_helpers() {
        let registry = InterpRegistry::new();
        registry.register::<Position, _>(InterpId(1), lerp_position).unwrap();

        let default = registry.new_default(InterpId(1)).unwrap();
        assert_eq!(default.downcast_ref::<Position>(), Some(&Position::default()));

        let original = Position { x: 3.0, y: 4.0 };
        let cloned = registry.clone_value(InterpId(1), &original).unwrap();
        assert_eq!(cloned.downcast_ref::<Position>(), Some(&original));
    }
}
