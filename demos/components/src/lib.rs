//! Shared component definitions for the entsync demos.
//!
//! Server and client must agree on component ids, so both binaries call
//! [`register_demo_components`] on startup.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use entsync::{register_component, register_interpolated};
use entsync_codec::{CodecError, ComponentId, InterpId};
use entsync_ecs::Component;

/// Wire id for [`Position`].
pub const POSITION_ID: ComponentId = ComponentId(10);

/// Wire id for [`Health`].
pub const HEALTH_ID: ComponentId = ComponentId(11);

/// Interpolation id for [`Position`].
pub const POSITION_INTERP: InterpId = InterpId(1);

/// A 2D position component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Vec2);

impl Position {
    /// Create a position from coordinates.
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self(Vec2::new(x, y))
    }
}

impl Component for Position {}

/// A health component with current and maximum hit points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Health {
    /// Current hit points.
    pub current: u8,
    /// Maximum hit points.
    pub max: u8,
}

impl Health {
    /// Create a health component at full HP.
    #[must_use]
    pub fn full(max: u8) -> Self {
        Self { current: max, max }
    }
}

impl Component for Health {}

/// Register the demo components with their stable ids. Positions
/// additionally interpolate on clients via [`Vec2::lerp`].
///
/// # Errors
///
/// Fails if another registration already claimed one of the ids.
pub fn register_demo_components() -> Result<(), CodecError> {
    register_component::<Position>(POSITION_ID)?;
    register_component::<Health>(HEALTH_ID)?;
    register_interpolated::<Position, _>(POSITION_INTERP, |from, to, t| {
        Position(from.0.lerp(to.0, t as f32))
    })?;
    Ok(())
}
