//! Synchronization error types.

use entsync_codec::CodecError;
use entsync_ecs::{Entity, WorldError};
use entsync_router::RouterError;

/// Errors raised while marking entities for sync or shipping snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A component listed for sync is not attached to the entity.
    #[error("entity {0} does not have the component {1}")]
    MissingComponent(Entity, &'static str),

    /// The entity is not alive in the sync world.
    #[error("entity {0} is not alive in the sync world")]
    EntityNotAlive(Entity),

    /// A component was listed for interpolation without being registered in
    /// the interpolation registry.
    #[error("{0} is not registered for interpolation")]
    NotInterpolated(&'static str),

    /// `do_sync` was called before a world was installed.
    #[error("no world registered for synchronization")]
    WorldNotSet,

    /// A snapshot send task panicked or was cancelled.
    #[error("snapshot send task failed: {0}")]
    SendTask(String),

    /// World mutation failed.
    #[error(transparent)]
    World(#[from] WorldError),

    /// Component registration or serialization failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Sending through the router failed.
    #[error(transparent)]
    Router(#[from] RouterError),
}
