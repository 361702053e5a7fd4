//! Content-based component ids.
//!
//! Message types that are never registered explicitly (router messages) get
//! an id derived from their type name, so both ends of a connection built
//! from the same source agree on the mapping without coordination.
//!
//! The hash is FNV-1a over the canonical type path. Type paths are not
//! guaranteed stable across compiler versions, so explicitly assigned ids
//! remain the production path for component data.

use crate::mapper::ComponentId;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64-bit hash of a byte string.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Returns the content-based [`ComponentId`] for the type `T`.
#[must_use]
pub fn type_hash<T: 'static>() -> ComponentId {
    ComponentId(fnv1a(std::any::type_name::<T>().as_bytes()))
}
