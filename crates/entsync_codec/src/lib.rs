//! # entsync_codec
//!
//! Component id registry and MessagePack envelope codec for entsync.
//!
//! This crate provides:
//!
//! - [`TypeMapper`] — bidirectional `ComponentId ↔ type` registry that
//!   encodes values as self-delimiting `(id, payload)` envelopes.
//! - [`InterpRegistry`] — parallel `InterpId ↔ type ↔ lerp` registry for
//!   client-side interpolation.
//! - [`type_hash`] — FNV-1a content-based ids for message types without an
//!   explicitly assigned id.
//! - [`CodecError`] — registry and codec error types.

pub mod error;
pub mod interp;
pub mod mapper;
pub mod type_hash;

pub use error::CodecError;
pub use interp::{ErasedLerp, InterpId, InterpRegistry, UNREGISTERED_INTERP};
pub use mapper::{ComponentId, Decoded, TypeMapper, UNREGISTERED};
pub use type_hash::type_hash;
