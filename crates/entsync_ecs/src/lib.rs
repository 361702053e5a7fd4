//! # entsync_ecs
//!
//! Entity-component storage for the entsync synchronization library.
//!
//! This crate provides:
//!
//! - [`Entity`] — generational entity handles. Snapshot reaps recycle
//!   storage slots, so a handle carries the generation it was minted under
//!   and goes stale instead of aliasing the slot's next occupant.
//! - [`EntityAllocator`] — slot allocator tracking per-slot generations.
//! - [`Component`] trait — the contract all ECS data must satisfy.
//! - [`World`] — per-entity component storage with typed and type-erased
//!   accessors plus contains-all-types queries.

pub mod component;
pub mod entity;
pub mod world;

pub use component::Component;
pub use entity::{Entity, EntityAllocator};
pub use world::{World, WorldError};
