//! Game simulation modules

pub mod combat;
pub mod entity;
pub mod geometry;
pub mod physics;
pub mod player;
pub mod projectile;
pub mod runner;
pub mod snapshot;
pub mod timers;
pub mod world;

pub use runner::{WorldHandle, WorldRunner};

/// Identifier shared by every entity kind; unique among live entities
pub type EntityId = u32;
