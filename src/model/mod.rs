//! Typed snapshots of the vendor cloud's pets and devices.

mod entity;
mod status;

pub(crate) use entity::capitalize;
pub use entity::{Describe, Device, Entity, EntityType, Feeder, Pet, RawDevice, Tag};
pub use status::{Status, VersionRecord, Versions};
