mod entity;
mod manager;
pub mod update_array;

pub use entity::{DirtyMask, Entity, UNIT_CARGO_CARRIER, UNIT_CARGO_CRATE};
pub use manager::{EntityManager, EntityRemoved, WorldError};
pub use update_array::{
    LocalStats, UpdateArrayEncoder, UpdateArrayError, UpdateEntry, UpdateKind,
};
