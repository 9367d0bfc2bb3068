//! Mathematical utilities and data structures

pub mod aabb;
pub mod frustum;
pub mod key;

pub use aabb::Aabb;
pub use frustum::{Containment, Frustum, Plane};
pub use key::{KeyMap, KeySet, KeyVolume, VoxelKey};
