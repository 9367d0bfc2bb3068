//! Sparse mapping from voxel keys to the objects inside them

use crate::math::key::{KeyMap, VoxelKey};
use crate::scene::object::ObjectId;

/// Sparse voxel grid. A key is present iff its voxel holds at least
/// one object; empty lists are never retained.
///
/// The grid itself does not deduplicate: the registry's desired-keys
/// protocol guarantees an object is inserted into a voxel at most once.
#[derive(Default)]
pub struct VoxelGrid {
    voxels: KeyMap<Vec<ObjectId>>,
}

impl VoxelGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object to a voxel, creating the voxel if needed.
    pub fn insert(&mut self, key: VoxelKey, id: ObjectId) {
        self.voxels.entry(key).or_default().push(id);
    }

    /// Remove an object from a voxel. Order inside a voxel is not
    /// preserved; the emptied voxel is dropped.
    pub fn remove(&mut self, key: VoxelKey, id: ObjectId) -> bool {
        let Some(list) = self.voxels.get_mut(&key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|&o| o == id) else {
            return false;
        };
        list.swap_remove(pos);
        if list.is_empty() {
            self.voxels.remove(&key);
        }
        true
    }

    /// Objects inside a voxel, if it is occupied.
    pub fn voxel_at(&self, key: VoxelKey) -> Option<&[ObjectId]> {
        self.voxels.get(&key).map(|v| v.as_slice())
    }

    pub fn is_occupied(&self, key: VoxelKey) -> bool {
        self.voxels.contains_key(&key)
    }

    /// Number of occupied voxels.
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &VoxelKey> {
        self.voxels.keys()
    }

    pub fn clear(&mut self) {
        self.voxels.clear();
    }
}
