//! Integer voxel keys, key hashing, and key-space volumes
//!
//! A voxel key is `floor(world / voxel_size)` per axis. Keys hash by
//! packing the three components into 63 bits and running a splitmix64
//! finisher over the packed word, which spreads the clustered keys a
//! scene produces far better than a per-field product hash.

use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasherDefault, Hash, Hasher};

use crate::core::types::Vec3;
use crate::math::aabb::Aabb;

/// Key of a uniform cubic grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct VoxelKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelKey {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Key of the voxel containing a world position.
    pub fn from_world(pos: Vec3, voxel_size: f32) -> Self {
        Self {
            x: (pos.x / voxel_size).floor() as i32,
            y: (pos.y / voxel_size).floor() as i32,
            z: (pos.z / voxel_size).floor() as i32,
        }
    }

    /// Pack the three components into the low 63 bits, 21 bits each.
    /// Coordinates are truncated two's-complement, so keys within
    /// +/- 2^20 voxels of the origin never collide.
    pub fn packed(self) -> u64 {
        const MASK: u64 = (1 << 21) - 1;
        ((self.x as u64) & MASK)
            | (((self.y as u64) & MASK) << 21)
            | (((self.z as u64) & MASK) << 42)
    }

    /// Sum of absolute component differences.
    pub fn manhattan(self, other: VoxelKey) -> u64 {
        self.x.abs_diff(other.x) as u64
            + self.y.abs_diff(other.y) as u64
            + self.z.abs_diff(other.z) as u64
    }

    /// World-space minimum corner of this voxel.
    pub fn world_min(self, voxel_size: f32) -> Vec3 {
        Vec3::new(
            self.x as f32 * voxel_size,
            self.y as f32 * voxel_size,
            self.z as f32 * voxel_size,
        )
    }

    /// World-space bounds of this voxel.
    pub fn aabb(self, voxel_size: f32) -> Aabb {
        let min = self.world_min(voxel_size);
        Aabb::new(min, min + Vec3::splat(voxel_size))
    }
}

impl Hash for VoxelKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.packed());
    }
}

/// splitmix64 finisher.
#[inline]
fn mix64(mut v: u64) -> u64 {
    v ^= v >> 30;
    v = v.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    v ^= v >> 27;
    v = v.wrapping_mul(0x94d0_49bb_1331_11eb);
    v ^ (v >> 31)
}

/// Hasher specialized for packed voxel keys.
#[derive(Default)]
pub struct KeyHasher(u64);

impl Hasher for KeyHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = mix64(self.0 ^ b as u64);
        }
    }

    fn write_u64(&mut self, v: u64) {
        self.0 = mix64(self.0 ^ v);
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

pub type KeyBuildHasher = BuildHasherDefault<KeyHasher>;
pub type KeyMap<V> = HashMap<VoxelKey, V, KeyBuildHasher>;
pub type KeySet = HashSet<VoxelKey, KeyBuildHasher>;

/// Inclusive axis-aligned box of voxel keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyVolume {
    pub min: VoxelKey,
    pub max: VoxelKey,
}

impl KeyVolume {
    pub fn new(min: VoxelKey, max: VoxelKey) -> Self {
        debug_assert!(min.x <= max.x && min.y <= max.y && min.z <= max.z);
        Self { min, max }
    }

    /// Smallest key volume covering a world-space AABB.
    pub fn from_world_aabb(aabb: &Aabb, voxel_size: f32) -> Self {
        Self::new(
            VoxelKey::from_world(aabb.min, voxel_size),
            VoxelKey::from_world(aabb.max, voxel_size),
        )
    }

    pub fn is_single_voxel(&self) -> bool {
        self.min == self.max
    }

    /// True when any axis spans a single voxel.
    pub fn has_flat_axis(&self) -> bool {
        self.min.x == self.max.x || self.min.y == self.max.y || self.min.z == self.max.z
    }

    pub fn contains(&self, key: VoxelKey) -> bool {
        key.x >= self.min.x
            && key.x <= self.max.x
            && key.y >= self.min.y
            && key.y <= self.max.y
            && key.z >= self.min.z
            && key.z <= self.max.z
    }

    pub fn voxel_count(&self) -> u64 {
        let dx = (self.max.x - self.min.x) as u64 + 1;
        let dy = (self.max.y - self.min.y) as u64 + 1;
        let dz = (self.max.z - self.min.z) as u64 + 1;
        dx * dy * dz
    }

    /// World-space bounds of the whole volume.
    pub fn world_aabb(&self, voxel_size: f32) -> Aabb {
        Aabb::new(
            self.min.world_min(voxel_size),
            self.max.world_min(voxel_size) + Vec3::splat(voxel_size),
        )
    }

    /// The eight octants split at the per-axis midpoints.
    /// Requires every axis to span at least two voxels.
    pub fn octants(&self) -> [KeyVolume; 8] {
        debug_assert!(!self.has_flat_axis());
        let mx = self.min.x + (self.max.x - self.min.x) / 2;
        let my = self.min.y + (self.max.y - self.min.y) / 2;
        let mz = self.min.z + (self.max.z - self.min.z) / 2;

        let xr = [(self.min.x, mx), (mx + 1, self.max.x)];
        let yr = [(self.min.y, my), (my + 1, self.max.y)];
        let zr = [(self.min.z, mz), (mz + 1, self.max.z)];

        let mut out = [*self; 8];
        for (i, slot) in out.iter_mut().enumerate() {
            let (x0, x1) = xr[i & 1];
            let (y0, y1) = yr[(i >> 1) & 1];
            let (z0, z1) = zr[(i >> 2) & 1];
            *slot = KeyVolume::new(VoxelKey::new(x0, y0, z0), VoxelKey::new(x1, y1, z1));
        }
        out
    }

    /// Split at the midpoint of the longest axis.
    /// Requires the volume to span more than one voxel.
    pub fn split_longest_axis(&self) -> (KeyVolume, KeyVolume) {
        debug_assert!(!self.is_single_voxel());
        let dx = self.max.x - self.min.x;
        let dy = self.max.y - self.min.y;
        let dz = self.max.z - self.min.z;

        if dx >= dy && dx >= dz {
            let mid = self.min.x + dx / 2;
            (
                KeyVolume::new(self.min, VoxelKey::new(mid, self.max.y, self.max.z)),
                KeyVolume::new(VoxelKey::new(mid + 1, self.min.y, self.min.z), self.max),
            )
        } else if dy >= dz {
            let mid = self.min.y + dy / 2;
            (
                KeyVolume::new(self.min, VoxelKey::new(self.max.x, mid, self.max.z)),
                KeyVolume::new(VoxelKey::new(self.min.x, mid + 1, self.min.z), self.max),
            )
        } else {
            let mid = self.min.z + dz / 2;
            (
                KeyVolume::new(self.min, VoxelKey::new(self.max.x, self.max.y, mid)),
                KeyVolume::new(VoxelKey::new(self.min.x, self.min.y, mid + 1), self.max),
            )
        }
    }

    /// Iterate every key inside the volume.
    pub fn iter_keys(&self) -> impl Iterator<Item = VoxelKey> + '_ {
        let (min, max) = (self.min, self.max);
        (min.x..=max.x).flat_map(move |x| {
            (min.y..=max.y)
                .flat_map(move |y| (min.z..=max.z).map(move |z| VoxelKey::new(x, y, z)))
        })
    }
}
