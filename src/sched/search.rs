//! Time-budgeted frustum search over the voxel grid
//!
//! Top-down partition of the frustum's bounding volume, run
//! iteratively over a LIFO worklist. Voxels recently proven visible
//! are accepted for a short grace window without a plane test, and
//! when the budget runs out the remaining volumes fall back to those
//! cached results instead of being dropped.

use std::mem;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::core::clock::Deadline;
use crate::math::aabb::Aabb;
use crate::math::frustum::{Containment, Frustum};
use crate::math::key::{KeyMap, KeyVolume, VoxelKey};
use crate::voxel::grid::VoxelGrid;

/// Cached visibility entries older than this are pruned on compaction.
const CACHE_MAX_AGE: f64 = 2.0;

pub struct FrustumSearch {
    /// Timestamp each voxel was last proven inside the frustum.
    last_visible: KeyMap<f64>,
    /// Keys visible this frame, ascending Manhattan distance from the
    /// camera voxel.
    visible_keys: Vec<VoxelKey>,
    worklist: Vec<KeyVolume>,
    present: Vec<VoxelKey>,
    rng: Pcg64Mcg,
    skipped: u32,
    camera_key: VoxelKey,
}

impl FrustumSearch {
    pub fn new(seed: u64) -> Self {
        Self {
            last_visible: KeyMap::default(),
            visible_keys: Vec::new(),
            worklist: Vec::new(),
            present: Vec::new(),
            rng: Pcg64Mcg::seed_from_u64(seed),
            skipped: 0,
            camera_key: VoxelKey::new(0, 0, 0),
        }
    }

    /// Visible voxel keys from the last run, closest first.
    pub fn visible_keys(&self) -> &[VoxelKey] {
        &self.visible_keys
    }

    /// Worklist entries abandoned at the deadline in the last run.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// Run one frame's search.
    pub fn run(
        &mut self,
        grid: &VoxelGrid,
        frustum: &Frustum,
        camera_key: VoxelKey,
        voxel_size: f32,
        grace_window: f64,
        now: f64,
        deadline: &mut Deadline,
    ) {
        self.visible_keys.clear();
        self.worklist.clear();
        self.skipped = 0;
        self.camera_key = camera_key;

        if grid.is_empty() {
            return;
        }

        // Bounding volume: the camera position and the four far-plane
        // corners, in voxel coordinates.
        let mut bounds = Aabb::from_points(&frustum.far_corners);
        bounds.expand(frustum.apex);
        let bounds = KeyVolume::from_world_aabb(&bounds, voxel_size);

        if bounds.has_flat_axis() {
            self.worklist.push(bounds);
        } else {
            let mut octants = bounds.octants();
            octants.shuffle(&mut self.rng);
            self.worklist.extend_from_slice(&octants);
        }

        while let Some(volume) = self.worklist.pop() {
            if volume.is_single_voxel() {
                self.check_voxel(volume.min, grid, frustum, voxel_size, grace_window, now);
            } else {
                self.check_volume(volume, grid, frustum, voxel_size, grace_window, now);
            }
            if deadline.expired() {
                self.abandon_remaining(grid, grace_window, now);
                break;
            }
        }
    }

    /// Single-voxel path: grace-window fast path, then the plane test.
    fn check_voxel(
        &mut self,
        key: VoxelKey,
        grid: &VoxelGrid,
        frustum: &Frustum,
        voxel_size: f32,
        grace_window: f64,
        now: f64,
    ) {
        if !grid.is_occupied(key) {
            return;
        }
        if self.cache_live(key, grace_window, now) {
            self.mark_visible(key);
            return;
        }
        let aabb = key.aabb(voxel_size);
        if frustum.intersects_box(aabb.center(), aabb.half_extent()) {
            self.last_visible.insert(key, now);
            self.mark_visible(key);
        } else {
            self.last_visible.remove(&key);
        }
    }

    /// Multi-voxel path: classify the whole volume, splitting partial
    /// intersections along the longest axis.
    fn check_volume(
        &mut self,
        volume: KeyVolume,
        grid: &VoxelGrid,
        frustum: &Frustum,
        voxel_size: f32,
        grace_window: f64,
        now: f64,
    ) {
        let mut present = mem::take(&mut self.present);
        present_keys(volume, grid, &mut present);
        if present.is_empty() {
            self.present = present;
            return;
        }

        let mut all_cached = true;
        for &key in &present {
            if !self.cache_live(key, grace_window, now) {
                all_cached = false;
                break;
            }
        }
        if all_cached {
            for &key in &present {
                self.mark_visible(key);
            }
            self.present = present;
            return;
        }

        let aabb = volume.world_aabb(voxel_size);
        match frustum.classify_box(aabb.center(), aabb.half_extent()) {
            Containment::Outside => {
                for &key in &present {
                    self.last_visible.remove(&key);
                }
            }
            Containment::Inside => {
                for &key in &present {
                    self.last_visible.insert(key, now);
                    self.mark_visible(key);
                }
            }
            Containment::Partial => {
                let (a, b) = volume.split_longest_axis();
                if self.rng.gen_bool(0.5) {
                    self.worklist.push(a);
                    self.worklist.push(b);
                } else {
                    self.worklist.push(b);
                    self.worklist.push(a);
                }
            }
        }
        self.present = present;
    }

    /// Deadline fallback: reuse live cache entries for whatever the
    /// partition did not reach.
    fn abandon_remaining(&mut self, grid: &VoxelGrid, grace_window: f64, now: f64) {
        let worklist = mem::take(&mut self.worklist);
        let mut present = mem::take(&mut self.present);
        for &volume in &worklist {
            self.skipped += 1;
            present_keys(volume, grid, &mut present);
            for i in 0..present.len() {
                let key = present[i];
                if self.cache_live(key, grace_window, now) {
                    self.mark_visible(key);
                }
            }
        }
        self.present = present;
        self.worklist = worklist;
        self.worklist.clear();
    }

    /// Whether a cached entry still falls inside the jittered grace window.
    fn cache_live(&mut self, key: VoxelKey, grace_window: f64, now: f64) -> bool {
        match self.last_visible.get(&key) {
            Some(&t) => now - t < grace_window * self.rng.gen_range(0.95..=1.05),
            None => false,
        }
    }

    /// Insert into the visible list, keeping it sorted by Manhattan
    /// distance from the camera voxel. Duplicates are ignored.
    fn mark_visible(&mut self, key: VoxelKey) {
        let camera_key = self.camera_key;
        let dist = key.manhattan(camera_key);
        let idx = self
            .visible_keys
            .partition_point(|k| k.manhattan(camera_key) < dist);
        let mut i = idx;
        while i < self.visible_keys.len() && self.visible_keys[i].manhattan(camera_key) == dist {
            if self.visible_keys[i] == key {
                return;
            }
            i += 1;
        }
        self.visible_keys.insert(idx, key);
    }

    /// Drop every cached visibility entry.
    pub fn clear_cache(&mut self) {
        self.last_visible.clear();
    }

    /// Prune stale cache entries and reclaim scratch capacity.
    pub fn compact(&mut self, now: f64) {
        self.last_visible.retain(|_, &mut t| now - t < CACHE_MAX_AGE);
        self.visible_keys.shrink_to_fit();
        self.worklist.shrink_to_fit();
        self.present.shrink_to_fit();
    }
}

/// Keys inside `volume` that are occupied in the grid. Scans whichever
/// is smaller: the volume's coordinates or the grid's occupied set.
fn present_keys(volume: KeyVolume, grid: &VoxelGrid, out: &mut Vec<VoxelKey>) {
    out.clear();
    if volume.voxel_count() > grid.len() as u64 {
        for &key in grid.keys() {
            if volume.contains(key) {
                out.push(key);
            }
        }
    } else {
        for key in volume.iter_keys() {
            if grid.is_occupied(key) {
                out.push(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, ManualClock};
    use crate::core::types::Pose;
    use crate::scene::object::ObjectId;
    use std::rc::Rc;

    const VOXEL: f32 = 10.0;

    fn frustum_at_origin() -> Frustum {
        // Camera at origin looking down -Z, 90 degree FOV, far 100
        Frustum::from_camera(&Pose::default(), 90.0, 1.0, 100.0)
    }

    fn unlimited(clock: &Rc<ManualClock>) -> Deadline {
        Deadline::with_stride(Rc::clone(clock) as Rc<dyn Clock>, f64::INFINITY, 1)
    }

    fn run_search(
        search: &mut FrustumSearch,
        grid: &VoxelGrid,
        clock: &Rc<ManualClock>,
        budget: f64,
    ) {
        let frustum = frustum_at_origin();
        let mut deadline = Deadline::with_stride(Rc::clone(clock) as Rc<dyn Clock>, budget, 1);
        search.run(
            grid,
            &frustum,
            VoxelKey::new(0, 0, 0),
            VOXEL,
            0.175,
            clock.now(),
            &mut deadline,
        );
    }

    #[test]
    fn test_empty_grid_finds_nothing() {
        let clock = Rc::new(ManualClock::new());
        let mut search = FrustumSearch::new(1);
        let grid = VoxelGrid::new();
        run_search(&mut search, &grid, &clock, f64::INFINITY);
        assert!(search.visible_keys().is_empty());
        assert_eq!(search.skipped(), 0);
    }

    #[test]
    fn test_finds_voxel_in_front_of_camera() {
        let clock = Rc::new(ManualClock::new());
        let mut search = FrustumSearch::new(1);
        let mut grid = VoxelGrid::new();
        // Voxel (-1,-1,-3) spans -10..0 on x and y, -30..-20 on z
        grid.insert(VoxelKey::new(-1, -1, -3), ObjectId(1));

        run_search(&mut search, &grid, &clock, f64::INFINITY);
        assert_eq!(search.visible_keys(), &[VoxelKey::new(-1, -1, -3)]);
    }

    #[test]
    fn test_culls_voxel_behind_camera() {
        let clock = Rc::new(ManualClock::new());
        let mut search = FrustumSearch::new(1);
        let mut grid = VoxelGrid::new();
        grid.insert(VoxelKey::new(0, 0, 5), ObjectId(1));

        run_search(&mut search, &grid, &clock, f64::INFINITY);
        assert!(search.visible_keys().is_empty());
    }

    #[test]
    fn test_every_intersecting_voxel_found_exactly_once() {
        let clock = Rc::new(ManualClock::new());
        let mut search = FrustumSearch::new(42);
        let mut grid = VoxelGrid::new();
        let frustum = frustum_at_origin();

        let mut id = 1;
        let mut expected = Vec::new();
        for x in -12..12 {
            for y in -3..3 {
                for z in -12..3 {
                    let key = VoxelKey::new(x, y, z);
                    grid.insert(key, ObjectId(id));
                    id += 1;
                    let aabb = key.aabb(VOXEL);
                    if frustum.intersects_box(aabb.center(), aabb.half_extent()) {
                        expected.push(key);
                    }
                }
            }
        }

        run_search(&mut search, &grid, &clock, f64::INFINITY);

        let mut found: Vec<VoxelKey> = search.visible_keys().to_vec();
        let found_count = found.len();
        found.sort();
        found.dedup();
        assert_eq!(found.len(), found_count, "no duplicates");

        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_visible_keys_sorted_by_manhattan_distance() {
        let clock = Rc::new(ManualClock::new());
        let mut search = FrustumSearch::new(9);
        let mut grid = VoxelGrid::new();
        for (i, z) in (-9..-1).enumerate() {
            grid.insert(VoxelKey::new(0, 0, z), ObjectId(i as u64 + 1));
        }

        run_search(&mut search, &grid, &clock, f64::INFINITY);

        let camera_key = VoxelKey::new(0, 0, 0);
        let dists: Vec<u64> = search
            .visible_keys()
            .iter()
            .map(|k| k.manhattan(camera_key))
            .collect();
        let mut sorted = dists.clone();
        sorted.sort();
        assert_eq!(dists, sorted);
        assert!(!dists.is_empty());
    }

    #[test]
    fn test_zero_budget_skips_and_reuses_cache() {
        let clock = Rc::new(ManualClock::new());
        let mut search = FrustumSearch::new(5);
        let mut grid = VoxelGrid::new();
        for z in -9..-1 {
            grid.insert(VoxelKey::new(0, 0, z), ObjectId((z + 10) as u64));
        }

        // Warm run fills the cache
        run_search(&mut search, &grid, &clock, f64::INFINITY);
        let warm = search.visible_keys().len();
        assert!(warm > 0);
        assert_eq!(search.skipped(), 0);

        // Starved run: every volume is abandoned, cache carries it
        clock.advance(0.01);
        run_search(&mut search, &grid, &clock, 0.0);
        assert!(search.skipped() > 0);
        assert_eq!(search.visible_keys().len(), warm);
    }

    #[test]
    fn test_cache_expires_after_grace_window() {
        let clock = Rc::new(ManualClock::new());
        let mut search = FrustumSearch::new(5);
        let mut grid = VoxelGrid::new();
        grid.insert(VoxelKey::new(0, 0, -3), ObjectId(1));

        run_search(&mut search, &grid, &clock, f64::INFINITY);
        assert_eq!(search.visible_keys().len(), 1);

        // Well past the grace window (0.175 * 1.05 max), starved budget
        clock.advance(1.0);
        run_search(&mut search, &grid, &clock, 0.0);
        assert!(search.visible_keys().is_empty());
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let clock = Rc::new(ManualClock::new());
        let mut grid = VoxelGrid::new();
        let mut id = 1;
        for x in -8..8 {
            for z in -10..0 {
                grid.insert(VoxelKey::new(x, 0, z), ObjectId(id));
                id += 1;
            }
        }

        let mut a = FrustumSearch::new(1234);
        let mut b = FrustumSearch::new(1234);
        run_search(&mut a, &grid, &clock, f64::INFINITY);
        run_search(&mut b, &grid, &clock, f64::INFINITY);
        assert_eq!(a.visible_keys(), b.visible_keys());
    }

    #[test]
    fn test_compact_prunes_stale_entries() {
        let clock = Rc::new(ManualClock::new());
        let mut search = FrustumSearch::new(5);
        let mut grid = VoxelGrid::new();
        grid.insert(VoxelKey::new(0, 0, -3), ObjectId(1));

        run_search(&mut search, &grid, &clock, f64::INFINITY);
        assert_eq!(search.last_visible.len(), 1);

        clock.advance(CACHE_MAX_AGE + 1.0);
        search.compact(clock.now());
        assert!(search.last_visible.is_empty());
    }

    #[test]
    fn test_unbudgeted_deadline_usage() {
        // A grid far bigger than the volume heuristic threshold
        let clock = Rc::new(ManualClock::new());
        let mut grid = VoxelGrid::new();
        for i in 0..200u64 {
            grid.insert(
                VoxelKey::new((i % 20) as i32 - 10, 0, -((i / 20) as i32) - 1),
                ObjectId(i + 1),
            );
        }
        let mut search = FrustumSearch::new(3);
        let mut deadline = unlimited(&clock);
        let frustum = frustum_at_origin();
        search.run(
            &grid,
            &frustum,
            VoxelKey::new(0, 0, 0),
            VOXEL,
            0.175,
            clock.now(),
            &mut deadline,
        );
        assert!(!search.visible_keys().is_empty());
    }
}
