//! Object registry: records, voxel membership, and change tracking
//!
//! The registry owns every `ObjectRecord` and keeps the voxel grid in
//! sync with object motion. Membership changes discovered by observer
//! callbacks or physics polling are diffed into per-object pending
//! sets and applied by a budgeted drain, closest objects first.

use std::rc::Rc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::core::clock::Deadline;
use crate::core::types::{Result, Vec3};
use crate::math::key::VoxelKey;
use crate::scene::dimensions::{self, DimensionChange, SceneObject};
use crate::scene::object::{warn_missing_record, ObjectId, ObjectMap, ObjectRecord};
use crate::sched::queue::PriorityQueue;
use crate::voxel::grid::VoxelGrid;

/// Fixed per-object scoring jitter, seconds.
const JITTER_RANGE: f64 = 0.002;

pub struct ObjectRegistry {
    records: ObjectMap<ObjectRecord>,
    grid: VoxelGrid,
    voxel_size: f32,
    next_id: u64,
    /// Pending membership work, keyed by Manhattan distance from the
    /// camera voxel.
    voxel_update_queue: PriorityQueue<ObjectId>,
    /// Round-robin polled physics objects.
    physics_objects: Vec<ObjectId>,
    physics_cursor: usize,
    changes_tx: Sender<DimensionChange>,
    changes_rx: Receiver<DimensionChange>,
    rng: Pcg64Mcg,
    scratch_keys: Vec<VoxelKey>,
    scratch_changes: Vec<DimensionChange>,
    missing_warned: bool,
}

impl ObjectRegistry {
    pub fn new(voxel_size: f32, seed: u64) -> Self {
        let (changes_tx, changes_rx) = unbounded();
        Self {
            records: ObjectMap::default(),
            grid: VoxelGrid::new(),
            voxel_size,
            next_id: 1,
            voxel_update_queue: PriorityQueue::new(),
            physics_objects: Vec::new(),
            physics_cursor: 0,
            changes_tx,
            changes_rx,
            rng: Pcg64Mcg::seed_from_u64(seed),
            scratch_keys: Vec::with_capacity(9),
            scratch_changes: Vec::new(),
            missing_warned: false,
        }
    }

    /// Register an object: resolve its dimensions, subscribe to its
    /// observers, and place it in the grid immediately.
    pub fn add(
        &mut self,
        object: Rc<dyn SceneObject>,
        is_physics: bool,
        camera_pos: Vec3,
    ) -> Result<ObjectId> {
        let dims = dimensions::resolve(object.as_ref())?;

        let id = ObjectId(self.next_id);
        self.next_id += 1;

        let jitter = self.rng.gen_range(-JITTER_RANGE..=JITTER_RANGE);
        let mut record = ObjectRecord::new(Rc::clone(&object), dims, jitter, is_physics);
        record.observers = object.subscribe(id, self.changes_tx.clone());
        record.distance = (record.pose.position - camera_pos).length();

        // Initial membership is applied synchronously so the object is
        // findable the moment registration returns.
        desired_keys(&record, self.voxel_size, &mut self.scratch_keys);
        for &key in &self.scratch_keys {
            self.grid.insert(key, id);
            record.voxel_keys.insert(key);
        }

        self.records.insert(id, record);
        if is_physics {
            self.physics_objects.push(id);
        }

        log::debug!("registered {id:?} ({} voxels)", self.scratch_keys.len());
        Ok(id)
    }

    /// Unregister an object: evict it from every voxel, cancel pending
    /// membership work, and dispose its observers.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(record) = self.records.remove(&id) else {
            return false;
        };
        for &key in record.voxel_keys.iter() {
            self.grid.remove(key, id);
        }
        self.voxel_update_queue.remove(&id);
        if record.is_physics {
            if let Some(pos) = self.physics_objects.iter().position(|&o| o == id) {
                self.physics_objects.swap_remove(pos);
                if !self.physics_objects.is_empty() {
                    self.physics_cursor %= self.physics_objects.len();
                } else {
                    self.physics_cursor = 0;
                }
            }
        }
        // Observer guards disconnect as the record drops here
        true
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.records.get(&id)
    }

    pub fn record_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord> {
        self.records.get_mut(&id)
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// Grid and records borrowed together for the ingest pass.
    pub fn grid_and_records_mut(&mut self) -> (&VoxelGrid, &mut ObjectMap<ObjectRecord>) {
        (&self.grid, &mut self.records)
    }

    pub fn physics_count(&self) -> usize {
        self.physics_objects.len()
    }

    /// Objects with unapplied membership changes.
    pub fn pending_voxel_updates(&self) -> usize {
        self.voxel_update_queue.len()
    }

    /// Change the voxel size and rebuild the entire grid in place.
    pub fn set_voxel_size(&mut self, voxel_size: f32) {
        self.voxel_size = voxel_size;
        self.grid.clear();
        self.voxel_update_queue.clear();

        let ids: Vec<ObjectId> = self.records.keys().copied().collect();
        for id in ids {
            let record = self.records.get_mut(&id).expect("id collected above");
            record.voxel_keys.clear();
            record.desired_voxel_keys.clear();
            desired_keys(record, voxel_size, &mut self.scratch_keys);
            for &key in &self.scratch_keys {
                self.grid.insert(key, id);
                record.voxel_keys.insert(key);
            }
        }
        log::info!(
            "voxel grid rebuilt at size {voxel_size} ({} voxels)",
            self.grid.len()
        );
    }

    /// Drain observer notifications into desired-voxel work.
    pub fn drain_changes(&mut self, camera_pos: Vec3, camera_key: VoxelKey) {
        let mut changes = std::mem::take(&mut self.scratch_changes);
        changes.clear();
        changes.extend(self.changes_rx.try_iter());
        for change in &changes {
            self.refresh_from_source(change.id, camera_pos, camera_key);
        }
        self.scratch_changes = changes;
    }

    /// Re-read pose and bounds from one object's scene source and
    /// queue membership work if anything moved.
    pub fn refresh_from_source(&mut self, id: ObjectId, camera_pos: Vec3, camera_key: VoxelKey) {
        let Some(record) = self.records.get_mut(&id) else {
            warn_missing_record(&mut self.missing_warned, "refresh", id);
            return;
        };
        let source = Rc::clone(&record.source);

        let mut changed = false;
        if let Some(pose) = source.pose() {
            if pose != record.pose {
                record.pose = pose;
                changed = true;
            }
        }
        if let Some(half) = dimensions::half_bounds_for(record.kind, source.bounds()) {
            if half != record.half_bounds {
                record.set_half_bounds(half);
                changed = true;
            }
        }
        record.distance = (record.pose.position - camera_pos).length();

        if changed {
            self.recompute_desired_voxels(id, camera_key);
        }
    }

    /// Poll physics-driven objects round-robin until the deadline.
    /// At most one full cycle per call; interrupted cycles resume where
    /// they stopped.
    pub fn poll_physics(
        &mut self,
        camera_pos: Vec3,
        camera_key: VoxelKey,
        deadline: &mut Deadline,
    ) {
        let count = self.physics_objects.len();
        let mut polled = 0;
        while polled < count && !deadline.expired() {
            let cursor = self.physics_cursor % self.physics_objects.len();
            self.physics_cursor = (cursor + 1) % self.physics_objects.len();
            let id = self.physics_objects[cursor];
            self.refresh_from_source(id, camera_pos, camera_key);
            polled += 1;
        }
    }

    /// Apply pending membership changes until the deadline. Changes
    /// for one object are applied atomically; interrupted work resumes
    /// next frame.
    pub fn drain_voxel_updates(&mut self, deadline: &mut Deadline) {
        while !self.voxel_update_queue.is_empty() && !deadline.expired() {
            let (id, _) = self.voxel_update_queue.dequeue();
            let Some(record) = self.records.get_mut(&id) else {
                warn_missing_record(&mut self.missing_warned, "voxel update", id);
                continue;
            };
            for (key, insert) in record.desired_voxel_keys.drain() {
                if insert {
                    self.grid.insert(key, id);
                    record.voxel_keys.insert(key);
                } else {
                    self.grid.remove(key, id);
                    record.voxel_keys.remove(&key);
                }
            }
        }
    }

    /// Diff desired membership against current keys and queue the
    /// pending work, keyed by camera proximity.
    fn recompute_desired_voxels(&mut self, id: ObjectId, camera_key: VoxelKey) {
        let Some(record) = self.records.get_mut(&id) else {
            warn_missing_record(&mut self.missing_warned, "recompute", id);
            return;
        };

        desired_keys(record, self.voxel_size, &mut self.scratch_keys);
        let desired = &mut self.scratch_keys;

        record.desired_voxel_keys.clear();
        for &key in record.voxel_keys.iter() {
            if let Some(pos) = desired.iter().position(|&d| d == key) {
                // Already satisfied
                desired.swap_remove(pos);
            } else {
                record.desired_voxel_keys.insert(key, false);
            }
        }
        for &key in desired.iter() {
            record.desired_voxel_keys.insert(key, true);
        }

        if record.desired_voxel_keys.is_empty() {
            return;
        }
        let center = VoxelKey::from_world(record.pose.position, self.voxel_size);
        let priority = center.manhattan(camera_key) as f64;
        self.voxel_update_queue.enqueue(id, priority);
    }

    /// Reclaim scratch capacity.
    pub fn compact(&mut self) {
        self.scratch_changes.shrink_to_fit();
        self.voxel_update_queue.shrink_to_fit();
    }
}

/// Center voxel plus, for objects larger than an eighth of a voxel,
/// the voxels containing each bounding-box corner. Deduplicated; at
/// most nine keys.
fn desired_keys(record: &ObjectRecord, voxel_size: f32, out: &mut Vec<VoxelKey>) {
    out.clear();
    out.push(VoxelKey::from_world(record.pose.position, voxel_size));
    if record.radius > voxel_size / 8.0 {
        for corner in record.corners() {
            let key = VoxelKey::from_world(corner, voxel_size);
            if !out.contains(&key) {
                out.push(key);
            }
        }
    }
}
