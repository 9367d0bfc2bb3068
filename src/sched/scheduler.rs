//! Per-frame visibility pipeline and update iterator
//!
//! The scheduler owns every subsystem and runs them in a fixed order
//! once per frame: apply pending voxel membership, poll physics
//! objects, search the frustum, ingest candidates, emit visibility
//! events, then let the dynamic-distance controller react. Callers
//! consume the result through `iterate_objects_to_update`.

use std::rc::Rc;

use crate::core::camera::CameraSource;
use crate::core::clock::{Clock, Deadline, MonotonicClock};
use crate::core::config::Config;
use crate::core::types::Result;
use crate::math::frustum::Frustum;
use crate::math::key::VoxelKey;
use crate::scene::dimensions::SceneObject;
use crate::scene::object::{ObjectId, ObjectMap};
use crate::scene::registry::ObjectRegistry;
use crate::sched::distance::DynamicDistance;
use crate::sched::events::Event;
use crate::sched::ingest::{self, IngestSinks, ScoreParams, P0_THRESHOLD, PARKED_CUTOFF};
use crate::sched::metrics::{FrameMetrics, SchedulerStats};
use crate::sched::queue::PriorityQueue;
use crate::sched::search::FrustumSearch;

/// Seconds between scratch-capacity reclamation passes.
const SHRINK_INTERVAL: f64 = 5.0;
/// Extra budget share granted to p0 objects by the iterator.
const P0_BUDGET_SCALE: f64 = 1.15;

pub struct Scheduler {
    config: Config,
    clock: Rc<dyn Clock>,
    camera: Rc<dyn CameraSource>,
    registry: ObjectRegistry,
    search: FrustumSearch,
    visible_queue: PriorityQueue<ObjectId>,
    /// Frame each object was last seen visible.
    visible_now: ObjectMap<u64>,
    distance: DynamicDistance,
    metrics: FrameMetrics,
    entered_event: Event<ObjectId>,
    exited_event: Event<ObjectId>,
    added_event: Event<ObjectId>,
    removed_event: Event<ObjectId>,
    frame: u64,
    pipeline_frame: u64,
    batch_built_frame: u64,
    tan_half_fov: f32,
    cached_fov: f32,
    paused: bool,
    last_shrink: f64,
    entered_scratch: Vec<ObjectId>,
    exited_scratch: Vec<ObjectId>,
    missing_warned: bool,
}

impl Scheduler {
    pub fn new(camera: Rc<dyn CameraSource>) -> Self {
        Self::with_config(camera, Config::default()).expect("default config is valid")
    }

    pub fn with_config(camera: Rc<dyn CameraSource>, config: Config) -> Result<Self> {
        Self::with_clock(camera, config, Rc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        camera: Rc<dyn CameraSource>,
        config: Config,
        clock: Rc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let seed = config.search_seed.unwrap_or_else(wall_clock_seed);
        let fov = camera.fov_y_degrees();
        let now = clock.now();
        Ok(Self {
            registry: ObjectRegistry::new(config.voxel_size, seed ^ 0x9e37_79b9_7f4a_7c15),
            search: FrustumSearch::new(seed),
            visible_queue: PriorityQueue::new(),
            visible_now: ObjectMap::default(),
            distance: DynamicDistance::new(config.render_distance_target),
            metrics: FrameMetrics::default(),
            entered_event: Event::new(),
            exited_event: Event::new(),
            added_event: Event::new(),
            removed_event: Event::new(),
            frame: 1,
            pipeline_frame: 0,
            batch_built_frame: 0,
            tan_half_fov: (fov.to_radians() * 0.5).tan(),
            cached_fov: fov,
            paused: false,
            last_shrink: now,
            entered_scratch: Vec::new(),
            exited_scratch: Vec::new(),
            missing_warned: false,
            config,
            clock,
            camera,
        })
    }

    // --- Registration ---

    /// Register an object whose pose changes arrive through observers.
    pub fn add_object(&mut self, object: Rc<dyn SceneObject>) -> Result<ObjectId> {
        self.add_inner(object, false)
    }

    /// Register a physics-driven object; its pose is polled each frame
    /// because observers do not reliably fire for simulated motion.
    pub fn add_physics_object(&mut self, object: Rc<dyn SceneObject>) -> Result<ObjectId> {
        self.add_inner(object, true)
    }

    fn add_inner(&mut self, object: Rc<dyn SceneObject>, is_physics: bool) -> Result<ObjectId> {
        let camera_pos = self.camera.pose().position;
        let id = self.registry.add(object, is_physics, camera_pos)?;
        self.added_event.fire(&id);
        Ok(id)
    }

    /// Unregister an object. Safe to call mid-frame: a stale handle
    /// left in the visible queue is skipped silently on dequeue.
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        if !self.registry.remove(id) {
            return false;
        }
        self.visible_queue.remove(&id);
        self.visible_now.remove(&id);
        self.removed_event.fire(&id);
        true
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.registry.contains(id)
    }

    pub fn object_count(&self) -> usize {
        self.registry.len()
    }

    // --- Frame pipeline ---

    /// Advance to the next frame and, unless deferred, run the
    /// pipeline. Call exactly once per rendered frame, before
    /// rendering begins.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        if self.paused {
            return;
        }
        if self.config.compute_visibility_only_on_demand && !self.has_visibility_listeners() {
            return;
        }
        self.run_pipeline();
    }

    fn has_visibility_listeners(&self) -> bool {
        self.entered_event.has_listeners() || self.exited_event.has_listeners()
    }

    fn ensure_pipeline(&mut self) {
        if !self.paused && self.pipeline_frame != self.frame {
            self.run_pipeline();
        }
    }

    fn run_pipeline(&mut self) {
        if self.pipeline_frame == self.frame {
            return;
        }
        self.pipeline_frame = self.frame;

        let pose = self.camera.pose();
        let fov = self.camera.fov_y_degrees();
        let aspect = self.camera.aspect();
        if fov != self.cached_fov {
            self.cached_fov = fov;
            self.tan_half_fov = (fov.to_radians() * 0.5).tan();
        }
        let camera_pos = pose.position;
        let camera_key = VoxelKey::from_world(camera_pos, self.config.voxel_size);

        // 1. Apply observed changes and pending voxel membership
        self.registry.drain_changes(camera_pos, camera_key);
        let mut micro = Deadline::new(Rc::clone(&self.clock), self.config.micro_budget);
        self.registry.drain_voxel_updates(&mut micro);

        // 2. Poll physics-driven objects
        let mut micro = Deadline::new(Rc::clone(&self.clock), self.config.micro_budget);
        self.registry.poll_physics(camera_pos, camera_key, &mut micro);

        // 3. Frustum search
        let render_distance = self.distance.render_distance();
        let far = Frustum::effective_far(fov, render_distance);
        let frustum = Frustum::from_camera(&pose, fov, aspect, far);

        let search_start = self.clock.now();
        let mut search_deadline =
            Deadline::new(Rc::clone(&self.clock), self.config.search_time_budget);
        self.search.run(
            self.registry.grid(),
            &frustum,
            camera_key,
            self.config.voxel_size,
            self.config.grace_window,
            search_start,
            &mut search_deadline,
        );
        let search_duration = self.clock.now() - search_start;

        // 4. Ingest into the visible queue's incoming batch
        self.visible_queue.clear();
        self.visible_queue.clear_incoming_batch();

        let ingest_start = self.clock.now();
        let mut ingest_deadline =
            Deadline::new(Rc::clone(&self.clock), self.config.ingest_time_budget);
        let params = ScoreParams {
            best_refresh_rate: self.config.best_refresh_rate,
            worst_refresh_rate: self.config.worst_refresh_rate,
            render_distance,
            tan_half_fov: self.tan_half_fov,
        };
        let mut entered = std::mem::take(&mut self.entered_scratch);
        entered.clear();
        let skipped_ingest = {
            let (grid, records) = self.registry.grid_and_records_mut();
            let mut sinks = IngestSinks {
                records,
                visible_now: &mut self.visible_now,
                queue: &mut self.visible_queue,
                entered: &mut entered,
                missing_warned: &mut self.missing_warned,
            };
            ingest::ingest_visible(
                self.search.visible_keys(),
                grid,
                &mut sinks,
                self.frame,
                ingest_start,
                camera_pos,
                &params,
                &mut ingest_deadline,
            )
        };
        let ingest_duration = self.clock.now() - ingest_start;

        // 5. Objects whose visibility stamp did not advance left view
        let mut exited = std::mem::take(&mut self.exited_scratch);
        exited.clear();
        let frame = self.frame;
        self.visible_now.retain(|&id, &mut seen| {
            if seen == frame {
                true
            } else {
                exited.push(id);
                false
            }
        });

        // 6. Metrics and the distance controller
        self.metrics.skipped_search.push(self.search.skipped() as f64);
        self.metrics.skipped_ingest.push(skipped_ingest as f64);
        self.metrics.last_search_duration = search_duration;
        self.metrics.last_ingest_duration = ingest_duration;
        if self.config.dynamic_render_distance {
            self.distance.update(&self.metrics, &self.config);
        }

        // 7. Periodic scratch reclamation
        let now = self.clock.now();
        if now - self.last_shrink >= SHRINK_INTERVAL {
            self.last_shrink = now;
            self.search.compact(now);
            self.visible_queue.shrink_to_fit();
            self.registry.compact();
        }

        // Events fire last, once the frame's state is consistent
        for id in &entered {
            self.entered_event.fire(id);
        }
        for id in &exited {
            self.exited_event.fire(id);
        }
        entered.clear();
        exited.clear();
        self.entered_scratch = entered;
        self.exited_scratch = exited;
    }

    // --- Queries ---

    /// Snapshot of the current frame's visible candidates, taken from
    /// the incoming batch at call time. Runs the pipeline first if it
    /// has not run this frame.
    pub fn get_visible_objects(&mut self) -> Vec<ObjectId> {
        self.ensure_pipeline();
        self.visible_queue.incoming_items().to_vec()
    }

    /// Visible voxel keys from the last pipeline run, closest first.
    pub fn visible_voxels(&self) -> &[VoxelKey] {
        self.search.visible_keys()
    }

    /// Iterate the frame's update candidates, most urgent first, under
    /// the update time budget. Yields `(object, delta_time, distance)`.
    pub fn iterate_objects_to_update(&mut self) -> UpdateIter<'_> {
        self.ensure_pipeline();
        if self.batch_built_frame != self.frame {
            self.batch_built_frame = self.frame;
            self.visible_queue.enqueue_incoming_batch();
        }
        let iter_start = self.clock.now();
        let deadline = Deadline::new(Rc::clone(&self.clock), self.config.update_time_budget);
        let p0_budget = if self.config.strictly_enforce_worst_refresh_rate {
            f64::INFINITY
        } else {
            self.config.update_time_budget * P0_BUDGET_SCALE
        };
        let p0_deadline = Deadline::new(Rc::clone(&self.clock), p0_budget);
        UpdateIter {
            scheduler: self,
            iter_start,
            deadline,
            p0_deadline,
            dt_sum: 0.0,
            dt_count: 0,
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            object_count: self.registry.len(),
            occupied_voxels: self.registry.grid().len(),
            visible_voxels: self.search.visible_keys().len(),
            search_duration: self.metrics.last_search_duration,
            ingest_duration: self.metrics.last_ingest_duration,
            avg_skipped_search: self.metrics.skipped_search.mean(),
            avg_skipped_ingest: self.metrics.skipped_ingest.mean(),
            avg_object_delta: self.metrics.object_delta.mean(),
            render_distance: self.distance.render_distance(),
        }
    }

    pub fn render_distance(&self) -> f32 {
        self.distance.render_distance()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // --- Events ---

    pub fn on_object_entered_view(&self) -> &Event<ObjectId> {
        &self.entered_event
    }

    pub fn on_object_exited_view(&self) -> &Event<ObjectId> {
        &self.exited_event
    }

    pub fn on_object_added(&self) -> &Event<ObjectId> {
        &self.added_event
    }

    pub fn on_object_removed(&self) -> &Event<ObjectId> {
        &self.removed_event
    }

    // --- Configuration setters ---

    /// Change the voxel size and rebuild the grid in place. Cached
    /// voxel visibility is keyed by the old size, so it is dropped.
    pub fn set_voxel_size(&mut self, voxel_size: f32) -> Result<()> {
        self.try_config(|config| config.voxel_size = voxel_size)?;
        self.registry.set_voxel_size(voxel_size);
        self.search.clear_cache();
        Ok(())
    }

    /// Change the target the dynamic controller steers around; the
    /// allowed band resets with it.
    pub fn set_render_distance_target(&mut self, target: f32) -> Result<()> {
        self.try_config(|config| config.render_distance_target = target)?;
        self.distance.set_target(target);
        Ok(())
    }

    /// Budgets in seconds for the search, ingest, and update phases.
    pub fn set_time_budgets(&mut self, search: f64, ingest: f64, update: f64) -> Result<()> {
        self.try_config(|config| {
            config.search_time_budget = search;
            config.ingest_time_budget = ingest;
            config.update_time_budget = update;
        })
    }

    /// Refresh band as periods in seconds; values above 2 are taken as
    /// Hz and inverted.
    pub fn set_refresh_rates(&mut self, best: f64, worst: f64) -> Result<()> {
        let best = Config::normalize_refresh_rate(best);
        let worst = Config::normalize_refresh_rate(worst);
        self.try_config(|config| {
            config.best_refresh_rate = best;
            config.worst_refresh_rate = worst;
        })
    }

    pub fn set_compute_visibility_only_on_demand(&mut self, enabled: bool) {
        self.config.compute_visibility_only_on_demand = enabled;
    }

    pub fn set_strictly_enforce_worst_refresh_rate(&mut self, enabled: bool) {
        self.config.strictly_enforce_worst_refresh_rate = enabled;
    }

    pub fn set_dynamic_render_distance(&mut self, enabled: bool) {
        self.config.dynamic_render_distance = enabled;
    }

    /// Halt the per-frame pipeline without dropping registrations.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Apply a mutation to a config copy, validate, then commit.
    fn try_config(&mut self, mutate: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = self.config.clone();
        mutate(&mut config);
        config.validate()?;
        self.config = config;
        Ok(())
    }
}

fn wall_clock_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed)
}

/// Budgeted iterator over the frame's update candidates.
///
/// Advances each yielded object's `last_update_clock` before the yield
/// and clears the queue when a budget cuts iteration short, so a
/// second call within the same frame yields nothing.
pub struct UpdateIter<'a> {
    scheduler: &'a mut Scheduler,
    iter_start: f64,
    deadline: Deadline,
    p0_deadline: Deadline,
    dt_sum: f64,
    dt_count: u32,
}

impl Iterator for UpdateIter<'_> {
    type Item = (ObjectId, f64, f32);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let priority = self.scheduler.visible_queue.peek_priority()?;
            if priority >= PARKED_CUTOFF {
                // Everything from here on was updated recently enough
                self.scheduler.visible_queue.clear();
                return None;
            }
            let out_of_budget = if priority < P0_THRESHOLD {
                self.p0_deadline.expired()
            } else {
                self.deadline.expired()
            };
            if out_of_budget {
                self.scheduler.visible_queue.clear();
                return None;
            }

            let (id, _) = self.scheduler.visible_queue.dequeue();
            let Some(record) = self.scheduler.registry.record_mut(id) else {
                // Removed mid-frame; skip silently
                continue;
            };
            let dt = record
                .last_update_clock
                .map(|t| self.iter_start - t)
                .unwrap_or(0.0);
            record.last_update_clock = Some(self.iter_start);
            let distance = record.distance;

            // Outliers were out of view for a while; keep them out of
            // the refresh metric
            if dt < 1.0 {
                self.dt_sum += dt;
                self.dt_count += 1;
            }
            return Some((id, dt, distance));
        }
    }
}

impl Drop for UpdateIter<'_> {
    fn drop(&mut self) {
        if self.dt_count > 0 {
            self.scheduler
                .metrics
                .object_delta
                .push(self.dt_sum / self.dt_count as f64);
        }
    }
}
