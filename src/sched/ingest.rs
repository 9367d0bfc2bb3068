//! Candidate scoring and ingest
//!
//! Turns the frame's visible voxels into a prioritized batch on the
//! visible-objects queue. Scoring is tiered: objects inside their best
//! refresh interval are parked, objects past their worst interval (or
//! never updated) are p0, near-camera objects jump the line, and the
//! rest blend screen size, staleness, and distance.

use crate::core::clock::Deadline;
use crate::core::types::Vec3;
use crate::math::key::VoxelKey;
use crate::scene::object::{warn_missing_record, ObjectId, ObjectMap, ObjectRecord};
use crate::sched::queue::PriorityQueue;
use crate::voxel::grid::VoxelGrid;

/// Priorities below this are p0: past their worst refresh rate or
/// hugging the camera.
pub const P0_THRESHOLD: f64 = 0.90;

/// Scale factor parking objects inside their best refresh interval.
const PARKED_SCALE: f64 = 1_000_000.0;

/// Priorities at or above this are parked; the update iterator stops
/// there. Mid-tier scores top out near 100 and synthetic fast-ingest
/// priorities are clamped below this value.
pub const PARKED_CUTOFF: f64 = 10_000.0;

/// Objects closer than this (world units) jump the priority line.
pub const NEARBY_DISTANCE: f32 = 30.0;

/// Blend weights for the mid-tier priority formula.
pub const WEIGHT_SCREEN_SIZE: f64 = 85.0;
pub const WEIGHT_REFRESH: f64 = 13.0;
pub const WEIGHT_DISTANCE: f64 = 2.0;

/// Base for synthetic fast-ingest priorities; ranks after every scored
/// candidate while preserving the voxels' spatial order.
const FAST_INGEST_BASE: f64 = 100.0;

/// Scoring inputs fixed for one frame.
#[derive(Clone, Copy, Debug)]
pub struct ScoreParams {
    pub best_refresh_rate: f64,
    pub worst_refresh_rate: f64,
    pub render_distance: f32,
    pub tan_half_fov: f32,
}

/// Approximate fraction of the viewport height subtended by a bounding
/// sphere of `radius` at `distance`.
pub fn screen_size(radius: f32, distance: f32, tan_half_fov: f32) -> f64 {
    ((radius / distance.max(1e-6)) / tan_half_fov) as f64
}

/// Tiered priority: smaller = more urgent. `elapsed` is `None` for an
/// object that has never been yielded.
pub fn priority(elapsed: Option<f64>, screen_size: f64, distance: f32, params: &ScoreParams) -> f64 {
    let Some(elapsed) = elapsed else {
        // Never updated: maximally stale
        return P0_THRESHOLD - screen_size;
    };
    if elapsed <= params.best_refresh_rate {
        return (1.0 - screen_size) * PARKED_SCALE;
    }
    if elapsed >= params.worst_refresh_rate {
        return P0_THRESHOLD - screen_size;
    }
    if distance < NEARBY_DISTANCE {
        return (distance / NEARBY_DISTANCE) as f64;
    }
    let band = params.worst_refresh_rate - params.best_refresh_rate;
    let refresh_progress = (elapsed - params.best_refresh_rate) / band;
    WEIGHT_SCREEN_SIZE * (1.0 - screen_size)
        + WEIGHT_REFRESH * (1.0 - refresh_progress)
        + WEIGHT_DISTANCE * (distance as f64 / params.render_distance.max(1e-6) as f64)
}

/// Mutable pipeline state the ingest pass writes into.
pub struct IngestSinks<'a> {
    pub records: &'a mut ObjectMap<ObjectRecord>,
    /// Frame each object was last seen visible; drives enter/exit events.
    pub visible_now: &'a mut ObjectMap<u64>,
    pub queue: &'a mut PriorityQueue<ObjectId>,
    /// Objects first seen visible this frame.
    pub entered: &'a mut Vec<ObjectId>,
    pub missing_warned: &'a mut bool,
}

/// Walk the visible voxels in order and stage prioritized candidates
/// on the queue's incoming batch. Returns the number of voxels that
/// had to be fast-ingested after the deadline passed.
#[allow(clippy::too_many_arguments)]
pub fn ingest_visible(
    visible: &[VoxelKey],
    grid: &VoxelGrid,
    sinks: &mut IngestSinks<'_>,
    frame: u64,
    now: f64,
    camera_pos: Vec3,
    params: &ScoreParams,
    deadline: &mut Deadline,
) -> u32 {
    let mut skipped = 0u32;

    for (voxel_index, &key) in visible.iter().enumerate() {
        if deadline.expired() {
            skipped = fast_ingest(&visible[voxel_index..], voxel_index, grid, sinks, frame);
            break;
        }
        let Some(objects) = grid.voxel_at(key) else {
            continue;
        };
        for &id in objects {
            let Some(record) = sinks.records.get_mut(&id) else {
                warn_missing_record(sinks.missing_warned, "ingest", id);
                continue;
            };
            // Objects straddling voxels appear in several lists
            if record.last_check_frame == frame {
                continue;
            }
            record.last_check_frame = frame;

            let distance = (record.pose.position - camera_pos).length();
            record.distance = distance;
            if distance > params.render_distance {
                continue;
            }

            let size = screen_size(record.radius, distance, params.tan_half_fov);
            let elapsed = record.last_update_clock.map(|t| now - t + record.jitter_offset);
            let p = priority(elapsed, size, distance, params);

            if sinks.visible_now.insert(id, frame).is_none() {
                sinks.entered.push(id);
            }
            sinks.queue.add_to_incoming_batch(id, p);
        }
    }

    skipped
}

/// Budget fallback: enqueue everything left with synthetic priorities
/// derived from the voxel order, skipping the per-object scoring.
fn fast_ingest(
    remaining: &[VoxelKey],
    first_index: usize,
    grid: &VoxelGrid,
    sinks: &mut IngestSinks<'_>,
    frame: u64,
) -> u32 {
    for (offset, &key) in remaining.iter().enumerate() {
        let Some(objects) = grid.voxel_at(key) else {
            continue;
        };
        let synthetic =
            (FAST_INGEST_BASE + (first_index + offset) as f64).min(PARKED_CUTOFF - 1.0);
        for &id in objects {
            let Some(record) = sinks.records.get_mut(&id) else {
                warn_missing_record(sinks.missing_warned, "fast ingest", id);
                continue;
            };
            if record.last_check_frame == frame {
                continue;
            }
            record.last_check_frame = frame;

            if sinks.visible_now.insert(id, frame).is_none() {
                sinks.entered.push(id);
            }
            sinks.queue.add_to_incoming_batch(id, synthetic);
        }
    }
    remaining.len() as u32
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn params() -> ScoreParams {
        ScoreParams {
            best_refresh_rate: 1.0 / 60.0,
            worst_refresh_rate: 1.0 / 15.0,
            render_distance: 400.0,
            tan_half_fov: (60.0f32.to_radians() * 0.5).tan(),
        }
    }

    #[test]
    fn test_screen_size_shrinks_with_distance() {
        let p = params();
        let near = screen_size(2.0, 10.0, p.tan_half_fov);
        let far = screen_size(2.0, 100.0, p.tan_half_fov);
        assert!(near > far);
        assert_abs_diff_eq!(near / far, 10.0, epsilon = 1e-3);
    }

    #[test]
    fn test_parked_tier() {
        let p = params();
        let v = priority(Some(0.001), 0.1, 100.0, &p);
        assert!(v >= PARKED_SCALE * 0.5);
    }

    #[test]
    fn test_p0_tier_past_worst() {
        let p = params();
        let v = priority(Some(1.0), 0.2, 100.0, &p);
        assert_abs_diff_eq!(v, P0_THRESHOLD - 0.2, epsilon = 1e-9);
        assert!(v < P0_THRESHOLD);
    }

    #[test]
    fn test_never_updated_is_p0() {
        let p = params();
        let v = priority(None, 0.2, 100.0, &p);
        assert!(v < P0_THRESHOLD);
    }

    #[test]
    fn test_nearby_tier_beats_mid_tier() {
        let p = params();
        let elapsed = Some(0.03); // between best and worst
        let near = priority(elapsed, 0.001, 5.0, &p);
        let far = priority(elapsed, 0.8, 200.0, &p);
        assert!(near < far);
    }

    #[test]
    fn test_mid_tier_screen_size_monotonicity() {
        let p = params();
        let elapsed = Some(0.03);
        let mut last = f64::INFINITY;
        for i in 1..20 {
            let size = i as f64 * 0.05;
            let v = priority(elapsed, size, 100.0, &p);
            assert!(v < last, "priority must drop as screen size grows");
            last = v;
        }
    }

    #[test]
    fn test_mid_tier_staleness_monotonicity() {
        let p = params();
        let mut last = f64::INFINITY;
        let band = p.worst_refresh_rate - p.best_refresh_rate;
        for i in 1..20 {
            let elapsed = p.best_refresh_rate + band * (i as f64 / 20.0);
            let v = priority(Some(elapsed), 0.1, 100.0, &p);
            assert!(v < last, "priority must drop as staleness grows");
            last = v;
        }
    }

    #[test]
    fn test_mid_tier_weights_sum() {
        let p = params();
        // Smallest screen size, freshest, farthest: close to the
        // weight ceiling
        let v = priority(
            Some(p.best_refresh_rate + 1e-9),
            0.0,
            p.render_distance,
            &p,
        );
        assert!(v <= WEIGHT_SCREEN_SIZE + WEIGHT_REFRESH + WEIGHT_DISTANCE + 1e-6);
        assert!(v > WEIGHT_SCREEN_SIZE);
    }
}
