//! Object records tracked by the registry

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::types::{Pose, Vec3};
use crate::math::key::{KeyMap, KeySet};
use crate::scene::dimensions::{DimensionKind, Dimensions, ObserverGuard, SceneObject};

/// Stable handle for a registered object, issued at registration.
/// Hashing and queue dedup go through this id, never through the
/// external object reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

pub type ObjectMap<V> = FxHashMap<ObjectId, V>;
pub type ObjectSet = FxHashSet<ObjectId>;

/// Everything the scheduler knows about one registered object.
pub struct ObjectRecord {
    pub pose: Pose,
    /// Cached distance from the camera, refreshed on ingest.
    pub distance: f32,
    /// Half-extents of the local-space bounding box.
    pub half_bounds: Vec3,
    /// Largest half-extent; radius of the bounding sphere proxy.
    pub radius: f32,
    pub kind: DimensionKind,
    /// Pose must be polled; observers do not fire for this object.
    pub is_physics: bool,
    /// Voxels the object currently occupies (center plus up to 8 corners).
    pub voxel_keys: KeySet,
    /// Pending membership changes: key -> insert (true) or remove (false).
    pub desired_voxel_keys: KeyMap<bool>,
    /// Frame the object was last seen during ingest (dedup marker).
    pub last_check_frame: u64,
    /// Wall clock of the last caller-consumed update; `None` until the
    /// first yield.
    pub last_update_clock: Option<f64>,
    /// Fixed scoring offset so neighbors do not update in lockstep.
    pub jitter_offset: f64,
    /// External source for pose and bounds reads.
    pub source: Rc<dyn SceneObject>,
    /// Observer registrations; disposed when the record drops.
    pub observers: Vec<ObserverGuard>,
}

impl ObjectRecord {
    pub fn new(
        source: Rc<dyn SceneObject>,
        dimensions: Dimensions,
        jitter_offset: f64,
        is_physics: bool,
    ) -> Self {
        Self {
            pose: dimensions.pose,
            distance: 0.0,
            half_bounds: dimensions.half_bounds,
            radius: dimensions.half_bounds.max_element(),
            kind: dimensions.kind,
            is_physics,
            voxel_keys: KeySet::default(),
            desired_voxel_keys: KeyMap::default(),
            last_check_frame: 0,
            last_update_clock: None,
            jitter_offset,
            source,
            observers: Vec::new(),
        }
    }

    pub fn set_half_bounds(&mut self, half_bounds: Vec3) {
        self.half_bounds = half_bounds;
        self.radius = half_bounds.max_element();
    }

    /// World positions of the eight bounding-box corners.
    pub fn corners(&self) -> [Vec3; 8] {
        let h = self.half_bounds;
        let mut out = [Vec3::ZERO; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            let local = Vec3::new(
                if i & 1 == 0 { -h.x } else { h.x },
                if i & 2 == 0 { -h.y } else { h.y },
                if i & 4 == 0 { -h.z } else { h.z },
            );
            *corner = self.pose.transform_point(local);
        }
        out
    }
}

/// Log a missing-record lookup: once at warn, then at debug.
pub(crate) fn warn_missing_record(warned: &mut bool, context: &str, id: ObjectId) {
    if *warned {
        log::debug!("{context}: no record for {id:?}, skipping");
    } else {
        *warned = true;
        log::warn!("{context}: no record for {id:?}, skipping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Quat;
    use crate::scene::testing::TestObject;

    fn record_at(position: Vec3, full_bounds: Vec3) -> ObjectRecord {
        let source = Rc::new(TestObject::new(position, full_bounds));
        let dims = crate::scene::dimensions::resolve(source.as_ref()).unwrap();
        ObjectRecord::new(source, dims, 0.0, false)
    }

    #[test]
    fn test_radius_is_max_half_extent() {
        let record = record_at(Vec3::ZERO, Vec3::new(2.0, 8.0, 4.0));
        assert_eq!(record.radius, 4.0);
    }

    #[test]
    fn test_corners_axis_aligned() {
        let record = record_at(Vec3::new(10.0, 0.0, 0.0), Vec3::splat(2.0));
        let corners = record.corners();
        for corner in corners {
            assert!((corner.x - 10.0).abs() <= 1.0 + 1e-5);
            assert!(corner.y.abs() <= 1.0 + 1e-5);
            assert!(corner.z.abs() <= 1.0 + 1e-5);
        }
        // All corners distinct
        for i in 0..8 {
            for j in (i + 1)..8 {
                assert_ne!(corners[i], corners[j]);
            }
        }
    }

    #[test]
    fn test_corners_follow_rotation() {
        let mut record = record_at(Vec3::ZERO, Vec3::new(2.0, 0.5, 0.5));
        // 90 degrees around Y swings the long X axis onto Z
        record.pose.rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let corners = record.corners();
        for corner in corners {
            assert!(corner.z.abs() > 0.9);
            assert!(corner.x.abs() < 0.3);
        }
    }
}
