//! Camera interface for visibility queries

use std::cell::Cell;

use crate::core::types::{Pose, Vec3};

/// Source of the viewing camera's state, read once per frame.
///
/// The scheduler caches `tan(fov/2)` and refreshes it when the
/// reported field of view changes.
pub trait CameraSource {
    /// Current camera pose in world space.
    fn pose(&self) -> Pose;
    /// Vertical field of view in degrees.
    fn fov_y_degrees(&self) -> f32;
    /// Viewport aspect ratio (width / height).
    fn aspect(&self) -> f32;
}

/// Plain camera with settable state; the simplest `CameraSource`.
///
/// Fields are interior-mutable so callers can share it with the
/// scheduler through an `Rc` and still move it every frame.
pub struct FixedCamera {
    pose: Cell<Pose>,
    fov_y_degrees: Cell<f32>,
    aspect: Cell<f32>,
}

impl FixedCamera {
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            pose: Cell::new(Pose::from_position(position)),
            fov_y_degrees: Cell::new(fov_y_degrees),
            aspect: Cell::new(aspect),
        }
    }

    /// Camera at `position` looking at `target`, world up.
    pub fn look_at(position: Vec3, target: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        let forward = (target - position).normalize();
        let right = forward.cross(Vec3::Y).normalize();
        let up = right.cross(forward);
        let rotation =
            glam::Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward));

        let camera = Self::new(position, fov_y_degrees, aspect);
        camera.pose.set(Pose::new(position, rotation));
        camera
    }

    pub fn set_pose(&self, pose: Pose) {
        self.pose.set(pose);
    }

    pub fn set_position(&self, position: Vec3) {
        let mut pose = self.pose.get();
        pose.position = position;
        self.pose.set(pose);
    }

    pub fn set_fov_y_degrees(&self, fov: f32) {
        self.fov_y_degrees.set(fov);
    }

    pub fn set_aspect(&self, aspect: f32) {
        self.aspect.set(aspect);
    }
}

impl CameraSource for FixedCamera {
    fn pose(&self) -> Pose {
        self.pose.get()
    }

    fn fov_y_degrees(&self) -> f32 {
        self.fov_y_degrees.get()
    }

    fn aspect(&self) -> f32 {
        self.aspect.get()
    }
}
