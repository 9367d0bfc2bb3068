//! Core type aliases and re-exports

pub use glam::{IVec3, Mat3, Quat, Vec3};

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Rigid transform: orientation plus position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub rotation: Quat,
    pub position: Vec3,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { rotation, position }
    }

    /// Pose at a position with identity orientation.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            rotation: Quat::IDENTITY,
            position,
        }
    }

    /// Transform a point from local space into world space.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.position
    }

    /// Forward direction (negative Z in local space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Right direction (positive X in local space).
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Up direction (positive Y in local space).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::from_position(Vec3::ZERO)
    }
}
