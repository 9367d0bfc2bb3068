//! World-space axis-aligned boxes
//!
//! The search works in integer key volumes; this is the world-space
//! form a volume or voxel converts into right before a plane test,
//! and the shape of the frustum's bounding box over the camera and
//! far-plane corners.

use crate::core::types::Vec3;

/// Axis-aligned box stored as its two extreme corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Tightest box covering all points. Panics on an empty slice.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut aabb = Self::new(points[0], points[0]);
        for &p in &points[1..] {
            aabb.expand(p);
        }
        aabb
    }

    /// Grow the box just enough to cover `point`.
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Midpoint of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-extents, the form the plane tests consume.
    pub fn half_extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_and_half_extent_of_a_voxel() {
        // A size-10 voxel at key (2, -1, 0)
        let aabb = Aabb::new(Vec3::new(20.0, -10.0, 0.0), Vec3::new(30.0, 0.0, 10.0));
        assert_eq!(aabb.center(), Vec3::new(25.0, -5.0, 5.0));
        assert_eq!(aabb.half_extent(), Vec3::splat(5.0));
    }

    #[test]
    fn test_from_points_plus_apex() {
        // Shape of the search's bounding volume: the four far-plane
        // corners expanded by the camera position behind them
        let mut aabb = Aabb::from_points(&[
            Vec3::new(-100.0, 100.0, -100.0),
            Vec3::new(100.0, 100.0, -100.0),
            Vec3::new(100.0, -100.0, -100.0),
            Vec3::new(-100.0, -100.0, -100.0),
        ]);
        aabb.expand(Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(aabb.min, Vec3::new(-100.0, -100.0, -100.0));
        assert_eq!(aabb.max, Vec3::new(100.0, 100.0, 10.0));
    }

    #[test]
    fn test_expand_ignores_interior_points() {
        let mut aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        aabb.expand(Vec3::splat(0.5));
        assert_eq!(aabb, Aabb::new(Vec3::ZERO, Vec3::ONE));

        aabb.expand(Vec3::new(-2.0, 3.0, 0.5));
        assert_eq!(aabb.min, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 3.0, 1.0));
    }
}
