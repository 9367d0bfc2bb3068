//! View frustum for voxel culling
//!
//! Five planes: left, right, top, bottom, far. There is no near plane;
//! geometry behind the camera fails the side-plane tests instead.
//! Plane normals face out of the view volume.

use crate::core::types::{Pose, Vec3};

const PLANE_EPSILON: f32 = 1e-4;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Plane through `point` with the given normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            distance: -point.dot(normal),
        }
    }

    /// Signed distance from point to plane (positive = outside)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// How a box relates to the frustum volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Containment {
    Outside,
    Partial,
    Inside,
}

/// View frustum bounded by four side planes and the far plane.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 5],
    /// Camera position the planes were built from.
    pub apex: Vec3,
    /// Corners of the far plane in world space.
    pub far_corners: [Vec3; 4],
}

impl Frustum {
    /// Build the frustum from camera geometry. `far` is the effective
    /// render distance.
    pub fn from_camera(pose: &Pose, fov_y_degrees: f32, aspect: f32, far: f32) -> Self {
        let forward = pose.forward();
        let right = pose.right();
        let up = pose.up();

        let half_h = far * (fov_y_degrees.to_radians() * 0.5).tan();
        let half_w = half_h * aspect;
        let apex = pose.position;
        let far_center = apex + forward * far;

        let top_left = far_center + up * half_h - right * half_w;
        let top_right = far_center + up * half_h + right * half_w;
        let bottom_right = far_center - up * half_h + right * half_w;
        let bottom_left = far_center - up * half_h - right * half_w;

        let planes = [
            side_plane(apex, bottom_left, top_left, far_center),
            side_plane(apex, top_right, bottom_right, far_center),
            side_plane(apex, top_left, top_right, far_center),
            side_plane(apex, bottom_right, bottom_left, far_center),
            Plane::from_point_normal(far_center, forward),
        ];

        Self {
            planes,
            apex,
            far_corners: [top_left, top_right, bottom_right, bottom_left],
        }
    }

    /// Effective render distance: narrow fields of view see farther.
    pub fn effective_far(fov_y_degrees: f32, render_distance: f32) -> f32 {
        if fov_y_degrees < 60.0 {
            render_distance * (2.0 - fov_y_degrees / 60.0)
        } else {
            render_distance
        }
    }

    /// Check if point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|p| p.distance_to_point(point) <= PLANE_EPSILON)
    }

    /// Conservative box-vs-frustum intersection test.
    pub fn intersects_box(&self, center: Vec3, half_extent: Vec3) -> bool {
        for plane in &self.planes {
            if plane.distance_to_point(center) > projected_radius(half_extent, plane) + PLANE_EPSILON
            {
                return false;
            }
        }
        true
    }

    /// Classify a box against the frustum: outside, partially inside,
    /// or completely inside.
    pub fn classify_box(&self, center: Vec3, half_extent: Vec3) -> Containment {
        let mut inside = true;
        for plane in &self.planes {
            let d = plane.distance_to_point(center);
            let r = projected_radius(half_extent, plane);
            if d > r + PLANE_EPSILON {
                return Containment::Outside;
            }
            if d + r > PLANE_EPSILON {
                inside = false;
            }
        }
        if inside {
            Containment::Inside
        } else {
            Containment::Partial
        }
    }
}

/// Projection of the half-extents onto the plane normal.
#[inline]
fn projected_radius(half_extent: Vec3, plane: &Plane) -> f32 {
    half_extent.x * plane.normal.x.abs()
        + half_extent.y * plane.normal.y.abs()
        + half_extent.z * plane.normal.z.abs()
}

/// Side plane through the apex and two far corners, oriented away
/// from the view volume.
fn side_plane(apex: Vec3, a: Vec3, b: Vec3, inside_ref: Vec3) -> Plane {
    let mut normal = (a - apex).cross(b - apex).normalize();
    if normal.dot(inside_ref - apex) > 0.0 {
        normal = -normal;
    }
    Plane::from_point_normal(apex, normal)
}
