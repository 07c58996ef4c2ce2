//! Viewpoint used as the culling reference.

use bevy_ecs::prelude::*;
use glam::{Mat4, Vec3, Vec4};

/// Six clip planes extracted from a view-projection matrix.
///
/// Each plane is stored as (normal, distance) with the normal pointing inward,
/// so a point is inside when `dot(n, p) + d >= 0` for every plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix with a [0, 1] depth range.
    pub fn from_view_projection(view_proj: Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near
            r3 - r2, // far
        ]
        .map(normalize_plane);

        Self { planes }
    }

    /// Conservative sphere test: true unless the sphere is fully outside a plane.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0 {
        plane / len
    } else {
        plane
    }
}

/// Where the bender distances are measured from.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewpoint {
    pub position: Vec3,
    /// Without a frustum every bender counts as on screen.
    pub frustum: Option<Frustum>,
}

impl Viewpoint {
    /// A viewpoint with no frustum test, distance only.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            frustum: None,
        }
    }

    pub fn from_camera(position: Vec3, view_proj: Mat4) -> Self {
        Self {
            position,
            frustum: Some(Frustum::from_view_projection(view_proj)),
        }
    }

    /// Right-handed perspective camera looking from `eye` to `target`.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        fov_y_radians: f32,
        aspect: f32,
        z_near: f32,
        z_far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let proj = Mat4::perspective_rh(fov_y_radians, aspect, z_near, z_far);
        Self::from_camera(eye, proj * view)
    }

    pub fn sees_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.frustum
            .map_or(true, |frustum| frustum.intersects_sphere(center, radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward_camera() -> Viewpoint {
        // Looking down -Z from the origin
        Viewpoint::look_at(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            1000.0,
        )
    }

    #[test]
    fn test_sphere_in_front_visible() {
        let view = forward_camera();
        assert!(view.sees_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0));
        assert!(view.sees_sphere(Vec3::new(5.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn test_sphere_behind_hidden() {
        let view = forward_camera();
        assert!(!view.sees_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
    }

    #[test]
    fn test_sphere_straddling_edge_visible() {
        let view = forward_camera();
        // 90 degree fov: the right plane passes through x = -z
        assert!(!view.sees_sphere(Vec3::new(13.0, 0.0, -10.0), 1.0));
        assert!(view.sees_sphere(Vec3::new(10.5, 0.0, -10.0), 1.0));
    }

    #[test]
    fn test_sphere_beyond_far_hidden() {
        let view = forward_camera();
        assert!(!view.sees_sphere(Vec3::new(0.0, 0.0, -2000.0), 1.0));
    }

    #[test]
    fn test_no_frustum_sees_everything() {
        let view = Viewpoint::at(Vec3::ZERO);
        assert!(view.sees_sphere(Vec3::new(0.0, 0.0, 1e6), 0.0));
    }
}
