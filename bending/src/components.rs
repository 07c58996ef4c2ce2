//! ECS Components for grass benders.
//!
//! A bender is an entity carrying authoring data (transform, uniform scale,
//! profile, flags) and derived data (matrices, bounding sphere, cull state).
//! Derived data is only rebuilt when the matching dirty flag is set.

use crate::config::MIN_UNIFORM_SCALE;
use bevy_ecs::prelude::*;
use glam::{Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Determinant magnitude below which a bender transform is treated as singular.
pub const SINGULAR_DETERMINANT: f32 = 1e-12;

// ============================================================================
// AUTHORING COMPONENTS
// ============================================================================

/// Caller-facing identifier for a bender.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenderId(pub u32);

/// World placement of a bender volume.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenderTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BenderTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl BenderTransform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }
}

/// Multiplier applied on top of the transform scale.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformScale(pub f32);

impl Default for UniformScale {
    fn default() -> Self {
        Self(1.0)
    }
}

impl UniformScale {
    /// Scales at or below `MIN_UNIFORM_SCALE` disable the bender.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !(self.0 > MIN_UNIFORM_SCALE)
    }
}

/// Deformation profile handed to the shaders as one `float4`.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BendProfile {
    /// Resistance curve exponent near the volume limits (> 0).
    pub hardness: f32,
    /// Displacement magnitude (>= 0).
    pub power: f32,
    /// 0 = omnidirectional, 1 = fully directional.
    pub direction: f32,
    /// Turbulence amount (>= 0), useful for wind.
    pub noise: f32,
}

impl Default for BendProfile {
    fn default() -> Self {
        Self {
            hardness: 1.0,
            power: 1.0,
            direction: 0.0,
            noise: 0.0,
        }
    }
}

impl BendProfile {
    /// Profile preset for a character pushing through grass.
    pub fn character() -> Self {
        Self {
            hardness: 7.0,
            power: 3.0,
            direction: 0.9,
            noise: 0.0,
        }
    }

    /// Profile preset for a directional wind volume.
    pub fn wind() -> Self {
        Self {
            hardness: 5.0,
            power: 1.0,
            direction: 1.0,
            noise: 1.0,
        }
    }

    /// Packed as (hardness, power, direction, noise).
    #[inline]
    pub fn hpdn(&self) -> Vec4 {
        Vec4::new(self.hardness, self.power, self.direction, self.noise)
    }
}

/// Independent toggles of a bender.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenderFlags {
    /// Disabled benders stay registered but are never packed or elected.
    pub enabled: bool,
    /// Included in permanent volume map scans.
    pub permanent: bool,
}

impl Default for BenderFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            permanent: false,
        }
    }
}

// ============================================================================
// DERIVED COMPONENTS
// ============================================================================

/// Recompute requests. `matrix` implies `params`.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFlags {
    pub params: bool,
    pub matrix: bool,
}

impl Default for DirtyFlags {
    fn default() -> Self {
        Self {
            params: true,
            matrix: true,
        }
    }
}

impl DirtyFlags {
    pub fn mark(&mut self, matrix: bool) {
        self.params = true;
        self.matrix = self.matrix || matrix;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.params || self.matrix
    }

    pub fn clear(&mut self) {
        *self = Self {
            params: false,
            matrix: false,
        };
    }
}

/// GPU-facing data of one bender: both matrices and the packed profile.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct BenderData {
    pub local_to_world: Mat4,
    pub world_to_local: Mat4,
    pub hpdn: Vec4,
    /// False when the transform could not be inverted.
    pub invertible: bool,
}

impl Default for BenderData {
    fn default() -> Self {
        Self {
            local_to_world: Mat4::IDENTITY,
            world_to_local: Mat4::IDENTITY,
            hpdn: BendProfile::default().hpdn(),
            invertible: true,
        }
    }
}

impl BenderData {
    /// Rebuild both matrices. The local cube [-1,1]³ spans `scale * uniform_scale`.
    pub fn rebuild_matrices(&mut self, transform: &BenderTransform, uniform_scale: f32) {
        let local_to_world = Mat4::from_scale_rotation_translation(
            transform.scale * (uniform_scale * 0.5),
            transform.rotation,
            transform.translation,
        );
        let det = local_to_world.determinant();
        self.local_to_world = local_to_world;
        if det.is_finite() && det.abs() > SINGULAR_DETERMINANT && local_to_world.is_finite() {
            self.world_to_local = local_to_world.inverse();
            self.invertible = self.world_to_local.is_finite();
        } else {
            self.world_to_local = Mat4::IDENTITY;
            self.invertible = false;
        }
    }

    /// Is a world point inside the volume cube?
    pub fn contains_point(&self, world_point: Vec3) -> bool {
        if !self.invertible {
            return false;
        }
        let local = self.world_to_local.transform_point3(world_point);
        local.abs().cmple(Vec3::ONE).all()
    }

    /// The eight world-space corners of the volume cube.
    pub fn world_corners(&self) -> [Vec3; 8] {
        let mut corners = [Vec3::ZERO; 8];
        let mut n = 0;
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    let local = Vec3::new(
                        (i * 2 - 1) as f32,
                        (j * 2 - 1) as f32,
                        (k * 2 - 1) as f32,
                    );
                    corners[n] = self.local_to_world.transform_point3(local);
                    n += 1;
                }
            }
        }
        corners
    }
}

/// Conservative sphere around the volume, used for culling and region scans.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn from_transform(transform: &BenderTransform, uniform_scale: f32) -> Self {
        Self {
            center: transform.translation,
            radius: transform.scale.abs().max_element() * uniform_scale * 0.5,
        }
    }

    /// Distance from `point` to the sphere surface, zero when inside.
    #[inline]
    pub fn surface_distance(&self, point: Vec3) -> f32 {
        (self.center.distance(point) - self.radius).max(0.0)
    }
}

/// Distance band of a bender relative to the viewpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceBand {
    #[default]
    Near,
    Mid,
    Far,
    Beyond,
}

/// Result of the last culling pass. Stale whenever culling was not engaged.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct CullState {
    pub distance: f32,
    pub visible: bool,
    pub band: DistanceBand,
}

// ============================================================================
// BUNDLES
// ============================================================================

/// Everything a bender entity needs.
#[derive(Bundle, Default)]
pub struct BenderBundle {
    pub transform: BenderTransform,
    pub uniform_scale: UniformScale,
    pub profile: BendProfile,
    pub flags: BenderFlags,
    pub dirty: DirtyFlags,
    pub data: BenderData,
    pub sphere: BoundingSphere,
    pub cull: CullState,
}

impl BenderBundle {
    pub fn new(transform: BenderTransform, profile: BendProfile) -> Self {
        Self {
            transform,
            profile,
            ..Default::default()
        }
    }
}
