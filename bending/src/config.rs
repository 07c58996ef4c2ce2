//! Bending configuration.
//!
//! `BendingSettings` is the only tunable surface of the core. It is inserted as a
//! resource when a `BendingWorld` is built and read by the culling and packing systems.

use crate::error::{BendingError, Result};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Default hard capacity of the packed bender arrays.
pub const BENDERS_ARRAY_SIZE: usize = 128;

/// Volumes with a uniform scale at or below this are never packed.
pub const MIN_UNIFORM_SCALE: f32 = 0.001;

/// Range offered by editor tooling for `max_active_benders`.
pub const MAX_ACTIVE_BENDERS_MIN: usize = 8;
pub const MAX_ACTIVE_BENDERS_MAX: usize = 64;

/// Shader keyword enabled when vertex bending is turned off.
pub const DISABLE_VERTEX_KEYWORD: &str = "DISABLE_GRASS_VERTEX_BEND";
/// Shader keyword enabled when permanent bending is active.
pub const PERMANENT_KEYWORD: &str = "GRASS_PERMANENT_BEND";

/// Tunables for the bender pipeline.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BendingSettings {
    /// Registry size above which culling engages. Also caps the packed count while
    /// culling is engaged.
    pub max_active_benders: usize,
    /// Effect distance. Culling bands are derived from it.
    pub max_bender_distance: f32,
    /// Hard capacity K of the packed arrays. Fixed once a world is built.
    pub array_capacity: usize,
    /// Per-frame vertex bending on/off.
    pub vertex_enabled: bool,
    /// Permanent (volume map) bending on/off.
    pub permanent_enabled: bool,
}

impl Default for BendingSettings {
    fn default() -> Self {
        Self {
            max_active_benders: MAX_ACTIVE_BENDERS_MAX,
            max_bender_distance: 200.0,
            array_capacity: BENDERS_ARRAY_SIZE,
            vertex_enabled: true,
            permanent_enabled: false,
        }
    }
}

/// Distance bands used by the visibility culler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingBands {
    pub near: f32,
    pub mid: f32,
    pub far: f32,
}

impl BendingSettings {
    /// Parse settings from JSON and validate them. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.array_capacity == 0 {
            return Err(BendingError::InvalidConfig(
                "array_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_active_benders == 0 || self.max_active_benders > self.array_capacity {
            return Err(BendingError::InvalidConfig(format!(
                "max_active_benders must be in 1..={}, got {}",
                self.array_capacity, self.max_active_benders
            )));
        }
        if !self.max_bender_distance.is_finite() || self.max_bender_distance <= 0.0 {
            return Err(BendingError::InvalidConfig(format!(
                "max_bender_distance must be positive, got {}",
                self.max_bender_distance
            )));
        }
        Ok(())
    }

    /// Near, mid and far bands: D/8, D/2 and D.
    pub fn culling_bands(&self) -> CullingBands {
        let d = self.max_bender_distance;
        CullingBands {
            near: d / 8.0,
            mid: d / 2.0,
            far: d,
        }
    }

    /// Whether culling engages for a registry of `member_count` volumes.
    #[inline]
    pub fn culling_engaged(&self, member_count: usize) -> bool {
        member_count > self.max_active_benders
    }
}
