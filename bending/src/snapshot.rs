//! Serializable view of the bending state.
//!
//! `BendingSnapshot` is what tools and tests look at: every registered bender in
//! registration order, which one is coordinator, and what the last pack wrote.

use crate::batch::GlobalShaderTable;
use crate::components::*;
use crate::registry::BenderRegistry;
use crate::systems::packing::FrameStats;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot of a single bender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenderSnapshot {
    pub id: u32,
    pub position: [f32; 3],
    pub uniform_scale: f32,
    pub enabled: bool,
    pub permanent: bool,
    pub coordinator: bool,
    /// Packable this frame (enabled, non-degenerate, invertible).
    pub packable: bool,
    pub hpdn: [f32; 4],
    /// Culling results, stale when culling did not run.
    pub distance: f32,
    pub visible: bool,
    pub band: DistanceBand,
}

/// Complete bending state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BendingSnapshot {
    /// Current tick.
    pub tick: u64,
    /// Id of the coordinating bender.
    pub coordinator: Option<u32>,
    /// Count last handed to the rendering backend.
    pub packed_count: usize,
    pub culling_engaged: bool,
    /// Registered benders in registration order.
    pub benders: Vec<BenderSnapshot>,
}

impl BendingSnapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World) -> Self {
        let stats = world.get_resource::<FrameStats>().cloned().unwrap_or_default();
        let packed_count = world
            .get_resource::<GlobalShaderTable>()
            .map(|t| t.bender_count())
            .unwrap_or(0);
        let (members, coordinator_entity) = world
            .get_resource::<BenderRegistry>()
            .map(|r| (r.members().to_vec(), r.coordinator()))
            .unwrap_or_default();

        let mut query = world.query::<(
            &BenderId,
            &BenderTransform,
            &UniformScale,
            &BenderFlags,
            &BenderData,
            &CullState,
        )>();

        let mut benders = Vec::with_capacity(members.len());
        let mut coordinator = None;
        for entity in members {
            let Ok((id, transform, scale, flags, data, cull)) = query.get(world, entity) else {
                continue;
            };
            let is_coordinator = coordinator_entity == Some(entity);
            if is_coordinator {
                coordinator = Some(id.0);
            }
            benders.push(BenderSnapshot {
                id: id.0,
                position: transform.translation.to_array(),
                uniform_scale: scale.0,
                enabled: flags.enabled,
                permanent: flags.permanent,
                coordinator: is_coordinator,
                packable: flags.enabled && !scale.is_degenerate() && data.invertible,
                hpdn: data.hpdn.to_array(),
                distance: cull.distance,
                visible: cull.visible,
                band: cull.band,
            });
        }

        Self {
            tick: stats.ticks,
            coordinator,
            packed_count,
            culling_engaged: stats.culling_engaged,
            benders,
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
