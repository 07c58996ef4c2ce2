//! Bounded packing of the draw order into the global bender arrays.
//!
//! ## Data Access
//! - `pack_benders_system`: reads DrawOrder, BendingSettings and bender data,
//!   writes FrameBatch and FrameStats.
//! - `upload_benders_system`: reads FrameBatch, writes GlobalShaderTable and the
//!   optional ExternalShaderBackend.
//!
//! Both run strictly after culling and sorting, once per coordinated frame.

use crate::batch::{ExternalShaderBackend, GlobalShaderTable, PackedBatch, ShaderGlobals};
use crate::components::*;
use crate::config::{BendingSettings, DISABLE_VERTEX_KEYWORD, PERMANENT_KEYWORD};
use crate::permanent::PermanentVolume;
use crate::systems::culling::DrawOrder;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Global bender arrays, created on the first pack.
#[derive(Resource, Debug, Default)]
pub struct FrameBatch(pub Option<PackedBatch>);

/// Counters describing the pipeline's recent activity.
#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Ticks stepped by the world.
    pub ticks: u64,
    /// Pipeline passes that packed and uploaded the global arrays.
    pub frames_packed: u64,
    /// Tick of the last pipeline pass.
    pub last_packed_tick: Option<u64>,
    /// Whether culling engaged on the last pass.
    pub culling_engaged: bool,
    /// Benders written on the last pass.
    pub last_packed: usize,
}

/// The parts of a bender the packers look at.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub flags: &'a BenderFlags,
    pub scale: UniformScale,
    pub data: &'a BenderData,
    pub sphere: BoundingSphere,
    pub visible: bool,
}

impl Candidate<'_> {
    /// Enabled, not scaled to nothing and with a usable inverse.
    #[inline]
    pub fn is_packable(&self) -> bool {
        self.flags.enabled && !self.scale.is_degenerate() && self.data.invertible
    }
}

/// Pack candidates in the given order until `cap` slots are used.
///
/// Returns the resulting count. The first `count` slots mirror, in order, the
/// first `count` qualifying candidates.
pub fn pack_ordered<'a>(
    batch: &mut PackedBatch,
    cap: usize,
    require_visible: bool,
    candidates: impl IntoIterator<Item = Candidate<'a>>,
) -> usize {
    batch.reset();
    let cap = cap.min(batch.capacity());
    if cap == 0 {
        return 0;
    }
    for candidate in candidates {
        if !candidate.is_packable() || (require_visible && !candidate.visible) {
            continue;
        }
        batch.push(candidate.data);
        if batch.count() >= cap {
            break;
        }
    }
    batch.count()
}

/// System that packs the current draw order into the global arrays.
///
/// While culling is engaged only visible benders qualify and the count is
/// capped at `max_active_benders`; otherwise the cap is the array capacity.
pub fn pack_benders_system(
    settings: Res<BendingSettings>,
    order: Res<DrawOrder>,
    mut frame_batch: ResMut<FrameBatch>,
    mut stats: ResMut<FrameStats>,
    benders: Query<(
        &BenderFlags,
        &UniformScale,
        &BenderData,
        &BoundingSphere,
        &CullState,
    )>,
) {
    let batch = frame_batch
        .0
        .get_or_insert_with(|| PackedBatch::with_capacity(settings.array_capacity));

    let cap = if order.culled {
        settings.max_active_benders
    } else {
        batch.capacity()
    };

    let candidates = order.entities.iter().filter_map(|&e| {
        benders
            .get(e)
            .ok()
            .map(|(flags, scale, data, sphere, cull)| Candidate {
                flags,
                scale: *scale,
                data,
                sphere: *sphere,
                visible: cull.visible,
            })
    });
    let count = pack_ordered(batch, cap, order.culled, candidates);

    debug!(count, culled = order.culled, "packed bender arrays");
    stats.frames_packed += 1;
    stats.last_packed_tick = Some(stats.ticks);
    stats.culling_engaged = order.culled;
    stats.last_packed = count;
}

/// System that hands the packed arrays to the rendering backend.
pub fn upload_benders_system(
    frame_batch: Res<FrameBatch>,
    mut table: ResMut<GlobalShaderTable>,
    external: Option<ResMut<ExternalShaderBackend>>,
) {
    let Some(batch) = frame_batch.0.as_ref() else {
        return;
    };
    batch.upload(&mut *table);
    if let Some(mut external) = external {
        batch.upload(external.0.as_mut());
    }
}

/// Last keyword state pushed to the backend.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeywordState(pub Option<(bool, bool)>);

/// Resolve (vertex, permanent) bending from settings and volume overrides.
///
/// Vertex bending needs the global toggle and no volume disabling it.
/// Permanent bending needs the global toggle and a volume that allows it.
pub fn resolve_keywords<'a>(
    settings: &BendingSettings,
    volumes: impl IntoIterator<Item = &'a PermanentVolume>,
) -> (bool, bool) {
    let mut vertex = settings.vertex_enabled;
    let mut permanent = false;
    for volume in volumes {
        vertex &= !volume.disable_vertex;
        permanent |= !volume.disable_permanent;
    }
    (vertex, permanent && settings.permanent_enabled)
}

pub fn apply_keywords(globals: &mut dyn ShaderGlobals, vertex: bool, permanent: bool) {
    globals.set_keyword(DISABLE_VERTEX_KEYWORD, !vertex);
    globals.set_keyword(PERMANENT_KEYWORD, permanent);
}

/// System that keeps the bending shader keywords in sync. Only uploads on change.
pub fn shader_keyword_system(
    settings: Res<BendingSettings>,
    volumes: Query<&PermanentVolume>,
    mut state: ResMut<KeywordState>,
    mut table: ResMut<GlobalShaderTable>,
    external: Option<ResMut<ExternalShaderBackend>>,
) {
    let resolved = resolve_keywords(&settings, volumes.iter());
    if state.0 == Some(resolved) {
        return;
    }
    state.0 = Some(resolved);

    let (vertex, permanent) = resolved;
    debug!(vertex, permanent, "bending keywords changed");
    apply_keywords(&mut *table, vertex, permanent);
    if let Some(mut external) = external {
        apply_keywords(external.0.as_mut(), vertex, permanent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3, Vec4};

    fn bender(x: f32) -> (BenderFlags, UniformScale, BenderData) {
        let data = BenderData {
            local_to_world: Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
            world_to_local: Mat4::from_translation(Vec3::new(-x, 0.0, 0.0)),
            hpdn: Vec4::new(x, 0.0, 0.0, 0.0),
            invertible: true,
        };
        (BenderFlags::default(), UniformScale(1.0), data)
    }

    fn candidate<'a>(b: &'a (BenderFlags, UniformScale, BenderData), visible: bool) -> Candidate<'a> {
        Candidate {
            flags: &b.0,
            scale: b.1,
            data: &b.2,
            sphere: BoundingSphere::default(),
            visible,
        }
    }

    #[test]
    fn test_pack_preserves_order_and_caps() {
        let benders: Vec<_> = (0..5).map(|i| bender(i as f32)).collect();
        let mut batch = PackedBatch::with_capacity(8);

        let count = pack_ordered(&mut batch, 3, false, benders.iter().map(|b| candidate(b, true)));
        assert_eq!(count, 3);
        let xs: Vec<f32> = batch.hpdn().iter().map(|v| v.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_pack_skips_unqualified() {
        let mut benders: Vec<_> = (0..4).map(|i| bender(i as f32)).collect();
        benders[0].0.enabled = false;
        benders[1].1 = UniformScale(0.0005);
        benders[2].2.invertible = false;
        let mut batch = PackedBatch::with_capacity(8);

        let count = pack_ordered(&mut batch, 8, false, benders.iter().map(|b| candidate(b, true)));
        assert_eq!(count, 1);
        assert_eq!(batch.hpdn()[0].x, 3.0);
    }

    #[test]
    fn test_pack_visibility_only_when_required() {
        let benders: Vec<_> = (0..3).map(|i| bender(i as f32)).collect();
        let mut batch = PackedBatch::with_capacity(8);

        let hidden = || benders.iter().map(|b| candidate(b, false));
        assert_eq!(pack_ordered(&mut batch, 8, true, hidden()), 0);
        assert_eq!(pack_ordered(&mut batch, 8, false, hidden()), 3);
    }

    #[test]
    fn test_pack_cap_never_exceeds_capacity() {
        let benders: Vec<_> = (0..10).map(|i| bender(i as f32)).collect();
        let mut batch = PackedBatch::with_capacity(4);
        let count = pack_ordered(&mut batch, 100, false, benders.iter().map(|b| candidate(b, true)));
        assert_eq!(count, 4);
    }

    #[test]
    fn test_resolve_keywords() {
        let settings = BendingSettings {
            permanent_enabled: true,
            ..Default::default()
        };
        assert_eq!(resolve_keywords(&settings, []), (true, false));

        let mut volume = PermanentVolume::new(Vec3::ZERO, Vec3::ONE, glam::UVec3::ONE);
        assert_eq!(resolve_keywords(&settings, [&volume]), (true, true));

        volume.disable_vertex = true;
        volume.disable_permanent = true;
        assert_eq!(resolve_keywords(&settings, [&volume]), (false, false));

        let off = BendingSettings::default();
        volume.disable_permanent = false;
        assert_eq!(resolve_keywords(&off, [&volume]), (false, false));
    }
}
