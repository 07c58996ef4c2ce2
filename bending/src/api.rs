//! Public API for the bending core.
//!
//! `BendingWorld` is the main interface for a renderer (or any other host) to
//! drive grass benders: spawn and move volumes, place the viewpoint, step once
//! per rendered frame and read back what was packed.
//!
//! ## Tick Structure
//!
//! Every `step()` runs three schedules:
//! 1. **Update** - dirty tracking, derived data refresh, registry sweep
//! 2. **Pipeline** - cull, sort, pack, upload; only when a coordinator exists or
//!    a final flush is owed
//! 3. **Permanent** - permanent volume jobs and shader keywords

use crate::batch::{ExternalShaderBackend, GlobalShaderTable, PackedBatch, ShaderGlobals};
use crate::components::*;
use crate::config::BendingSettings;
use crate::error::{BendingError, Result};
use crate::permanent::{PermanentVolume, RasterBackend, VolumeRaster};
use crate::registry::{registry_maintenance_system, BenderRegistry};
use crate::snapshot::BendingSnapshot;
use crate::systems::*;
use crate::viewpoint::Viewpoint;
use bevy_ecs::prelude::*;
use glam::Vec3;
use std::collections::HashMap;
use tracing::{info, warn};

/// The bending world container.
///
/// Holds the ECS world and schedules, providing a clean API for:
/// - Registering and updating bender volumes
/// - Stepping the pipeline once per frame
/// - Reading back packed arrays and snapshots
pub struct BendingWorld {
    world: World,
    update: Schedule,
    pipeline: Schedule,
    permanent: Schedule,
    /// Bender id to entity.
    index: HashMap<BenderId, Entity>,
}

impl BendingWorld {
    /// Create a world with default settings.
    pub fn new() -> Self {
        Self::build(BendingSettings::default())
    }

    /// Create a world with custom settings. Fails if they do not validate.
    pub fn with_settings(settings: BendingSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::build(settings))
    }

    fn build(settings: BendingSettings) -> Self {
        info!(
            capacity = settings.array_capacity,
            max_active = settings.max_active_benders,
            "creating bending world"
        );

        let mut world = World::new();
        world.insert_resource(settings);
        world.insert_resource(BenderRegistry::new());
        world.insert_resource(Viewpoint::default());
        world.insert_resource(DrawOrder::default());
        world.insert_resource(FrameBatch::default());
        world.insert_resource(FrameStats::default());
        world.insert_resource(GlobalShaderTable::default());
        world.insert_resource(KeywordState::default());

        let mut update = Schedule::default();
        update.add_systems(
            (
                mark_dirty_system,
                refresh_bender_data_system,
                registry_maintenance_system,
            )
                .chain(),
        );

        // Strict order: the batch has exactly one writer per pass
        let mut pipeline = Schedule::default();
        pipeline.add_systems(
            (
                cull_benders_system,
                sort_benders_system,
                pack_benders_system,
                upload_benders_system,
            )
                .chain(),
        );

        let mut permanent = Schedule::default();
        permanent.add_systems((permanent_volume_system, shader_keyword_system).chain());

        Self {
            world,
            update,
            pipeline,
            permanent,
            index: HashMap::new(),
        }
    }

    /// Advance one frame.
    pub fn step(&mut self) {
        if let Some(mut stats) = self.world.get_resource_mut::<FrameStats>() {
            stats.ticks += 1;
        }

        self.update.run(&mut self.world);

        let turn = self
            .world
            .get_resource_mut::<BenderRegistry>()
            .map(|mut registry| registry.take_frame_turn())
            .unwrap_or(false);
        if turn {
            self.pipeline.run(&mut self.world);
        }

        self.permanent.run(&mut self.world);
    }

    /// Run one pipeline pass right now, coordinator or not.
    ///
    /// Derived data is refreshed first. With no packable members the pass packs
    /// count 0 and still hands off.
    pub fn run_frame(&mut self) {
        self.update.run(&mut self.world);
        self.pipeline.run(&mut self.world);
    }

    // ========================================================================
    // BENDERS
    // ========================================================================

    /// Activate a bender and register it.
    ///
    /// An id that is already live keeps its entity; its transform and profile
    /// are replaced.
    pub fn spawn_bender(&mut self, id: u32, transform: BenderTransform, profile: BendProfile) -> Entity {
        let id = BenderId(id);
        if let Some(&entity) = self.index.get(&id) {
            self.set_transform(id.0, transform);
            self.set_profile(id.0, profile);
            return entity;
        }

        let entity = self
            .world
            .spawn((id, BenderBundle::new(transform, profile)))
            .id();
        self.index.insert(id, entity);
        if let Some(mut registry) = self.world.get_resource_mut::<BenderRegistry>() {
            registry.register(entity, true);
        }
        entity
    }

    /// Deactivate a bender: deregister and despawn it. Returns false for unknown ids.
    pub fn despawn_bender(&mut self, id: u32) -> bool {
        let Some(entity) = self.index.remove(&BenderId(id)) else {
            return false;
        };
        self.world.despawn(entity);

        let world = &mut self.world;
        if world.contains_resource::<BenderRegistry>() {
            world.resource_scope(|world, mut registry: Mut<BenderRegistry>| {
                registry.deregister(entity, |e| is_enabled(world, e));
            });
        }
        true
    }

    /// Despawn every bender. The next step flushes the packed arrays to zero.
    pub fn clear_benders(&mut self) {
        let ids: Vec<u32> = self.index.keys().map(|id| id.0).collect();
        for id in ids {
            self.despawn_bender(id);
        }
    }

    /// Toggle a bender. Disabled benders stay registered but are not packed.
    pub fn set_enabled(&mut self, id: u32, enabled: bool) -> bool {
        let Some(entity) = self.entity(id) else {
            return false;
        };
        let Some(mut flags) = self.world.get_mut::<BenderFlags>(entity) else {
            return false;
        };
        flags.enabled = enabled;

        let world = &mut self.world;
        if world.contains_resource::<BenderRegistry>() {
            world.resource_scope(|world, mut registry: Mut<BenderRegistry>| {
                let is_enabled = |e: Entity| is_enabled(world, e);
                if enabled {
                    registry.elect(is_enabled);
                } else {
                    registry.revoke_if(|e| e == entity, is_enabled);
                }
            });
        }
        true
    }

    /// Mark a bender for permanent volume scans.
    pub fn set_permanent(&mut self, id: u32, permanent: bool) -> bool {
        self.entity(id)
            .and_then(|e| self.world.get_mut::<BenderFlags>(e))
            .map(|mut flags| flags.permanent = permanent)
            .is_some()
    }

    pub fn set_transform(&mut self, id: u32, transform: BenderTransform) -> bool {
        self.update_component(id, true, |mut t: Mut<BenderTransform>| {
            t.set_if_neq(transform)
        })
    }

    pub fn set_uniform_scale(&mut self, id: u32, scale: f32) -> bool {
        self.update_component(id, true, |mut s: Mut<UniformScale>| {
            s.set_if_neq(UniformScale(scale))
        })
    }

    pub fn set_profile(&mut self, id: u32, profile: BendProfile) -> bool {
        self.update_component(id, false, |mut p: Mut<BendProfile>| p.set_if_neq(profile))
    }

    /// Force a recompute of the bender's derived data on the next step.
    pub fn mark_dirty(&mut self, id: u32) -> bool {
        self.entity(id)
            .and_then(|e| self.world.get_mut::<DirtyFlags>(e))
            .map(|mut dirty| dirty.mark(true))
            .is_some()
    }

    fn update_component<C: Component>(
        &mut self,
        id: u32,
        matrix: bool,
        apply: impl FnOnce(Mut<C>) -> bool,
    ) -> bool {
        let Some(entity) = self.entity(id) else {
            return false;
        };
        let Some(component) = self.world.get_mut::<C>(entity) else {
            return false;
        };
        if apply(component) {
            if let Some(mut dirty) = self.world.get_mut::<DirtyFlags>(entity) {
                dirty.mark(matrix);
            }
        }
        true
    }

    /// Is `point` inside the bender's volume, using its current transform?
    pub fn is_point_inside(&self, id: u32, point: Vec3) -> Option<bool> {
        self.fresh_data(id).map(|data| data.contains_point(point))
    }

    /// World corners of the bender's volume, using its current transform.
    pub fn world_corners(&self, id: u32) -> Option<[Vec3; 8]> {
        self.fresh_data(id).map(|data| data.world_corners())
    }

    fn fresh_data(&self, id: u32) -> Option<BenderData> {
        let entity = self.entity(id)?;
        let transform = self.world.get::<BenderTransform>(entity)?;
        let scale = self.world.get::<UniformScale>(entity)?;
        let mut data = BenderData::default();
        data.rebuild_matrices(transform, scale.0);
        Some(data)
    }

    pub fn entity(&self, id: u32) -> Option<Entity> {
        self.index.get(&BenderId(id)).copied()
    }

    pub fn bender_count(&self) -> usize {
        self.index.len()
    }

    pub fn coordinator(&self) -> Option<Entity> {
        self.world
            .get_resource::<BenderRegistry>()
            .and_then(|r| r.coordinator())
    }

    pub fn coordinator_id(&self) -> Option<u32> {
        self.coordinator()
            .and_then(|e| self.world.get::<BenderId>(e))
            .map(|id| id.0)
    }

    // ========================================================================
    // VIEW & OUTPUT
    // ========================================================================

    pub fn set_viewpoint(&mut self, viewpoint: Viewpoint) {
        self.world.insert_resource(viewpoint);
    }

    /// Arrays written by the last pipeline pass.
    pub fn packed_batch(&self) -> Option<&PackedBatch> {
        self.world.get_resource::<FrameBatch>()?.0.as_ref()
    }

    /// Global shader parameters as last uploaded.
    pub fn shader_globals(&self) -> Option<&GlobalShaderTable> {
        self.world.get_resource::<GlobalShaderTable>()
    }

    /// Mirror every global upload into a renderer-provided backend.
    pub fn set_shader_backend(&mut self, backend: impl ShaderGlobals + Send + Sync + 'static) {
        self.world
            .insert_resource(ExternalShaderBackend(Box::new(backend)));
        // Resend keywords on the next step
        self.world.insert_resource(KeywordState::default());
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.world
            .get_resource::<FrameStats>()
            .cloned()
            .unwrap_or_default()
    }

    pub fn current_tick(&self) -> u64 {
        self.frame_stats().ticks
    }

    // ========================================================================
    // PERMANENT VOLUMES
    // ========================================================================

    /// Add a permanent volume. Its map is reset before the first scan.
    pub fn spawn_permanent_volume(&mut self, volume: PermanentVolume) -> Result<Entity> {
        if !(0.0..=1.0).contains(&volume.update_frequency) {
            return Err(BendingError::InvalidConfig(format!(
                "update_frequency must be in [0, 1], got {}",
                volume.update_frequency
            )));
        }
        if !volume.size.is_finite() || !volume.origin.is_finite() {
            return Err(BendingError::InvalidConfig(
                "permanent volume bounds must be finite".to_string(),
            ));
        }
        Ok(self.world.spawn(volume).id())
    }

    /// Remove a permanent volume. A reset in flight is dropped with it.
    pub fn despawn_permanent_volume(&mut self, entity: Entity) -> bool {
        self.world.get::<PermanentVolume>(entity).is_some() && self.world.despawn(entity)
    }

    pub fn permanent_volume(&self, entity: Entity) -> Option<&PermanentVolume> {
        self.world.get::<PermanentVolume>(entity)
    }

    pub fn permanent_volume_mut(&mut self, entity: Entity) -> Option<Mut<PermanentVolume>> {
        self.world.get_mut::<PermanentVolume>(entity)
    }

    /// Batch of the volume's last region scan.
    pub fn permanent_batch(&self, entity: Entity) -> Option<&PackedBatch> {
        self.permanent_volume(entity)?.batch()
    }

    /// Clear a volume's map. Scans pause until the reset has been published.
    pub fn reset_volume_map(&mut self, entity: Entity) -> bool {
        self.permanent_volume_mut(entity)
            .map(|mut volume| volume.request_reset())
            .is_some()
    }

    /// Resize a volume's voxel grid to approximate `size` sized cells.
    pub fn force_cell_size(&mut self, entity: Entity, size: f32) -> bool {
        self.permanent_volume_mut(entity)
            .map(|mut volume| volume.force_cell_size(size))
            .is_some()
    }

    pub fn set_raster_backend(&mut self, raster: impl VolumeRaster + Send + Sync + 'static) {
        self.world.insert_resource(RasterBackend(Box::new(raster)));
    }

    // ========================================================================
    // SETTINGS & STATE
    // ========================================================================

    pub fn settings(&self) -> BendingSettings {
        self.world
            .get_resource::<BendingSettings>()
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the settings. The array capacity is fixed for the world's lifetime.
    pub fn set_settings(&mut self, settings: BendingSettings) -> Result<()> {
        let current = self.settings();
        let checked = settings.validate().and_then(|()| {
            if settings.array_capacity == current.array_capacity {
                Ok(())
            } else {
                Err(BendingError::InvalidConfig(format!(
                    "array_capacity is fixed at {}",
                    current.array_capacity
                )))
            }
        });
        if let Err(err) = checked {
            warn!(%err, "rejected settings change");
            return Err(err);
        }
        self.world.insert_resource(settings);
        Ok(())
    }

    /// Get a snapshot of the current bending state.
    pub fn snapshot(&mut self) -> BendingSnapshot {
        BendingSnapshot::from_world(&mut self.world)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot()
            .to_json()
            .unwrap_or_else(|_| "{}".to_string())
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for BendingWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn is_enabled(world: &World, entity: Entity) -> bool {
    world
        .get::<BenderFlags>(entity)
        .map(|f| f.enabled)
        .unwrap_or(false)
}
