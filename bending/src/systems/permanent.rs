//! Permanent volume refresh and reset jobs.
//!
//! ## Data Access
//! - Reads: BendingSettings, BenderRegistry, bender data
//! - Writes: PermanentVolume, GlobalShaderTable, RasterBackend
//!
//! Runs every tick, after the per-frame pipeline.

use crate::batch::{GlobalShaderTable, ShaderGlobals};
use crate::components::*;
use crate::config::BendingSettings;
use crate::permanent::*;
use crate::registry::BenderRegistry;
use crate::systems::packing::Candidate;
use bevy_ecs::prelude::*;
use tracing::{debug, info};

/// Publish a volume's map placement for the grass shaders.
pub fn publish_volume_map(globals: &mut dyn ShaderGlobals, meta: &VolumeMapMeta) {
    globals.set_vector(VOLUME_ORIGIN_SLOT, meta.origin.extend(0.0));
    globals.set_vector(VOLUME_SIZE_SLOT, meta.size.extend(0.0));
    globals.set_vector(VOLUME_MAP_TEX_SIZE_SLOT, meta.voxel_grid.as_vec3().extend(0.0));
    globals.set_float(VOLUME_BEND_MULT_SLOT, meta.bend_mult);
}

/// System that drives every permanent volume by one tick.
///
/// A volume with a reset in flight advances its job one stage per tick:
/// reset pass (both map buffers), default pass, publish. The update timer
/// advances only while permanent bending is on globally and for the volume,
/// and keeps running through a reset. A firing that lands on a reset stage is
/// consumed without a scan. Every scan republishes the map placement.
pub fn permanent_volume_system(
    settings: Res<BendingSettings>,
    registry: Res<BenderRegistry>,
    mut table: ResMut<GlobalShaderTable>,
    mut raster: Option<ResMut<RasterBackend>>,
    mut volumes: Query<(Entity, &mut PermanentVolume)>,
    benders: Query<(&BenderFlags, &UniformScale, &BenderData, &BoundingSphere)>,
) {
    for (entity, mut volume) in volumes.iter_mut() {
        let active = settings.permanent_enabled && !volume.disable_permanent;
        let fire = active && volume.tick_timer();

        match volume.job() {
            RasterJob::Requested => {
                if let Some(raster) = raster.as_mut() {
                    raster.0.set_pass(entity, PASS_RESET);
                    raster.0.update(entity, 2);
                }
                volume.set_job(RasterJob::ResetIssued);
            }
            RasterJob::ResetIssued => {
                if let Some(raster) = raster.as_mut() {
                    raster.0.set_pass(entity, PASS_DEFAULT);
                }
                volume.set_job(RasterJob::AwaitingPublish);
            }
            RasterJob::AwaitingPublish => {
                publish_volume_map(&mut *table, &volume.meta());
                volume.set_job(RasterJob::Idle);
                info!(?entity, "volume map reset complete");
            }
            RasterJob::Idle => {
                if !fire {
                    continue;
                }

                let bounds = volume.bounds();
                let meta = volume.meta();
                let candidates = registry.members().iter().filter_map(|&e| {
                    benders.get(e).ok().map(|(flags, scale, data, sphere)| Candidate {
                        flags,
                        scale: *scale,
                        data,
                        sphere: *sphere,
                        visible: true,
                    })
                });
                let batch = volume.batch_mut(settings.array_capacity);
                let count = scan_region(batch, &bounds, candidates);

                if let Some(raster) = raster.as_mut() {
                    raster.0.update_material(entity, batch, &meta);
                    raster.0.update(entity, 1);
                }
                publish_volume_map(&mut *table, &meta);
                debug!(?entity, count, "permanent volume scanned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{UVec3, Vec3, Vec4};

    fn setup(permanent_enabled: bool) -> (World, RecordingRaster) {
        let mut world = World::new();
        world.insert_resource(BendingSettings {
            permanent_enabled,
            ..Default::default()
        });
        world.insert_resource(BenderRegistry::new());
        world.insert_resource(GlobalShaderTable::default());
        let raster = RecordingRaster::new();
        world.insert_resource(RasterBackend(Box::new(raster.clone())));
        (world, raster)
    }

    fn spawn_bender(world: &mut World, at: Vec3, permanent: bool) -> Entity {
        let transform = BenderTransform::from_translation(at);
        let mut bundle = BenderBundle::new(transform, BendProfile::character());
        bundle.flags.permanent = permanent;
        bundle.sphere = BoundingSphere::from_transform(&transform, 1.0);
        bundle.data.rebuild_matrices(&transform, 1.0);
        let e = world.spawn(bundle).id();
        world.resource_mut::<BenderRegistry>().register(e, true);
        e
    }

    fn schedule() -> Schedule {
        let mut schedule = Schedule::default();
        schedule.add_systems(permanent_volume_system);
        schedule
    }

    #[test]
    fn test_reset_takes_three_ticks() {
        let (mut world, raster) = setup(true);
        let volume = world
            .spawn(PermanentVolume::new(Vec3::ZERO, Vec3::splat(10.0), UVec3::splat(32)))
            .id();
        let mut schedule = schedule();

        schedule.run(&mut world);
        assert_eq!(
            raster.take_events(),
            vec![
                RasterEvent::SetPass { volume, pass: PASS_RESET },
                RasterEvent::Update { volume, buffers: 2 },
            ]
        );

        schedule.run(&mut world);
        assert_eq!(
            raster.take_events(),
            vec![RasterEvent::SetPass { volume, pass: PASS_DEFAULT }]
        );
        assert!(world.resource::<GlobalShaderTable>().vector(VOLUME_SIZE_SLOT).is_none());

        schedule.run(&mut world);
        let table = world.resource::<GlobalShaderTable>();
        assert_eq!(table.vector(VOLUME_SIZE_SLOT), Some(Vec4::new(10.0, 10.0, 10.0, 0.0)));
        assert_eq!(table.vector(VOLUME_MAP_TEX_SIZE_SLOT), Some(Vec4::new(32.0, 32.0, 32.0, 0.0)));
        assert_eq!(table.float(VOLUME_BEND_MULT_SLOT), Some(1.0));
        assert!(world.get::<PermanentVolume>(volume).unwrap().job().is_idle());
    }

    #[test]
    fn test_scan_packs_overlapping_permanent_benders() {
        let (mut world, raster) = setup(true);
        spawn_bender(&mut world, Vec3::splat(5.0), true);
        spawn_bender(&mut world, Vec3::splat(5.0), false);
        spawn_bender(&mut world, Vec3::splat(100.0), true);

        let mut region = PermanentVolume::new(Vec3::ZERO, Vec3::splat(10.0), UVec3::splat(8))
            .with_update_frequency(1.0);
        region.set_job(RasterJob::Idle);
        let volume = world.spawn(region).id();

        schedule().run(&mut world);

        assert_eq!(
            world.get::<PermanentVolume>(volume).unwrap().batch().map(|b| b.count()),
            Some(1)
        );
        let events = raster.take_events();
        assert!(matches!(events[0], RasterEvent::Material { count: 1, .. }));
        assert_eq!(events[1], RasterEvent::Update { volume, buffers: 1 });
    }

    #[test]
    fn test_scan_waits_for_reset() {
        let (mut world, _raster) = setup(true);
        spawn_bender(&mut world, Vec3::splat(5.0), true);
        let volume = world
            .spawn(
                PermanentVolume::new(Vec3::ZERO, Vec3::splat(10.0), UVec3::splat(8))
                    .with_update_frequency(1.0),
            )
            .id();
        let mut schedule = schedule();

        for _ in 0..3 {
            schedule.run(&mut world);
            assert!(world.get::<PermanentVolume>(volume).unwrap().batch().is_none());
        }
        schedule.run(&mut world);
        assert!(world.get::<PermanentVolume>(volume).unwrap().batch().is_some());
    }

    #[test]
    fn test_no_scan_when_disabled() {
        let (mut world, raster) = setup(false);
        spawn_bender(&mut world, Vec3::splat(5.0), true);
        let mut region = PermanentVolume::new(Vec3::ZERO, Vec3::splat(10.0), UVec3::splat(8))
            .with_update_frequency(1.0);
        region.set_job(RasterJob::Idle);
        let volume = world.spawn(region).id();

        schedule().run(&mut world);
        assert!(world.get::<PermanentVolume>(volume).unwrap().batch().is_none());
        assert!(raster.take_events().is_empty());

        world.resource_mut::<BendingSettings>().permanent_enabled = true;
        world.get_mut::<PermanentVolume>(volume).unwrap().disable_permanent = true;
        schedule().run(&mut world);
        assert!(world.get::<PermanentVolume>(volume).unwrap().batch().is_none());
    }

    #[test]
    fn test_timer_holds_while_disabled() {
        let (mut world, _raster) = setup(false);
        spawn_bender(&mut world, Vec3::splat(5.0), true);
        let mut region = PermanentVolume::new(Vec3::ZERO, Vec3::splat(10.0), UVec3::splat(8))
            .with_update_frequency(0.5);
        region.set_job(RasterJob::Idle);
        let volume = world.spawn(region).id();
        let mut schedule = schedule();

        // Disabled ticks must not bank phase
        schedule.run(&mut world);
        schedule.run(&mut world);
        world.resource_mut::<BendingSettings>().permanent_enabled = true;

        schedule.run(&mut world);
        assert!(world.get::<PermanentVolume>(volume).unwrap().batch().is_none());
        schedule.run(&mut world);
        assert!(world.get::<PermanentVolume>(volume).unwrap().batch().is_some());
    }

    #[test]
    fn test_timer_runs_through_reset() {
        let (mut world, raster) = setup(true);
        spawn_bender(&mut world, Vec3::splat(5.0), true);
        let volume = world
            .spawn(
                PermanentVolume::new(Vec3::ZERO, Vec3::splat(10.0), UVec3::splat(8))
                    .with_update_frequency(0.5),
            )
            .id();
        let mut schedule = schedule();

        // Fires on the second reset stage and is dropped
        for _ in 0..3 {
            schedule.run(&mut world);
        }
        assert!(!raster
            .take_events()
            .iter()
            .any(|e| matches!(e, RasterEvent::Material { .. })));
        assert!(world.get::<PermanentVolume>(volume).unwrap().batch().is_none());

        schedule.run(&mut world);
        assert_eq!(
            world.get::<PermanentVolume>(volume).unwrap().batch().map(|b| b.count()),
            Some(1)
        );
    }

    #[test]
    fn test_scan_republishes_placement() {
        let (mut world, _raster) = setup(true);
        let mut region = PermanentVolume::new(Vec3::ZERO, Vec3::splat(10.0), UVec3::splat(8))
            .with_update_frequency(1.0);
        region.set_job(RasterJob::Idle);
        let volume = world.spawn(region).id();
        let mut schedule = schedule();

        schedule.run(&mut world);
        assert_eq!(
            world.resource::<GlobalShaderTable>().vector(VOLUME_ORIGIN_SLOT),
            Some(Vec4::ZERO)
        );

        {
            let mut region = world.get_mut::<PermanentVolume>(volume).unwrap();
            region.origin = Vec3::new(-4.0, 0.0, 2.0);
            region.bend_mult = 0.25;
        }
        schedule.run(&mut world);
        let table = world.resource::<GlobalShaderTable>();
        assert_eq!(table.vector(VOLUME_ORIGIN_SLOT), Some(Vec4::new(-4.0, 0.0, 2.0, 0.0)));
        assert_eq!(table.float(VOLUME_BEND_MULT_SLOT), Some(0.25));
    }

    #[test]
    fn test_despawn_cancels_reset() {
        let (mut world, raster) = setup(true);
        let volume = world
            .spawn(PermanentVolume::new(Vec3::ZERO, Vec3::ONE, UVec3::ONE))
            .id();
        let mut schedule = schedule();
        schedule.run(&mut world);
        raster.take_events();

        world.despawn(volume);
        schedule.run(&mut world);
        schedule.run(&mut world);
        assert!(raster.take_events().is_empty());
        assert!(world.resource::<GlobalShaderTable>().vector(VOLUME_ORIGIN_SLOT).is_none());
    }
}
