//! Permanent bending volumes.
//!
//! A permanent volume is an axis-aligned region backed by a 3D volume map that
//! accumulates deformation over time on the GPU. The core side of it is small:
//! decide when to refresh (a fractional per-frame rate), find the permanent
//! benders overlapping the region, pack them into the volume's own batch and
//! drive the two-tick reset job of the raster collaborator.
//!
//! The job state lives on the volume component. Despawning the volume drops
//! the job, so a reset in flight simply never continues.

use crate::batch::PackedBatch;
use crate::components::BoundingSphere;
use crate::systems::packing::Candidate;
use bevy_ecs::prelude::*;
use glam::{UVec3, Vec3};
use std::sync::{Arc, Mutex};

/// Shader pass that simulates the volume map.
pub const PASS_DEFAULT: u32 = 0;
/// Shader pass that clears the volume map.
pub const PASS_RESET: u32 = 1;

/// Timer threshold at which a scan fires.
const TIMER_FIRE_THRESHOLD: f32 = 0.999;

/// Global volume map texture published for the grass shaders.
pub const VOLUME_MAP_TEX_SIZE_SLOT: &str = "_volumeMapTexSize";
pub const VOLUME_ORIGIN_SLOT: &str = "_volumeOrigin";
pub const VOLUME_SIZE_SLOT: &str = "_volumeSize";
pub const VOLUME_BEND_MULT_SLOT: &str = "_volumeBendMult";

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl RegionBounds {
    /// Box spanning `origin .. origin + size`.
    pub fn from_origin_size(origin: Vec3, size: Vec3) -> Self {
        let far = origin + size;
        Self {
            min: origin.min(far),
            max: origin.max(far),
        }
    }

    /// Squared distance from `point` to the box, zero inside.
    pub fn sqr_distance(&self, point: Vec3) -> f32 {
        let clamped = point.clamp(self.min, self.max);
        point.distance_squared(clamped)
    }

    /// Conservative sphere overlap. Touching counts as overlapping.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.sqr_distance(sphere.center) <= sphere.radius * sphere.radius
    }
}

/// Pack every permanent, packable bender overlapping `bounds`.
///
/// Candidates are taken in the order given, without distance sorting, and the
/// batch caps the result at its capacity.
pub fn scan_region<'a>(
    batch: &mut PackedBatch,
    bounds: &RegionBounds,
    candidates: impl IntoIterator<Item = Candidate<'a>>,
) -> usize {
    batch.reset();
    for candidate in candidates {
        if batch.is_full() {
            break;
        }
        if candidate.flags.permanent
            && candidate.is_packable()
            && bounds.intersects_sphere(&candidate.sphere)
        {
            batch.push(candidate.data);
        }
    }
    batch.count()
}

/// Metadata sent with a volume batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeMapMeta {
    pub origin: Vec3,
    pub size: Vec3,
    pub voxel_grid: UVec3,
    pub bend_mult: f32,
    pub update_frequency: f32,
}

/// Progress of the volume map reset job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterJob {
    #[default]
    Idle,
    /// Reset requested, the reset pass goes out next tick.
    Requested,
    /// Reset pass issued, default pass is restored next tick.
    ResetIssued,
    /// Default pass restored, the map is published next tick.
    AwaitingPublish,
}

impl RasterJob {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// A permanent bending region.
#[derive(Component, Debug, Clone)]
pub struct PermanentVolume {
    /// Minimum corner.
    pub origin: Vec3,
    pub size: Vec3,
    /// Volume map resolution.
    pub voxel_grid: UVec3,
    /// How far permanently bent grass is displaced.
    pub bend_mult: f32,
    /// Refreshes per frame: 0 never, 1 every frame.
    pub update_frequency: f32,
    pub disable_permanent: bool,
    pub disable_vertex: bool,
    timer: f32,
    job: RasterJob,
    batch: Option<PackedBatch>,
}

impl PermanentVolume {
    /// A new volume starts by resetting its map.
    pub fn new(origin: Vec3, size: Vec3, voxel_grid: UVec3) -> Self {
        Self {
            origin,
            size,
            voxel_grid: voxel_grid.max(UVec3::ONE),
            bend_mult: 1.0,
            update_frequency: 0.5,
            disable_permanent: false,
            disable_vertex: false,
            timer: 0.0,
            job: RasterJob::Requested,
            batch: None,
        }
    }

    pub fn with_update_frequency(mut self, frequency: f32) -> Self {
        self.update_frequency = frequency.clamp(0.0, 1.0);
        self
    }

    pub fn with_bend_mult(mut self, bend_mult: f32) -> Self {
        self.bend_mult = bend_mult;
        self
    }

    pub fn bounds(&self) -> RegionBounds {
        RegionBounds::from_origin_size(self.origin, self.size)
    }

    /// World-space size of one voxel.
    pub fn cell_size(&self) -> Vec3 {
        self.size / self.voxel_grid.as_vec3()
    }

    /// Resize the voxel grid so cells come as close as possible to `size`, then
    /// reset the map.
    pub fn force_cell_size(&mut self, size: f32) {
        if !(size > 0.0) {
            return;
        }
        let cells = (self.size.abs() / size).ceil().max(Vec3::ONE);
        self.voxel_grid = cells.as_uvec3();
        self.request_reset();
    }

    /// Clear the volume map. Takes two ticks to complete.
    pub fn request_reset(&mut self) {
        self.job = RasterJob::Requested;
    }

    pub fn job(&self) -> RasterJob {
        self.job
    }

    /// The batch of the last scan.
    pub fn batch(&self) -> Option<&PackedBatch> {
        self.batch.as_ref()
    }

    pub fn meta(&self) -> VolumeMapMeta {
        VolumeMapMeta {
            origin: self.origin,
            size: self.size,
            voxel_grid: self.voxel_grid,
            bend_mult: self.bend_mult,
            update_frequency: self.update_frequency,
        }
    }

    /// Advance the refresh phase by one frame.
    ///
    /// The phase accumulates `update_frequency` and fires once per whole unit,
    /// keeping the remainder, so a rate of 0.3 fires 3 times every 10 frames.
    pub fn tick_timer(&mut self) -> bool {
        self.timer += self.update_frequency;
        if self.timer >= TIMER_FIRE_THRESHOLD {
            self.timer -= 1.0;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_job(&mut self, job: RasterJob) {
        self.job = job;
    }

    pub(crate) fn batch_mut(&mut self, capacity: usize) -> &mut PackedBatch {
        self.batch
            .get_or_insert_with(|| PackedBatch::with_capacity(capacity))
    }
}

/// The GPU side of a permanent volume.
///
/// Implementations must treat the batch as a snapshot and copy what they need.
pub trait VolumeRaster {
    /// Select the shader pass used by subsequent map updates.
    fn set_pass(&mut self, volume: Entity, pass: u32);
    /// Run the current pass `buffers` times (the map is double buffered).
    fn update(&mut self, volume: Entity, buffers: u32);
    /// Upload the region-local bender arrays to the update material.
    fn update_material(&mut self, volume: Entity, batch: &PackedBatch, meta: &VolumeMapMeta);
}

/// Installed raster collaborator.
#[derive(Resource)]
pub struct RasterBackend(pub Box<dyn VolumeRaster + Send + Sync>);

/// One call received by a `RecordingRaster`.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterEvent {
    SetPass { volume: Entity, pass: u32 },
    Update { volume: Entity, buffers: u32 },
    Material { volume: Entity, count: usize, meta: VolumeMapMeta },
}

/// Raster collaborator that only records calls. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRaster {
    pub events: Arc<Mutex<Vec<RasterEvent>>>,
}

impl RecordingRaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_events(&self) -> Vec<RasterEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    fn record(&self, event: RasterEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl VolumeRaster for RecordingRaster {
    fn set_pass(&mut self, volume: Entity, pass: u32) {
        self.record(RasterEvent::SetPass { volume, pass });
    }

    fn update(&mut self, volume: Entity, buffers: u32) {
        self.record(RasterEvent::Update { volume, buffers });
    }

    fn update_material(&mut self, volume: Entity, batch: &PackedBatch, meta: &VolumeMapMeta) {
        self.record(RasterEvent::Material {
            volume,
            count: batch.count(),
            meta: *meta,
        });
    }
}
