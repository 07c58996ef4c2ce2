//! Bending Core - grass bender registry and packing pipeline
//!
//! Tracks volumetric influence sources ("benders") that deform a GPU grass
//! field. Once per frame the elected coordinator culls, sorts and packs the
//! relevant benders into fixed-capacity arrays for the rendering backend.
//! Permanent volumes scan their region for benders that leave lasting marks.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod batch;
pub mod components;
pub mod config;
pub mod error;
pub mod gpu_bridge;
pub mod permanent;
pub mod registry;
pub mod snapshot;
pub mod systems;
pub mod viewpoint;

pub use api::BendingWorld;
pub use batch::{ExternalShaderBackend, GlobalShaderTable, PackedBatch, ShaderGlobals};
pub use components::*;
pub use config::BendingSettings;
pub use error::{BendingError, Result};
pub use permanent::{PermanentVolume, RasterBackend, RecordingRaster, RegionBounds, VolumeRaster};
pub use registry::BenderRegistry;
pub use snapshot::{BenderSnapshot, BendingSnapshot};
pub use systems::*;
pub use viewpoint::{Frustum, Viewpoint};
