//! ECS systems for the bending pipeline.
//!
//! ## System Ordering
//!
//! **Update (every tick)** - keep derived data and the registry current:
//! - `mark_dirty_system` - Raises dirty flags from change detection
//! - `refresh_bender_data_system` - Rebuilds matrices, spheres and HPDN
//! - `registry_maintenance_system` - Drops despawned members, elects a coordinator
//!
//! **Pipeline (once per coordinated frame)** - strictly in this order:
//! - `cull_benders_system` - Distance bands and visibility, over threshold only
//! - `sort_benders_system` - Stable distance sort of the draw order
//! - `pack_benders_system` - Bounded pack into the global arrays
//! - `upload_benders_system` - Hands the arrays to the backend
//!
//! **Permanent (every tick)**:
//! - `permanent_volume_system` - Region scans and map reset jobs
//! - `shader_keyword_system` - Keeps the bending keywords in sync

pub mod culling;
pub mod packing;
pub mod permanent;
pub mod volume;

pub use culling::*;
pub use packing::*;
pub use permanent::*;
pub use volume::*;
