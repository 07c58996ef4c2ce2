//! Per-bender dirty tracking and derived data refresh.
//!
//! Authoring components are watched through change detection. A transform or
//! uniform scale change requests a matrix rebuild, a profile change only
//! requests the HPDN vector. Benders that are not dirty cost nothing.

use crate::components::*;
use bevy_ecs::prelude::*;
use tracing::debug;

/// System that raises dirty flags for benders whose authoring data changed.
///
/// ## Data Access
/// - Reads: BenderTransform, UniformScale, BendProfile (change ticks)
/// - Writes: DirtyFlags
pub fn mark_dirty_system(
    mut query: Query<
        (
            Ref<BenderTransform>,
            Ref<UniformScale>,
            Ref<BendProfile>,
            &mut DirtyFlags,
        ),
        Or<(
            Changed<BenderTransform>,
            Changed<UniformScale>,
            Changed<BendProfile>,
        )>,
    >,
) {
    for (transform, scale, profile, mut dirty) in query.iter_mut() {
        let matrix = transform.is_changed() || scale.is_changed();
        if matrix || profile.is_changed() {
            dirty.mark(matrix);
        }
    }
}

/// System that rebuilds matrices, bounding spheres and HPDN for dirty benders.
///
/// ## Data Access
/// - Reads: BenderTransform, UniformScale, BendProfile
/// - Writes: DirtyFlags, BenderData, BoundingSphere
pub fn refresh_bender_data_system(
    mut query: Query<(
        Entity,
        &BenderTransform,
        &UniformScale,
        &BendProfile,
        &mut DirtyFlags,
        &mut BenderData,
        &mut BoundingSphere,
    )>,
) {
    for (entity, transform, scale, profile, mut dirty, mut data, mut sphere) in query.iter_mut() {
        if !dirty.is_dirty() {
            continue;
        }

        if dirty.matrix {
            data.rebuild_matrices(transform, scale.0);
            *sphere = BoundingSphere::from_transform(transform, scale.0);
            if !data.invertible {
                debug!(?entity, "bender transform is singular, excluded from packing");
            }
        }
        data.hpdn = profile.hpdn();

        // Both bits are cleared together
        dirty.clear();
    }
}
