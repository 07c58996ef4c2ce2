//! Visibility culling and distance ordering.
//!
//! Culling only engages when the registry holds more benders than
//! `max_active_benders`; below that every bender is sent and ordering does not
//! matter. When engaged, each bender gets a surface distance to the viewpoint, a
//! distance band and a visibility bit, and the draw order is stably sorted by
//! distance so truncation keeps the closest benders.
//!
//! ## Parallel Feature
//!
//! When compiled with `--features parallel`, the per-bender gather runs on rayon.

use crate::components::*;
use crate::config::{BendingSettings, CullingBands};
use crate::registry::BenderRegistry;
use crate::viewpoint::Viewpoint;
use bevy_ecs::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Per-frame draw order. Rebuilt from the registry every frame, reusing its
/// allocation, so the registration order itself is never disturbed.
#[derive(Resource, Debug, Default)]
pub struct DrawOrder {
    pub entities: Vec<Entity>,
    /// Whether culling ran for this order.
    pub culled: bool,
}

/// Distance, band and visibility of one bounding sphere.
pub fn evaluate_sphere(sphere: &BoundingSphere, viewpoint: &Viewpoint, bands: &CullingBands) -> CullState {
    let distance = sphere.surface_distance(viewpoint.position);
    let band = if distance <= bands.near {
        DistanceBand::Near
    } else if distance <= bands.mid {
        DistanceBand::Mid
    } else if distance <= bands.far {
        DistanceBand::Far
    } else {
        DistanceBand::Beyond
    };
    let visible = band != DistanceBand::Beyond && viewpoint.sees_sphere(sphere.center, sphere.radius);

    CullState {
        distance,
        visible,
        band,
    }
}

/// System that copies the registry into the draw order and, when over the
/// threshold, evaluates visibility and distance for every member.
///
/// ## Data Access
/// - Reads: BenderRegistry, BendingSettings, Viewpoint, BoundingSphere
/// - Writes: DrawOrder, CullState
pub fn cull_benders_system(
    settings: Res<BendingSettings>,
    viewpoint: Res<Viewpoint>,
    registry: Res<BenderRegistry>,
    mut order: ResMut<DrawOrder>,
    mut query: Query<(&BoundingSphere, &mut CullState)>,
) {
    order.entities.clear();
    order.entities.extend_from_slice(registry.members());
    order.culled = settings.culling_engaged(registry.len());
    if !order.culled {
        return;
    }

    let bands = settings.culling_bands();
    let viewpoint: &Viewpoint = &viewpoint;
    let spheres: Vec<(Entity, BoundingSphere)> = order
        .entities
        .iter()
        .filter_map(|&e| query.get(e).ok().map(|(sphere, _)| (e, *sphere)))
        .collect();

    #[cfg(feature = "parallel")]
    let results: Vec<(Entity, CullState)> = spheres
        .par_iter()
        .map(|(e, sphere)| (*e, evaluate_sphere(sphere, viewpoint, &bands)))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<(Entity, CullState)> = spheres
        .iter()
        .map(|(e, sphere)| (*e, evaluate_sphere(sphere, viewpoint, &bands)))
        .collect();

    for (entity, state) in results {
        if let Ok((_, mut cull)) = query.get_mut(entity) {
            *cull = state;
        }
    }
}

/// System that stably sorts the draw order by ascending distance.
/// Does nothing when culling did not run this frame.
pub fn sort_benders_system(mut order: ResMut<DrawOrder>, query: Query<&CullState>) {
    if !order.culled {
        return;
    }
    sort_by_distance(&mut order.entities, |e| {
        query.get(e).map(|c| c.distance).unwrap_or(f32::INFINITY)
    });
}

/// Stable ascending sort. Equal distances keep their relative order.
pub fn sort_by_distance(entities: &mut [Entity], distance: impl Fn(Entity) -> f32) {
    entities.sort_by(|&a, &b| distance(a).total_cmp(&distance(b)));
}
