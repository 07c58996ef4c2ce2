//! Bender registry and coordinator election.
//!
//! Every live bender is registered here in registration order. One enabled
//! member is elected coordinator; only while a coordinator exists (or a final
//! flush is pending) does the frame pipeline run, so the packed arrays have a
//! single writer per tick no matter how many benders exist.

use crate::components::BenderFlags;
use bevy_ecs::prelude::*;
use tracing::debug;

/// Registry of live benders.
#[derive(Resource, Debug, Default)]
pub struct BenderRegistry {
    /// Members in registration order. Never reordered by the pipeline.
    members: Vec<Entity>,
    /// The elected coordinator, if any.
    coordinator: Option<Entity>,
    /// One more pipeline pass is owed after losing the last coordinator.
    flush_pending: bool,
}

impl BenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bender. Idempotent. An enabled bender becomes coordinator when
    /// none is elected.
    pub fn register(&mut self, entity: Entity, enabled: bool) {
        if !self.members.contains(&entity) {
            self.members.push(entity);
        }
        if self.coordinator.is_none() && enabled {
            debug!(?entity, "bender elected coordinator on register");
            self.coordinator = Some(entity);
            self.flush_pending = false;
        }
    }

    /// Remove a bender. Unknown entities are ignored.
    ///
    /// If the removed bender was coordinator, the first enabled remaining member
    /// takes over. When nobody can, a final flush is requested so consumers stop
    /// seeing the removed volumes.
    pub fn deregister(&mut self, entity: Entity, is_enabled: impl Fn(Entity) -> bool) -> bool {
        let Some(index) = self.members.iter().position(|&e| e == entity) else {
            return false;
        };
        self.members.remove(index);

        if self.coordinator == Some(entity) {
            self.coordinator = None;
            self.elect(is_enabled);
        }
        true
    }

    /// Elect the first enabled member when no coordinator exists.
    /// Returns the coordinator after election.
    pub fn elect(&mut self, is_enabled: impl Fn(Entity) -> bool) -> Option<Entity> {
        if self.coordinator.is_some() {
            return self.coordinator;
        }
        self.coordinator = self.members.iter().copied().find(|&e| is_enabled(e));
        match self.coordinator {
            Some(entity) => {
                debug!(?entity, "bender elected coordinator");
                self.flush_pending = false;
            }
            None => {
                debug!("no enabled bender left, flushing packed arrays");
                self.flush_pending = true;
            }
        }
        self.coordinator
    }

    /// Drop the coordinator if it no longer qualifies, then re-elect.
    pub fn revoke_if(&mut self, should_revoke: impl Fn(Entity) -> bool, is_enabled: impl Fn(Entity) -> bool) {
        if let Some(current) = self.coordinator {
            if should_revoke(current) {
                debug!(entity = ?current, "coordinator revoked");
                self.coordinator = None;
                self.elect(is_enabled);
            }
        }
    }

    /// Whether the frame pipeline should run this tick. Consumes a pending flush.
    pub fn take_frame_turn(&mut self) -> bool {
        if self.coordinator.is_some() {
            return true;
        }
        std::mem::take(&mut self.flush_pending)
    }

    /// Forget every member and the coordinator.
    pub fn clear(&mut self) {
        self.members.clear();
        self.coordinator = None;
        self.flush_pending = false;
    }

    pub fn members(&self) -> &[Entity] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.members.contains(&entity)
    }

    pub fn coordinator(&self) -> Option<Entity> {
        self.coordinator
    }

    pub fn is_coordinator(&self, entity: Entity) -> bool {
        self.coordinator == Some(entity)
    }

    pub fn flush_pending(&self) -> bool {
        self.flush_pending
    }
}

/// System that sweeps the registry each tick.
///
/// Members whose entity was despawned without deregistering are dropped, and a
/// coordinator that was disabled hands over to the next enabled member.
pub fn registry_maintenance_system(
    mut registry: ResMut<BenderRegistry>,
    benders: Query<&BenderFlags>,
) {
    let is_enabled = |e: Entity| benders.get(e).map(|f| f.enabled).unwrap_or(false);

    let stale: Vec<Entity> = registry
        .members()
        .iter()
        .copied()
        .filter(|&e| !benders.contains(e))
        .collect();
    for entity in stale {
        debug!(?entity, "dropping despawned bender from registry");
        registry.deregister(entity, is_enabled);
    }

    registry.revoke_if(|e| !is_enabled(e), is_enabled);
    if registry.coordinator().is_none() {
        // Picks up benders enabled since the last election.
        let has_candidate = registry.members().iter().any(|&e| is_enabled(e));
        if has_candidate {
            registry.elect(is_enabled);
        }
    }
}
