//! Fixed-capacity bender arrays and their handoff to the rendering backend.
//!
//! A `PackedBatch` is a struct of three parallel arrays plus a count. It is
//! allocated once at capacity K and reset (not reallocated) every pack cycle.
//! Slots at or beyond `count` hold leftovers from earlier frames and carry no
//! meaning.

use crate::components::BenderData;
use bevy_ecs::prelude::*;
use glam::{Mat4, Vec4};
use std::collections::HashMap;

/// Global array of world-to-local bender matrices.
pub const WORLD_TO_LOCAL_SLOT: &str = "_benderWorld2Local";
/// Global array of local-to-world bender matrices.
pub const LOCAL_TO_WORLD_SLOT: &str = "_benderLocal2World";
/// Global array of (hardness, power, direction, noise) vectors.
pub const HPDN_SLOT: &str = "_benderHPDN";
/// Number of valid entries in the three arrays.
pub const COUNT_SLOT: &str = "_grassBendersCount";

/// Packed bender arrays with an explicit valid count.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedBatch {
    local_to_world: Vec<Mat4>,
    world_to_local: Vec<Mat4>,
    hpdn: Vec<Vec4>,
    count: usize,
}

impl PackedBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            local_to_world: vec![Mat4::IDENTITY; capacity],
            world_to_local: vec![Mat4::IDENTITY; capacity],
            hpdn: vec![Vec4::ZERO; capacity],
            count: 0,
        }
    }

    /// Start a new pack cycle. Slot contents are left in place.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Append a bender. Returns false when the batch is full.
    pub fn push(&mut self, data: &BenderData) -> bool {
        if self.is_full() {
            return false;
        }
        let i = self.count;
        self.local_to_world[i] = data.local_to_world;
        self.world_to_local[i] = data.world_to_local;
        self.hpdn[i] = data.hpdn;
        self.count += 1;
        true
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.hpdn.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Valid local-to-world matrices.
    pub fn local_to_world(&self) -> &[Mat4] {
        &self.local_to_world[..self.count]
    }

    /// Valid world-to-local matrices.
    pub fn world_to_local(&self) -> &[Mat4] {
        &self.world_to_local[..self.count]
    }

    /// Valid HPDN vectors.
    pub fn hpdn(&self) -> &[Vec4] {
        &self.hpdn[..self.count]
    }

    /// Hand the batch to a backend. The full K-length arrays are sent together
    /// with the count, matching what a fixed-size shader array expects.
    pub fn upload(&self, globals: &mut dyn ShaderGlobals) {
        globals.set_matrix_array(WORLD_TO_LOCAL_SLOT, &self.world_to_local);
        globals.set_matrix_array(LOCAL_TO_WORLD_SLOT, &self.local_to_world);
        globals.set_vector_array(HPDN_SLOT, &self.hpdn);
        globals.set_int(COUNT_SLOT, self.count as i32);
    }
}

/// Name-addressed shader parameters, as exposed by a rendering backend.
pub trait ShaderGlobals {
    fn set_matrix_array(&mut self, name: &str, values: &[Mat4]);
    fn set_vector_array(&mut self, name: &str, values: &[Vec4]);
    fn set_vector(&mut self, name: &str, value: Vec4);
    fn set_float(&mut self, name: &str, value: f32);
    fn set_int(&mut self, name: &str, value: i32);
    fn set_keyword(&mut self, keyword: &str, enabled: bool);
}

/// In-process table of global shader parameters.
///
/// This is what the world writes to every frame. A renderer can read it back,
/// or install an `ExternalShaderBackend` to receive the same calls directly.
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct GlobalShaderTable {
    pub matrix_arrays: HashMap<String, Vec<Mat4>>,
    pub vector_arrays: HashMap<String, Vec<Vec4>>,
    pub vectors: HashMap<String, Vec4>,
    pub floats: HashMap<String, f32>,
    pub ints: HashMap<String, i32>,
    pub keywords: HashMap<String, bool>,
    /// Number of `set_int(COUNT_SLOT, ..)` uploads seen.
    pub bender_uploads: u64,
}

impl GlobalShaderTable {
    pub fn int(&self, name: &str) -> Option<i32> {
        self.ints.get(name).copied()
    }

    pub fn matrix_array(&self, name: &str) -> Option<&[Mat4]> {
        self.matrix_arrays.get(name).map(Vec::as_slice)
    }

    pub fn vector_array(&self, name: &str) -> Option<&[Vec4]> {
        self.vector_arrays.get(name).map(Vec::as_slice)
    }

    pub fn vector(&self, name: &str) -> Option<Vec4> {
        self.vectors.get(name).copied()
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        self.floats.get(name).copied()
    }

    pub fn keyword(&self, keyword: &str) -> bool {
        self.keywords.get(keyword).copied().unwrap_or(false)
    }

    /// The bender count last uploaded, zero before the first upload.
    pub fn bender_count(&self) -> usize {
        self.int(COUNT_SLOT).unwrap_or(0).max(0) as usize
    }
}

impl ShaderGlobals for GlobalShaderTable {
    fn set_matrix_array(&mut self, name: &str, values: &[Mat4]) {
        let slot = self.matrix_arrays.entry(name.to_string()).or_default();
        slot.clear();
        slot.extend_from_slice(values);
    }

    fn set_vector_array(&mut self, name: &str, values: &[Vec4]) {
        let slot = self.vector_arrays.entry(name.to_string()).or_default();
        slot.clear();
        slot.extend_from_slice(values);
    }

    fn set_vector(&mut self, name: &str, value: Vec4) {
        self.vectors.insert(name.to_string(), value);
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.floats.insert(name.to_string(), value);
    }

    fn set_int(&mut self, name: &str, value: i32) {
        if name == COUNT_SLOT {
            self.bender_uploads += 1;
        }
        self.ints.insert(name.to_string(), value);
    }

    fn set_keyword(&mut self, keyword: &str, enabled: bool) {
        self.keywords.insert(keyword.to_string(), enabled);
    }
}

/// Optional user-installed backend that mirrors every global upload.
#[derive(Resource)]
pub struct ExternalShaderBackend(pub Box<dyn ShaderGlobals + Send + Sync>);
