//! Flat buffer export of packed bender arrays.
//!
//! Renderers that cannot take name-addressed arrays (compute shaders, FFI
//! hosts) read the batch as a single contiguous `f32` buffer instead.
//!
//! # Buffer Layout (Version 1.0)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ HEADER (1 element)                                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ [0] bender_count (as f32)                                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ SLOT DATA (bender_count × SLOT_STRIDE elements)                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ For each slot i (offset = 1 + i * SLOT_STRIDE):                 │
//! │   [+0..16]  local_to_world - column-major 4x4                   │
//! │   [+16..32] world_to_local - column-major 4x4                   │
//! │   [+32..36] hpdn           - hardness, power, direction, noise  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the first `count` slots are written; stale slots never leave the batch.
//! Slots keep pack order, so the buffer is as deterministic as the batch.

use crate::batch::PackedBatch;
use bytemuck::{Pod, Zeroable};

// ============================================================================
// CONSTANTS - STABLE LAYOUT
// ============================================================================

/// Number of f32 values per bender slot.
///
/// **Part of the stable buffer layout. Do not change without versioning.**
pub const SLOT_STRIDE: usize = 36;

/// Number of f32 values in the buffer header. Just the bender count.
pub const HEADER_SIZE: usize = 1;

/// Offset within a slot for: local-to-world matrix
pub const FIELD_LOCAL_TO_WORLD: usize = 0;
/// Offset within a slot for: world-to-local matrix
pub const FIELD_WORLD_TO_LOCAL: usize = 16;
/// Offset within a slot for: HPDN vector
pub const FIELD_HPDN: usize = 32;

/// One bender as laid out in GPU memory.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuBenderSlot {
    pub local_to_world: [f32; 16],
    pub world_to_local: [f32; 16],
    pub hpdn: [f32; 4],
}

/// The valid slots of a batch, ready for a storage buffer upload.
pub fn batch_to_slots(batch: &PackedBatch) -> Vec<GpuBenderSlot> {
    batch
        .local_to_world()
        .iter()
        .zip(batch.world_to_local())
        .zip(batch.hpdn())
        .map(|((l2w, w2l), hpdn)| GpuBenderSlot {
            local_to_world: l2w.to_cols_array(),
            world_to_local: w2l.to_cols_array(),
            hpdn: hpdn.to_array(),
        })
        .collect()
}

/// Raw bytes of a slot slice.
pub fn slots_as_bytes(slots: &[GpuBenderSlot]) -> &[u8] {
    bytemuck::cast_slice(slots)
}

/// Convert a batch to the flat buffer described in the module docs.
pub fn batch_to_flatbuffer(batch: &PackedBatch) -> Vec<f32> {
    let buffer_size = calculate_buffer_size(batch.count());
    let mut buffer = Vec::with_capacity(buffer_size);

    buffer.push(batch.count() as f32);
    for slot in batch_to_slots(batch) {
        buffer.extend_from_slice(bytemuck::cast_slice::<GpuBenderSlot, f32>(
            std::slice::from_ref(&slot),
        ));
    }

    debug_assert_eq!(buffer.len(), buffer_size, "Buffer size mismatch");
    buffer
}

#[inline]
pub fn calculate_buffer_size(bender_count: usize) -> usize {
    HEADER_SIZE + bender_count * SLOT_STRIDE
}

/// Parse the bender count from a flat buffer.
///
/// Returns `None` if the buffer is empty.
#[inline]
pub fn parse_bender_count(buffer: &[f32]) -> Option<usize> {
    buffer.first().map(|&count| count as usize)
}

#[inline]
pub const fn slot_offset(slot_index: usize) -> usize {
    HEADER_SIZE + slot_index * SLOT_STRIDE
}

// ============================================================================
// TESTS
// ============================================================================
