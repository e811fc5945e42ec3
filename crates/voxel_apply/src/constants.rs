//! Tuning constants and buffer layout for voxelwise processing.
//!
//! # Volume Memory Layout
//!
//! ```text
//! Volume memory layout (axis 0 fastest, last axis slowest):
//!
//! Address:  0      1      2    ...  nx-1     nx     ...  nx*ny  ...
//! Content: [0,0,0][1,0,0][2,0,0]...[nx-1,0,0][0,1,0]...[0,0,1] ...
//!          └──────────── axis 0 ────────────┘
//!
//! Multi-component voxels are interleaved:
//!
//! Address:  0    1    2   ...  k-1   k    k+1  ...
//! Content: [v0.c0][v0.c1]...[v0.ck-1][v1.c0][v1.c1]...
//! ```
//!
//! # Linear Indexing
//!
//! ```text
//! index = x + nx * (y + ny * z)
//! ```
//!
//! The dispatch loop walks a region in exactly this order, so buffer offsets
//! of successive voxels are strictly increasing.

/// Number of progress events emitted over a full run (~every 10%).
pub const PROGRESS_STEPS: usize = 10;

/// Queue slots allotted per worker when `PoolConfig::queue_capacity` is 0.
pub const QUEUE_SLOTS_PER_WORKER: usize = 4;

/// Absolute tolerance when comparing spacing, origin and direction.
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// Inline capacity of per-voxel input vectors before spilling to the heap.
pub const INLINE_INPUTS: usize = 16;

/// Inline capacity of per-voxel constant and output vectors.
pub const INLINE_PARAMS: usize = 8;

/// Worker thread name prefix.
pub const WORKER_NAME_PREFIX: &str = "voxel-worker";

/// Convert a position to a linear offset inside a grid of `size`.
///
/// Axis 0 varies fastest. The position must lie inside the grid.
#[inline(always)]
pub fn position_to_index<const D: usize>(position: [usize; D], size: [usize; D]) -> usize {
  let mut index = 0;
  let mut stride = 1;
  for axis in 0..D {
    index += position[axis] * stride;
    stride *= size[axis];
  }
  index
}

/// Convert a linear offset back to a position inside a grid of `size`.
#[inline(always)]
pub fn index_to_position<const D: usize>(mut index: usize, size: [usize; D]) -> [usize; D] {
  let mut position = [0; D];
  for axis in 0..D {
    let extent = size[axis].max(1);
    position[axis] = index % extent;
    index /= extent;
  }
  position
}

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
