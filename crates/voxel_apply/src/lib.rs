//! voxel_apply - Voxelwise algorithm dispatch for volumetric images
//!
//! This crate applies a per-voxel algorithm (a model fit, a parameter
//! estimate, any pure function of one voxel's values) to every voxel of a
//! set of co-registered volumes, in parallel on a fixed worker pool.
//!
//! # Features
//!
//! - **Algorithm contract**: plugins declare their channel counts and map one
//!   voxel's inputs and constants to outputs, residuals and an iteration count
//! - **Bounded dispatch**: a single producer feeds a bounded queue, blocking
//!   when it is full, so memory stays flat regardless of volume size
//! - **Masking and sub-regions**: restrict work to a mask and/or a
//!   hyper-rectangle of the image
//! - **Contained failures**: a failing or panicking voxel is zero-filled and
//!   reported without aborting the run
//!
//! ```text
//!   data[0..n] ─┐
//!   const[0..k]─┼─► VoxelwiseEngine ──► WorkerPool ──► outputs[0..m]
//!   mask       ─┘    (scan region)      (bounded)      residual
//!                                                     all_residuals
//!                                                     iterations
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use voxel_apply::{EngineConfig, VoxelwiseEngine};
//!
//! let mut engine = VoxelwiseEngine::new(Arc::new(MyFit), EngineConfig::default());
//! engine.set_data(0, &signal)?;
//! engine.configure()?;
//! let summary = engine.run()?;
//!
//! println!("{} voxels in {:?}", summary.active_voxels, summary.elapsed);
//! ```

pub mod algorithm;
pub mod constants;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod pool;
pub mod progress;
pub mod volume;

// Re-export commonly used items
pub use algorithm::{Algorithm, AlgorithmFactory, AlgorithmRegistry, ConstVector, InputVector, VoxelFit};
pub use constants::{index_to_position, position_to_index};
pub use engine::{CancellationToken, EngineConfig, OutputBundle, RunSummary, VoxelFailure, VoxelwiseEngine};
pub use error::{
  AlgorithmError, ChannelKind, ConfigurationError, EngineError, EngineState, IndexError, PoolError, VolumeError,
};
pub use geometry::{Geometry, Region};
pub use pool::{PoolConfig, TaskQueue, WorkerPool};
pub use progress::ProgressReporter;
pub use volume::Volume;
