//! voxel_kernels - Filter kernels for k-space volume filtering
//!
//! Radial windows (Tukey, Hamming, Blackman) and a separable Gaussian, each
//! evaluated per k-space position and parsed from a compact text form such
//! as `Tukey,0.75,0.25`.
//!
//! # Example
//!
//! ```ignore
//! use glam::DVec3;
//! use voxel_kernels::Kernel;
//!
//! let kernel: Kernel = "Gauss,2".parse()?;
//! let w = kernel.value(DVec3::new(3.0, 0.0, 0.0), DVec3::splat(64.0), DVec3::ONE);
//! ```

pub mod kernel;

pub use kernel::{Kernel, KernelError};
