//! Output volumes produced by a run.

use crate::error::{IndexError, VolumeError};
use crate::geometry::Geometry;
use crate::volume::Volume;

/// Every volume written by the engine, sharing the geometry of data input 0.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputBundle<const D: usize = 3> {
  /// One scalar volume per algorithm output.
  pub outputs: Vec<Volume<f32, D>>,
  /// Summary residual per voxel.
  pub residual: Volume<f32, D>,
  /// Per-component residuals, when requested.
  pub all_residuals: Option<Volume<f32, D>>,
  /// Solver iterations per voxel.
  pub iterations: Volume<u32, D>,
}

impl<const D: usize> OutputBundle<D> {
  /// Allocate zero-filled outputs over the full extent of `geometry`.
  pub fn allocate(
    geometry: &Geometry<D>,
    num_outputs: usize,
    data_size: usize,
    all_residuals: bool,
  ) -> Result<Self, VolumeError> {
    let all_residuals = if all_residuals {
      Some(Volume::new(*geometry, data_size)?)
    } else {
      None
    };
    Ok(Self {
      outputs: (0..num_outputs).map(|_| Volume::scalar(*geometry)).collect(),
      residual: Volume::scalar(*geometry),
      all_residuals,
      iterations: Volume::scalar(*geometry),
    })
  }

  /// Output volume `index`.
  pub fn output(&self, index: usize) -> Result<&Volume<f32, D>, IndexError> {
    self.outputs.get(index).ok_or(IndexError::Output {
      index,
      count: self.outputs.len(),
    })
  }

  pub fn num_outputs(&self) -> usize {
    self.outputs.len()
  }
}
