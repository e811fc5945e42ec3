//! Multi-component voxel volumes.

use crate::error::VolumeError;
use crate::geometry::{Geometry, Region};

/// N-dimensional grid of voxels, each holding `components` values.
///
/// Storage is interleaved per voxel, axis 0 fastest (see
/// [`crate::constants`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Volume<T, const D: usize = 3> {
  geometry: Geometry<D>,
  components: usize,
  data: Vec<T>,
}

impl<T: Clone + Default, const D: usize> Volume<T, D> {
  /// Allocate a volume filled with `T::default()`.
  pub fn new(geometry: Geometry<D>, components: usize) -> Result<Self, VolumeError> {
    if components == 0 {
      return Err(VolumeError::ZeroComponents);
    }
    Ok(Self {
      data: vec![T::default(); geometry.num_voxels() * components],
      geometry,
      components,
    })
  }

  /// Allocate a single-component volume.
  pub fn scalar(geometry: Geometry<D>) -> Self {
    Self {
      data: vec![T::default(); geometry.num_voxels()],
      geometry,
      components: 1,
    }
  }

  /// Reset every value to `T::default()`.
  pub fn clear(&mut self) {
    self.data.fill(T::default());
  }
}

impl<T, const D: usize> Volume<T, D> {
  /// Wrap an existing buffer.
  pub fn from_vec(geometry: Geometry<D>, components: usize, data: Vec<T>) -> Result<Self, VolumeError> {
    if components == 0 {
      return Err(VolumeError::ZeroComponents);
    }
    let expected = geometry.num_voxels() * components;
    if data.len() != expected {
      return Err(VolumeError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      geometry,
      components,
      data,
    })
  }

  /// Build a volume by evaluating `f` at every position (scan order).
  pub fn from_fn<F>(geometry: Geometry<D>, components: usize, mut f: F) -> Result<Self, VolumeError>
  where
    F: FnMut([usize; D]) -> Vec<T>,
  {
    let mut data = Vec::with_capacity(geometry.num_voxels() * components);
    for position in geometry.region.iter() {
      data.extend(f(position));
    }
    Self::from_vec(geometry, components, data)
  }

  #[inline]
  pub fn geometry(&self) -> &Geometry<D> {
    &self.geometry
  }

  /// Full extent of the volume.
  #[inline]
  pub fn region(&self) -> &Region<D> {
    &self.geometry.region
  }

  #[inline]
  pub fn components(&self) -> usize {
    self.components
  }

  #[inline]
  pub fn num_voxels(&self) -> usize {
    self.geometry.num_voxels()
  }

  #[inline]
  pub fn data(&self) -> &[T] {
    &self.data
  }

  #[inline]
  pub fn data_mut(&mut self) -> &mut [T] {
    &mut self.data
  }

  pub fn into_vec(self) -> Vec<T> {
    self.data
  }

  /// Components of the voxel at linear `index`.
  #[inline]
  pub fn voxel(&self, index: usize) -> &[T] {
    let start = index * self.components;
    &self.data[start..start + self.components]
  }

  /// Mutable components of the voxel at linear `index`.
  #[inline]
  pub fn voxel_mut(&mut self, index: usize) -> &mut [T] {
    let start = index * self.components;
    &mut self.data[start..start + self.components]
  }

  /// Components of the voxel at `position`.
  #[inline]
  pub fn get(&self, position: [usize; D]) -> &[T] {
    self.voxel(self.geometry.region.linear_index(position))
  }

  /// Mutable components of the voxel at `position`.
  #[inline]
  pub fn get_mut(&mut self, position: [usize; D]) -> &mut [T] {
    let index = self.geometry.region.linear_index(position);
    self.voxel_mut(index)
  }
}

#[cfg(test)]
#[path = "volume_test.rs"]
mod volume_test;
