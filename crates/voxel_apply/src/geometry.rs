//! Grid geometry: index regions and physical placement of volumes.
//!
//! A [`Region`] is a hyper-rectangle of voxel indices. A [`Geometry`] pairs
//! the full extent of a volume with its physical spacing, origin and
//! orientation; two volumes may be processed together only when their
//! geometries are compatible.

use crate::constants::{position_to_index, GEOMETRY_TOLERANCE};

/// Hyper-rectangular index range: a start index and a size per axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region<const D: usize = 3> {
  pub start: [usize; D],
  pub size: [usize; D],
}

impl<const D: usize> Region<D> {
  /// Create a region from start and size.
  pub const fn new(start: [usize; D], size: [usize; D]) -> Self {
    Self { start, size }
  }

  /// Region starting at the origin with the given size.
  pub const fn from_size(size: [usize; D]) -> Self {
    Self { start: [0; D], size }
  }

  /// Build the sub-region covering slices `start..stop` of the last axis.
  ///
  /// `stop == 0` selects every slice from `start` to the end. The result is
  /// not clamped; containment is checked when the engine is configured.
  pub fn slices(extent: &Region<D>, start: usize, stop: usize) -> Self {
    let mut region = *extent;
    let Some(last) = D.checked_sub(1) else {
      return region;
    };
    let first = extent.start[last].saturating_add(start);
    let end = if stop == 0 {
      extent.end(last)
    } else {
      extent.start[last].saturating_add(stop)
    };
    region.start[last] = first;
    region.size[last] = end.saturating_sub(first);
    region
  }

  /// One past the last index along `axis`, or `None` past `usize::MAX`.
  #[inline]
  pub fn checked_end(&self, axis: usize) -> Option<usize> {
    self.start[axis].checked_add(self.size[axis])
  }

  /// One past the last index along `axis`, saturating at `usize::MAX`.
  #[inline]
  pub fn end(&self, axis: usize) -> usize {
    self.start[axis].saturating_add(self.size[axis])
  }

  /// Number of voxels in the region.
  #[inline]
  pub fn num_voxels(&self) -> usize {
    self.size.iter().product()
  }

  /// True when any axis has zero length.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.size.iter().any(|&s| s == 0)
  }

  /// Check if a position lies inside the region.
  #[inline]
  pub fn contains_position(&self, position: [usize; D]) -> bool {
    (0..D).all(|axis| position[axis] >= self.start[axis] && position[axis] < self.end(axis))
  }

  /// Check if `other` lies entirely inside this region.
  ///
  /// Empty regions and regions whose end overflows are never inside.
  pub fn contains(&self, other: &Region<D>) -> bool {
    if other.is_empty() {
      return false;
    }
    (0..D).all(|axis| match (other.checked_end(axis), self.checked_end(axis)) {
      (Some(other_end), Some(end)) => other.start[axis] >= self.start[axis] && other_end <= end,
      _ => false,
    })
  }

  /// Buffer offset of `position` in a buffer laid out over this region.
  #[inline]
  pub fn linear_index(&self, position: [usize; D]) -> usize {
    let mut local = position;
    for axis in 0..D {
      local[axis] -= self.start[axis];
    }
    position_to_index(local, self.size)
  }

  /// Iterate positions in scan order (axis 0 fastest).
  pub fn iter(&self) -> RegionIter<D> {
    RegionIter {
      region: *self,
      next: if self.is_empty() { None } else { Some(self.start) },
    }
  }
}

impl<const D: usize> IntoIterator for &Region<D> {
  type Item = [usize; D];
  type IntoIter = RegionIter<D>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

/// Scan-order iterator over the positions of a [`Region`].
#[derive(Clone, Debug)]
pub struct RegionIter<const D: usize> {
  region: Region<D>,
  next: Option<[usize; D]>,
}

impl<const D: usize> Iterator for RegionIter<D> {
  type Item = [usize; D];

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.next?;
    let mut advanced = current;
    let mut carried = true;
    for axis in 0..D {
      advanced[axis] += 1;
      if advanced[axis] < self.region.end(axis) {
        carried = false;
        break;
      }
      advanced[axis] = self.region.start[axis];
    }
    self.next = if carried { None } else { Some(advanced) };
    Some(current)
  }
}

/// Physical placement of a volume: full extent, spacing, origin, direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry<const D: usize = 3> {
  /// Largest possible region of the volume.
  pub region: Region<D>,
  /// Voxel spacing per axis (positive).
  pub spacing: [f64; D],
  /// Physical position of the first voxel.
  pub origin: [f64; D],
  /// Orientation matrix, row-major.
  pub direction: [[f64; D]; D],
}

impl<const D: usize> Geometry<D> {
  /// Unit spacing, zero origin and identity direction.
  pub fn new(size: [usize; D]) -> Self {
    let mut direction = [[0.0; D]; D];
    for (axis, row) in direction.iter_mut().enumerate() {
      row[axis] = 1.0;
    }
    Self {
      region: Region::from_size(size),
      spacing: [1.0; D],
      origin: [0.0; D],
      direction,
    }
  }

  pub fn with_spacing(mut self, spacing: [f64; D]) -> Self {
    self.spacing = spacing;
    self
  }

  pub fn with_origin(mut self, origin: [f64; D]) -> Self {
    self.origin = origin;
    self
  }

  pub fn with_direction(mut self, direction: [[f64; D]; D]) -> Self {
    self.direction = direction;
    self
  }

  /// Number of voxels in the full extent.
  #[inline]
  pub fn num_voxels(&self) -> usize {
    self.region.num_voxels()
  }

  /// Regions must match exactly; physical fields within tolerance.
  pub fn is_compatible(&self, other: &Geometry<D>) -> bool {
    let close = |a: f64, b: f64| (a - b).abs() <= GEOMETRY_TOLERANCE;
    self.region == other.region
      && self.spacing.iter().zip(&other.spacing).all(|(&a, &b)| close(a, b))
      && self.origin.iter().zip(&other.origin).all(|(&a, &b)| close(a, b))
      && self
        .direction
        .iter()
        .flatten()
        .zip(other.direction.iter().flatten())
        .all(|(&a, &b)| close(a, b))
  }

  /// Physical position of the voxel at `position`.
  pub fn index_to_physical(&self, position: [usize; D]) -> [f64; D] {
    let mut point = self.origin;
    for (row, value) in point.iter_mut().enumerate() {
      for col in 0..D {
        *value += self.direction[row][col] * self.spacing[col] * position[col] as f64;
      }
    }
    point
  }
}

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;
