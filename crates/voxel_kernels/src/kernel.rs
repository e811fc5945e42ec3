//! Filter kernels evaluated over centred k-space positions.
//!
//! Each kernel maps a position (relative to the centre of the grid), the grid
//! size and the voxel spacing to a weight. Tukey, Hamming and Blackman depend
//! only on the normalised radius
//!
//! ```text
//! r = sqrt(((pos / size)^2).sum() / 3)
//! ```
//!
//! while Gauss is separable with a per-axis width.
//!
//! Kernels round-trip through a comma-separated text form:
//! `Tukey,0.75,0.25`, `Hamming,0.54,0.46`, `Gauss,2,2,1`, `Blackman,0.16`.
//! A bare name selects the defaults.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use glam::DVec3;
use thiserror::Error;

/// Kernel text that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
  #[error("Unknown filter type '{0}'")]
  UnknownKernel(String),

  #[error("{kernel} takes {expected} parameters, found {actual}")]
  ParameterCount {
    kernel: &'static str,
    expected: &'static str,
    actual: usize,
  },

  #[error("Invalid {kernel} parameter '{value}'")]
  InvalidNumber { kernel: &'static str, value: String },
}

/// Windowing and smoothing kernels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kernel {
  /// Flat top of radius `1 - a` with a cosine taper. `q` is the value at the
  /// edge of the grid.
  Tukey { a: f64, q: f64 },
  /// Generalised Hamming window.
  Hamming { a: f64, b: f64 },
  /// Gaussian with full-width-half-maximum per axis, in voxels of image space.
  Gauss { fwhm: DVec3 },
  /// Blackman window.
  Blackman { alpha: f64 },
}

impl Kernel {
  pub const TUKEY: Self = Self::Tukey { a: 0.75, q: 0.25 };
  pub const HAMMING: Self = Self::Hamming { a: 0.54, b: 0.46 };
  pub const GAUSS: Self = Self::Gauss { fwhm: DVec3::ONE };
  pub const BLACKMAN: Self = Self::Blackman { alpha: 0.16 };

  /// Kernel name as used in the text form.
  pub fn name(&self) -> &'static str {
    match self {
      Kernel::Tukey { .. } => "Tukey",
      Kernel::Hamming { .. } => "Hamming",
      Kernel::Gauss { .. } => "Gauss",
      Kernel::Blackman { .. } => "Blackman",
    }
  }

  /// Weight at `pos` for a grid of `size` voxels with `spacing`.
  pub fn value(&self, pos: DVec3, size: DVec3, spacing: DVec3) -> f64 {
    match *self {
      Kernel::Tukey { a, q } => {
        let r = radius(pos, size);
        if r <= 1.0 - a {
          1.0
        } else {
          0.5 * ((1.0 + q) + (1.0 - q) * (PI * (r - (1.0 - a)) / a).cos())
        }
      }
      Kernel::Hamming { a, b } => {
        let r = radius(pos, size);
        a - b * (PI * (1.0 + r)).cos()
      }
      Kernel::Gauss { fwhm } => {
        let m = 2.0 * (2.0 * 2f64.ln()).sqrt() / PI;
        let sigma = m * size * spacing / fwhm;
        (-(pos / sigma).length_squared() / 2.0).exp()
      }
      Kernel::Blackman { alpha } => {
        let r = radius(pos, size);
        let a0 = (1.0 - alpha) / 2.0;
        let a1 = 0.5;
        let a2 = alpha / 2.0;
        a0 - a1 * (PI * (1.0 + r)).cos() + a2 * (2.0 * PI * (1.0 + r)).cos()
      }
    }
  }

  /// Weights for every voxel of a `size` grid centred on `size / 2`, axis 0
  /// fastest.
  pub fn weights(&self, size: [usize; 3], spacing: DVec3) -> Vec<f64> {
    let extent = DVec3::new(size[0] as f64, size[1] as f64, size[2] as f64);
    let centre = (extent / 2.0).floor();
    let mut weights = Vec::with_capacity(size.iter().product());
    for z in 0..size[2] {
      for y in 0..size[1] {
        for x in 0..size[0] {
          let pos = DVec3::new(x as f64, y as f64, z as f64) - centre;
          weights.push(self.value(pos, extent, spacing));
        }
      }
    }
    weights
  }
}

impl Default for Kernel {
  fn default() -> Self {
    Self::TUKEY
  }
}

#[inline]
fn radius(pos: DVec3, size: DVec3) -> f64 {
  ((pos / size).length_squared() / 3.0).sqrt()
}

impl fmt::Display for Kernel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Kernel::Tukey { a, q } => write!(f, "Tukey,{a},{q}"),
      Kernel::Hamming { a, b } => write!(f, "Hamming,{a},{b}"),
      Kernel::Gauss { fwhm } => write!(f, "Gauss,{},{},{}", fwhm.x, fwhm.y, fwhm.z),
      Kernel::Blackman { alpha } => write!(f, "Blackman,{alpha}"),
    }
  }
}

impl FromStr for Kernel {
  type Err = KernelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut fields = s.trim().split(',').map(str::trim);
    let name = fields.next().unwrap_or_default();
    let rest: Vec<&str> = fields.collect();

    let kernel = match name {
      "Tukey" => Kernel::TUKEY,
      "Hamming" => Kernel::HAMMING,
      "Gauss" => Kernel::GAUSS,
      "Blackman" => Kernel::BLACKMAN,
      other => return Err(KernelError::UnknownKernel(other.to_string())),
    };
    if rest.is_empty() {
      return Ok(kernel);
    }

    let kernel_name = kernel.name();
    let values = rest
      .iter()
      .map(|value| {
        value.parse::<f64>().map_err(|_| KernelError::InvalidNumber {
          kernel: kernel_name,
          value: (*value).to_string(),
        })
      })
      .collect::<Result<Vec<f64>, _>>()?;

    let count = |expected: &'static str| KernelError::ParameterCount {
      kernel: kernel_name,
      expected,
      actual: values.len(),
    };

    match (kernel, values.as_slice()) {
      (Kernel::Tukey { .. }, &[a, q]) => Ok(Kernel::Tukey { a, q }),
      (Kernel::Tukey { .. }, _) => Err(count("0 or 2")),
      (Kernel::Hamming { .. }, &[a, b]) => Ok(Kernel::Hamming { a, b }),
      (Kernel::Hamming { .. }, _) => Err(count("0 or 2")),
      (Kernel::Gauss { .. }, &[w]) => Ok(Kernel::Gauss { fwhm: DVec3::splat(w) }),
      (Kernel::Gauss { .. }, &[x, y, z]) => Ok(Kernel::Gauss {
        fwhm: DVec3::new(x, y, z),
      }),
      (Kernel::Gauss { .. }, _) => Err(count("0, 1 or 3")),
      (Kernel::Blackman { .. }, &[alpha]) => Ok(Kernel::Blackman { alpha }),
      (Kernel::Blackman { .. }, _) => Err(count("0 or 1")),
    }
  }
}

#[cfg(test)]
#[path = "kernel_test.rs"]
mod kernel_test;
