//! Per-voxel algorithm contract and tag-based registry.
//!
//! An [`Algorithm`] turns one voxel's input vector (all data channels'
//! components, concatenated) and constants vector into a [`VoxelFit`]. The
//! engine owns scheduling; implementations only see plain slices.
//!
//! ```text
//!   data 0 ──┐
//!   data 1 ──┼── inputs[dataSize] ──┐         ┌── outputs[numOutputs]
//!   ...    ──┘                      ├─ apply ─┼── residual
//!   const k (or default) ─ consts ──┘         ├── residuals[dataSize]
//!                                             └── iterations
//! ```

use std::sync::Arc;

use smallvec::SmallVec;

use crate::constants::{INLINE_INPUTS, INLINE_PARAMS};
use crate::error::{AlgorithmError, ConfigurationError};

/// Per-voxel input vector (concatenated data channel components).
pub type InputVector = SmallVec<[f32; INLINE_INPUTS]>;

/// Per-voxel constants vector.
pub type ConstVector = SmallVec<[f32; INLINE_PARAMS]>;

/// Result of applying an algorithm to one voxel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoxelFit {
  /// One value per output channel.
  pub outputs: SmallVec<[f32; INLINE_PARAMS]>,
  /// Summary residual (fit quality).
  pub residual: f32,
  /// Residual per input component.
  pub residuals: SmallVec<[f32; INLINE_INPUTS]>,
  /// Iterations used by the solver.
  pub iterations: u32,
}

impl VoxelFit {
  /// Zero-filled fit of the given shape.
  ///
  /// Algorithms return this for inputs outside their valid domain.
  pub fn zeros(num_outputs: usize, data_size: usize) -> Self {
    Self {
      outputs: SmallVec::from_elem(0.0, num_outputs),
      residual: 0.0,
      residuals: SmallVec::from_elem(0.0, data_size),
      iterations: 0,
    }
  }

  /// Check the fit matches the algorithm's declared shape.
  pub fn check_shape(&self, num_outputs: usize, data_size: usize) -> Result<(), AlgorithmError> {
    if self.outputs.len() != num_outputs {
      return Err(AlgorithmError::Shape {
        what: "outputs",
        expected: num_outputs,
        actual: self.outputs.len(),
      });
    }
    if self.residuals.len() != data_size {
      return Err(AlgorithmError::Shape {
        what: "residuals",
        expected: data_size,
        actual: self.residuals.len(),
      });
    }
    Ok(())
  }
}

/// A computation applied independently to every voxel.
///
/// `apply` is called concurrently from worker threads with independent
/// arguments and must not depend on call order. Numerically invalid input
/// (e.g. a non-positive T1) should produce [`VoxelFit::zeros`] rather than an
/// error; `Err` is reserved for genuine failures.
pub trait Algorithm: Send + Sync {
  /// Number of required data volumes (at least 1).
  fn num_inputs(&self) -> usize;

  /// Number of constant slots (each optionally backed by a volume).
  fn num_consts(&self) -> usize;

  /// Number of scalar output volumes (at least 1).
  fn num_outputs(&self) -> usize;

  /// Total input vector length across all data channels.
  fn data_size(&self) -> usize;

  /// Constants used for slots without a volume. Length `num_consts()`.
  fn default_consts(&self) -> ConstVector;

  /// Fit one voxel.
  fn apply(&self, inputs: &[f32], consts: &[f32]) -> Result<VoxelFit, AlgorithmError>;
}

/// Constructor stored in the registry.
pub type AlgorithmFactory = Box<dyn Fn() -> Arc<dyn Algorithm> + Send + Sync>;

struct RegistryEntry {
  tag: char,
  name: &'static str,
  factory: AlgorithmFactory,
}

/// Small registry selecting an algorithm variant by single-letter tag.
///
/// ```ignore
/// let mut registry = AlgorithmRegistry::new();
/// registry.register('l', "levenberg-marquardt", || Arc::new(LmFit::default()));
/// registry.register('s', "region-contraction", || Arc::new(SrcFit::default()));
///
/// let algorithm = registry.select('s')?;
/// ```
#[derive(Default)]
pub struct AlgorithmRegistry {
  entries: Vec<RegistryEntry>,
}

impl AlgorithmRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a variant. A repeated tag replaces the earlier entry.
  pub fn register<F>(&mut self, tag: char, name: &'static str, factory: F) -> &mut Self
  where
    F: Fn() -> Arc<dyn Algorithm> + Send + Sync + 'static,
  {
    let entry = RegistryEntry {
      tag,
      name,
      factory: Box::new(factory),
    };
    match self.entries.iter_mut().find(|e| e.tag == tag) {
      Some(existing) => *existing = entry,
      None => self.entries.push(entry),
    }
    self
  }

  /// Construct the variant registered under `tag`.
  pub fn select(&self, tag: char) -> Result<Arc<dyn Algorithm>, ConfigurationError> {
    let entry = self
      .entries
      .iter()
      .find(|e| e.tag == tag)
      .ok_or(ConfigurationError::UnknownAlgorithm(tag))?;
    tracing::debug!(tag = %entry.tag, name = entry.name, "algorithm selected");
    Ok((entry.factory)())
  }

  /// Descriptive name registered under `tag`.
  pub fn name(&self, tag: char) -> Option<&'static str> {
    self.entries.iter().find(|e| e.tag == tag).map(|e| e.name)
  }

  /// Registered `(tag, name)` pairs in registration order.
  pub fn tags(&self) -> impl Iterator<Item = (char, &'static str)> + '_ {
    self.entries.iter().map(|e| (e.tag, e.name))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
#[path = "algorithm_test.rs"]
mod algorithm_test;
