//! Per-voxel task records and the output slots they write.
//!
//! The dispatch thread walks the active region in scan order. Buffer offsets
//! strictly increase along that walk, so each output buffer can be handed out
//! one `&mut` element at a time through a forward-only [`SlotCursor`]. Every
//! task therefore owns exclusive references to its own output slots and
//! writes them without synchronization.
//!
//! ```text
//!  outputs[k]   ┌──┬──┬──┬──┬──┬──┐      cursor.seek(4)
//!  residual     │  │  │  │  │▓▓│  │ ───► VoxelSlots { &mut out[4], .. }
//!  iterations   └──┴──┴──┴──┴──┴──┘
//!                          scan order ─►
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::slice::{ChunksExactMut, IterMut};

use crossbeam_channel::Sender;
use smallvec::SmallVec;

use super::cancel::CancellationToken;
use super::outputs::OutputBundle;
use crate::algorithm::{Algorithm, ConstVector, InputVector, VoxelFit};
use crate::constants::INLINE_PARAMS;
use crate::error::AlgorithmError;
use crate::volume::Volume;

/// A voxel whose algorithm call failed. Its outputs were zero-filled.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelFailure<const D: usize = 3> {
  /// Linear index into the output buffers.
  pub index: usize,
  pub position: [usize; D],
  pub error: AlgorithmError,
}

/// Forward-only cursor handing out elements of a buffer by linear index.
pub(crate) struct SlotCursor<I> {
  iter: I,
  next: usize,
}

impl<I: Iterator> SlotCursor<I> {
  pub(crate) fn new(iter: I) -> Self {
    Self { iter, next: 0 }
  }

  /// Element at `index`. Returns `None` when `index` was already passed or is
  /// out of range.
  pub(crate) fn seek(&mut self, index: usize) -> Option<I::Item> {
    let skip = index.checked_sub(self.next)?;
    self.next = index + 1;
    self.iter.nth(skip)
  }
}

/// Exclusive references to one voxel's output values.
pub(crate) struct VoxelSlots<'o> {
  outputs: SmallVec<[&'o mut f32; INLINE_PARAMS]>,
  residual: &'o mut f32,
  residuals: Option<&'o mut [f32]>,
  iterations: &'o mut u32,
}

impl VoxelSlots<'_> {
  /// Store a fit whose shape has been checked.
  pub(crate) fn write(self, fit: &VoxelFit) {
    for (slot, &value) in self.outputs.into_iter().zip(fit.outputs.iter()) {
      *slot = value;
    }
    *self.residual = fit.residual;
    if let Some(residuals) = self.residuals {
      residuals.copy_from_slice(&fit.residuals);
    }
    *self.iterations = fit.iterations;
  }

  /// Zero every output, as for masked or failed voxels.
  pub(crate) fn zero(self) {
    for slot in self.outputs {
      *slot = 0.0;
    }
    *self.residual = 0.0;
    if let Some(residuals) = self.residuals {
      residuals.fill(0.0);
    }
    *self.iterations = 0;
  }
}

/// Cursors over every buffer of an [`OutputBundle`].
pub(crate) struct SlotCursors<'o> {
  outputs: Vec<SlotCursor<IterMut<'o, f32>>>,
  residual: SlotCursor<IterMut<'o, f32>>,
  residuals: Option<SlotCursor<ChunksExactMut<'o, f32>>>,
  iterations: SlotCursor<IterMut<'o, u32>>,
}

impl<'o> SlotCursors<'o> {
  pub(crate) fn new<const D: usize>(bundle: &'o mut OutputBundle<D>) -> Self {
    let OutputBundle {
      outputs,
      residual,
      all_residuals,
      iterations,
    } = bundle;

    Self {
      outputs: outputs
        .iter_mut()
        .map(|volume| SlotCursor::new(volume.data_mut().iter_mut()))
        .collect(),
      residual: SlotCursor::new(residual.data_mut().iter_mut()),
      residuals: all_residuals.as_mut().map(|volume| {
        let components = volume.components();
        SlotCursor::new(volume.data_mut().chunks_exact_mut(components))
      }),
      iterations: SlotCursor::new(iterations.data_mut().iter_mut()),
    }
  }

  /// Slots of the voxel at `index`. Indices must strictly increase between
  /// calls.
  pub(crate) fn slots(&mut self, index: usize) -> Option<VoxelSlots<'o>> {
    let mut outputs = SmallVec::with_capacity(self.outputs.len());
    for cursor in &mut self.outputs {
      outputs.push(cursor.seek(index)?);
    }
    let residual = self.residual.seek(index)?;
    let residuals = match &mut self.residuals {
      Some(cursor) => Some(cursor.seek(index)?),
      None => None,
    };
    let iterations = self.iterations.seek(index)?;

    Some(VoxelSlots {
      outputs,
      residual,
      residuals,
      iterations,
    })
  }
}

/// Read-only view of the inputs snapshotted into each task.
pub(crate) struct VoxelSources<'v, const D: usize> {
  data: SmallVec<[&'v Volume<f32, D>; 4]>,
  consts: SmallVec<[Option<&'v Volume<f32, D>>; INLINE_PARAMS]>,
  defaults: ConstVector,
  data_size: usize,
}

impl<'v, const D: usize> VoxelSources<'v, D> {
  pub(crate) fn new(
    data: SmallVec<[&'v Volume<f32, D>; 4]>,
    consts: SmallVec<[Option<&'v Volume<f32, D>>; INLINE_PARAMS]>,
    defaults: ConstVector,
  ) -> Self {
    let data_size = data.iter().map(|volume| volume.components()).sum();
    Self {
      data,
      consts,
      defaults,
      data_size,
    }
  }

  /// Data channel components at `index`, concatenated in channel order.
  pub(crate) fn inputs(&self, index: usize) -> InputVector {
    let mut inputs = InputVector::with_capacity(self.data_size);
    for volume in &self.data {
      inputs.extend_from_slice(volume.voxel(index));
    }
    inputs
  }

  /// Constants at `index`: the const channel value where set, the default
  /// otherwise.
  pub(crate) fn consts(&self, index: usize) -> ConstVector {
    let mut consts = self.defaults.clone();
    for (value, volume) in consts.iter_mut().zip(&self.consts) {
      if let Some(volume) = volume {
        *value = volume.voxel(index)[0];
      }
    }
    consts
  }
}

/// Everything a worker needs to fit one voxel.
pub(crate) struct VoxelTask<'o, const D: usize> {
  pub(crate) index: usize,
  pub(crate) position: [usize; D],
  pub(crate) inputs: InputVector,
  pub(crate) consts: ConstVector,
  pub(crate) slots: VoxelSlots<'o>,
}

impl<const D: usize> VoxelTask<'_, D> {
  /// Run the algorithm and store its result.
  ///
  /// Errors and panics are contained: the voxel is zero-filled and reported
  /// through `failures`. Nothing is written once `cancel` is set.
  pub(crate) fn execute(
    self,
    algorithm: &dyn Algorithm,
    cancel: &CancellationToken,
    failures: &Sender<VoxelFailure<D>>,
  ) {
    if cancel.is_cancelled() {
      return;
    }

    let num_outputs = algorithm.num_outputs();
    let data_size = algorithm.data_size();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| algorithm.apply(&self.inputs, &self.consts)))
      .unwrap_or_else(|payload| Err(AlgorithmError::Panicked(panic_message(&*payload))))
      .and_then(|fit| fit.check_shape(num_outputs, data_size).map(|()| fit));

    match outcome {
      Ok(fit) => self.slots.write(&fit),
      Err(error) => {
        tracing::warn!(index = self.index, position = ?self.position, %error, "voxel fit failed");
        self.slots.zero();
        // The receiver outlives the dispatch scope.
        let _ = failures.send(VoxelFailure {
          index: self.index,
          position: self.position,
          error,
        });
      }
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic payload".to_string()
  }
}

#[cfg(test)]
#[path = "task_test.rs"]
mod task_test;
