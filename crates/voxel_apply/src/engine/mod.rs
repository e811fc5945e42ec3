//! Voxelwise dispatch engine.
//!
//! Binds an [`Algorithm`] to input volumes, validates them, allocates the
//! output volumes and fans every active voxel out to a [`WorkerPool`].
//!
//! ```text
//!  Unconfigured ──configure()──► Configured ──run()──► Running ──► Done
//!        ▲            │ error                                       │
//!        └────────────┘◄──────────── set_* / configure() ◄──────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut engine = VoxelwiseEngine::new(algorithm, EngineConfig::default());
//! engine.set_data(0, &t1_volume)?;
//! engine.set_mask(Some(&brain_mask));
//! engine.configure()?;
//! let summary = engine.run()?;
//! let t1 = engine.output(0)?;
//! ```

mod cancel;
mod outputs;
mod task;

use std::sync::Arc;
use std::time::Duration;

use smallvec::SmallVec;
use web_time::Instant;

use crate::algorithm::Algorithm;
use crate::error::{ChannelKind, ConfigurationError, EngineError, EngineState, IndexError, PoolError};
use crate::geometry::{Geometry, Region};
use crate::metrics::{duration_us, DispatchMetrics, RunSample};
use crate::pool::{PoolConfig, WorkerPool};
use crate::progress::ProgressReporter;
use crate::volume::Volume;

pub use cancel::CancellationToken;
pub use outputs::OutputBundle;
pub use task::VoxelFailure;

use task::{SlotCursors, VoxelSources, VoxelTask};

/// Lifecycle events log at info when verbose, debug otherwise.
macro_rules! lifecycle {
  ($verbose:expr, $($arg:tt)+) => {
    if $verbose {
      tracing::info!($($arg)+);
    } else {
      tracing::debug!($($arg)+);
    }
  };
}

/// Engine settings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineConfig<const D: usize = 3> {
  /// Worker pool sizing for [`VoxelwiseEngine::run`].
  pub pool: PoolConfig,
  /// Promote lifecycle and progress logs to info.
  pub verbose: bool,
  /// Restrict processing to this region of the data extent.
  pub subregion: Option<Region<D>>,
  /// Allocate and fill the per-component residual volume.
  pub all_residuals: bool,
}

/// Counts from one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary<const D: usize = 3> {
  /// Unmasked voxels in the processed region.
  pub active_voxels: usize,
  /// Voxels submitted to the pool.
  pub dispatched: usize,
  /// Voxels zero-filled by the mask.
  pub masked: usize,
  /// Voxels whose algorithm call failed, in buffer order.
  pub failures: Vec<VoxelFailure<D>>,
  pub elapsed: Duration,
  /// Deepest the queue got right after a submission.
  pub peak_queue_depth: usize,
}

/// What `configure` validated.
#[derive(Clone, Copy, Debug)]
struct DispatchPlan<const D: usize> {
  /// Full extent of data input 0; output buffers are laid out over it.
  extent: Region<D>,
  /// Region actually processed.
  region: Region<D>,
}

#[derive(Default)]
struct Tally {
  dispatched: usize,
  masked: usize,
  peak_queue_depth: usize,
  cancelled: bool,
}

/// Applies one algorithm independently to every active voxel.
pub struct VoxelwiseEngine<'a, const D: usize = 3> {
  algorithm: Arc<dyn Algorithm>,
  config: EngineConfig<D>,
  data: Vec<Option<&'a Volume<f32, D>>>,
  consts: Vec<Option<&'a Volume<f32, D>>>,
  mask: Option<&'a Volume<f32, D>>,
  observer: Option<Box<dyn FnMut(f32) + 'a>>,
  cancel: CancellationToken,
  state: EngineState,
  plan: Option<DispatchPlan<D>>,
  outputs: Option<OutputBundle<D>>,
  failures: Vec<VoxelFailure<D>>,
  active_voxels: usize,
  elapsed: Duration,
  metrics: DispatchMetrics,
}

impl<'a, const D: usize> VoxelwiseEngine<'a, D> {
  pub fn new(algorithm: Arc<dyn Algorithm>, config: EngineConfig<D>) -> Self {
    let data = vec![None; algorithm.num_inputs()];
    let consts = vec![None; algorithm.num_consts()];
    Self {
      algorithm,
      config,
      data,
      consts,
      mask: None,
      observer: None,
      cancel: CancellationToken::new(),
      state: EngineState::Unconfigured,
      plan: None,
      outputs: None,
      failures: Vec::new(),
      active_voxels: 0,
      elapsed: Duration::ZERO,
      metrics: DispatchMetrics::new(),
    }
  }

  pub fn algorithm(&self) -> &Arc<dyn Algorithm> {
    &self.algorithm
  }

  pub fn config(&self) -> &EngineConfig<D> {
    &self.config
  }

  pub fn state(&self) -> EngineState {
    self.state
  }

  // ---------------------------------------------------------------------------
  // Inputs
  // ---------------------------------------------------------------------------

  /// Bind data input `index`.
  pub fn set_data(&mut self, index: usize, volume: &'a Volume<f32, D>) -> Result<(), IndexError> {
    let count = self.data.len();
    let slot = self.data.get_mut(index).ok_or(IndexError::Data { index, count })?;
    *slot = Some(volume);
    self.invalidate();
    Ok(())
  }

  pub fn data(&self, index: usize) -> Result<Option<&'a Volume<f32, D>>, IndexError> {
    self.data.get(index).copied().ok_or(IndexError::Data {
      index,
      count: self.data.len(),
    })
  }

  /// Bind or clear const input `index`. Unset constants use the algorithm
  /// defaults.
  pub fn set_const(&mut self, index: usize, volume: Option<&'a Volume<f32, D>>) -> Result<(), IndexError> {
    let count = self.consts.len();
    let slot = self.consts.get_mut(index).ok_or(IndexError::Const { index, count })?;
    *slot = volume;
    self.invalidate();
    Ok(())
  }

  pub fn constant(&self, index: usize) -> Result<Option<&'a Volume<f32, D>>, IndexError> {
    self.consts.get(index).copied().ok_or(IndexError::Const {
      index,
      count: self.consts.len(),
    })
  }

  /// Bind or clear the mask. Voxels where the mask is zero are skipped.
  pub fn set_mask(&mut self, mask: Option<&'a Volume<f32, D>>) {
    self.mask = mask;
    self.invalidate();
  }

  pub fn mask(&self) -> Option<&'a Volume<f32, D>> {
    self.mask
  }

  /// Restrict processing to `region` of data input 0's extent.
  pub fn set_subregion(&mut self, region: Option<Region<D>>) {
    self.config.subregion = region;
    self.invalidate();
  }

  pub fn set_all_residuals(&mut self, enabled: bool) {
    self.config.all_residuals = enabled;
    self.invalidate();
  }

  pub fn set_verbose(&mut self, verbose: bool) {
    self.config.verbose = verbose;
  }

  pub fn set_pool_config(&mut self, pool: PoolConfig) {
    self.config.pool = pool;
  }

  /// Called on the dispatch thread with the dispatched fraction, once per
  /// progress step.
  pub fn set_progress_observer<F>(&mut self, observer: F)
  where
    F: FnMut(f32) + 'a,
  {
    self.observer = Some(Box::new(observer));
  }

  pub fn clear_progress_observer(&mut self) {
    self.observer = None;
  }

  /// Replace the cancellation token.
  ///
  /// [`configure`](Self::configure) resets the token, so cancel after
  /// configuring to stop the next run.
  pub fn set_cancellation(&mut self, token: CancellationToken) {
    self.cancel = token;
  }

  /// Token that cancels this engine's runs.
  pub fn cancellation(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Changing inputs discards outputs and requires a new `configure`.
  fn invalidate(&mut self) {
    if self.state != EngineState::Unconfigured {
      tracing::trace!("inputs changed, engine unconfigured");
    }
    self.state = EngineState::Unconfigured;
    self.plan = None;
    self.outputs = None;
  }

  // ---------------------------------------------------------------------------
  // Configure
  // ---------------------------------------------------------------------------

  /// Validate the inputs and allocate outputs.
  ///
  /// On error the engine is left unconfigured with no outputs. A token
  /// cancelled by an earlier run is reset.
  #[tracing::instrument(skip_all, name = "engine::configure")]
  pub fn configure(&mut self) -> Result<(), EngineError> {
    self.invalidate();
    self.cancel.reset();
    self.failures.clear();
    self.active_voxels = 0;
    self.elapsed = Duration::ZERO;

    let verbose = self.config.verbose;
    let (plan, geometry) = self.validate()?;

    lifecycle!(verbose, region = ?plan.region, "Allocating output memory");
    let outputs = OutputBundle::allocate(
      &geometry,
      self.algorithm.num_outputs(),
      self.algorithm.data_size(),
      self.config.all_residuals,
    )
    .map_err(ConfigurationError::from)?;
    if self.config.all_residuals {
      lifecycle!(verbose, components = self.algorithm.data_size(), "Allocated output memory for all residuals");
    }

    self.plan = Some(plan);
    self.outputs = Some(outputs);
    self.state = EngineState::Configured;
    Ok(())
  }

  fn validate(&self) -> Result<(DispatchPlan<D>, Geometry<D>), ConfigurationError> {
    let algorithm = &*self.algorithm;

    let mut channels: SmallVec<[&Volume<f32, D>; 4]> = SmallVec::with_capacity(self.data.len());
    for (index, slot) in self.data.iter().enumerate() {
      channels.push(slot.ok_or(ConfigurationError::MissingDataChannel(index))?);
    }

    let size: usize = channels.iter().map(|volume| volume.components()).sum();
    if size != algorithm.data_size() {
      return Err(ConfigurationError::InputSizeMismatch {
        expected: algorithm.data_size(),
        actual: size,
      });
    }
    let first = *channels.first().ok_or(ConfigurationError::ZeroInputSize)?;
    if size == 0 {
      return Err(ConfigurationError::ZeroInputSize);
    }

    let geometry = *first.geometry();
    for (index, volume) in channels.iter().enumerate().skip(1) {
      check_geometry(&geometry, volume, ChannelKind::Data(index), false)?;
    }
    for (index, volume) in self.consts.iter().enumerate() {
      if let Some(volume) = volume {
        check_geometry(&geometry, volume, ChannelKind::Const(index), true)?;
      }
    }
    if let Some(mask) = self.mask {
      check_geometry(&geometry, mask, ChannelKind::Mask, true)?;
    }

    let defaults = algorithm.default_consts().len();
    if defaults != algorithm.num_consts() {
      return Err(ConfigurationError::DefaultConstants {
        expected: algorithm.num_consts(),
        actual: defaults,
      });
    }

    let extent = geometry.region;
    let region = match self.config.subregion {
      Some(subregion) => {
        if !extent.contains(&subregion) {
          return Err(ConfigurationError::SubregionOutside {
            start: subregion.start.to_vec(),
            size: subregion.size.to_vec(),
            extent: extent.size.to_vec(),
          });
        }
        subregion
      }
      None => extent,
    };

    Ok((DispatchPlan { extent, region }, geometry))
  }

  // ---------------------------------------------------------------------------
  // Run
  // ---------------------------------------------------------------------------

  /// Run on a pool built from [`EngineConfig::pool`].
  pub fn run(&mut self) -> Result<RunSummary<D>, EngineError> {
    self.expect_state(EngineState::Configured)?;
    let pool = WorkerPool::new(self.config.pool)?;
    self.run_on(&pool)
  }

  /// Dispatch every active voxel to `pool` and wait for all of them.
  ///
  /// Returns [`EngineError::Cancelled`] when the cancellation token fires;
  /// voxels not yet fitted keep their zero fill.
  #[tracing::instrument(skip_all, name = "engine::run", fields(workers = pool.workers()))]
  pub fn run_on(&mut self, pool: &WorkerPool) -> Result<RunSummary<D>, EngineError> {
    self.expect_state(EngineState::Configured)?;
    let Some(plan) = self.plan else {
      return Err(self.invalid_state(EngineState::Configured));
    };
    let verbose = self.config.verbose;
    self.state = EngineState::Running;

    let mask = self.mask;
    let active_voxels = match mask {
      Some(mask) => {
        lifecycle!(verbose, "Counting voxels in mask...");
        let active = count_active(mask, &plan);
        lifecycle!(verbose, "Found {active} unmasked voxels");
        active
      }
      None => plan.region.num_voxels(),
    };
    self.active_voxels = active_voxels;

    let shared = Arc::clone(&self.algorithm);
    let algorithm = shared.as_ref();
    let sources = VoxelSources::new(
      self.data.iter().flatten().copied().collect(),
      self.consts.iter().copied().collect(),
      algorithm.default_consts(),
    );
    let cancel = self.cancel.clone();
    let (failure_tx, failure_rx) = crossbeam_channel::unbounded::<VoxelFailure<D>>();
    let mut progress = ProgressReporter::new(active_voxels, verbose);
    let mut observer = self.observer.as_deref_mut();

    let Some(outputs) = self.outputs.as_mut() else {
      self.state = EngineState::Unconfigured;
      return Err(EngineError::InvalidState {
        expected: EngineState::Configured,
        found: EngineState::Unconfigured,
      });
    };
    let mut cursors = SlotCursors::new(outputs);

    lifecycle!(verbose, workers = pool.workers(), capacity = pool.capacity(), "Starting processing");
    let start = Instant::now();

    let outcome = pool.scope(|queue| -> Result<Tally, PoolError> {
      let mut tally = Tally::default();
      for position in plan.region.iter() {
        if cancel.is_cancelled() {
          tally.cancelled = true;
          break;
        }

        let index = plan.extent.linear_index(position);
        let Some(slots) = cursors.slots(index) else {
          unreachable!("voxel {index} visited out of scan order");
        };

        if mask.is_some_and(|mask| mask.voxel(index)[0] == 0.0) {
          slots.zero();
          tally.masked += 1;
          continue;
        }

        let task = VoxelTask {
          index,
          position,
          inputs: sources.inputs(index),
          consts: sources.consts(index),
          slots,
        };
        let (cancel, failure_tx) = (&cancel, &failure_tx);
        queue.enqueue(move || task.execute(algorithm, cancel, failure_tx))?;
        tally.dispatched += 1;
        tally.peak_queue_depth = tally.peak_queue_depth.max(queue.depth());

        if let (Some(fraction), Some(observer)) = (progress.completed_voxel(), observer.as_mut()) {
          observer(fraction);
        }
      }
      Ok(tally)
    });

    let elapsed = start.elapsed();
    drop(failure_tx);
    self.elapsed = elapsed;
    self.state = EngineState::Done;

    let tally = outcome?;
    let mut failures: Vec<VoxelFailure<D>> = failure_rx.try_iter().collect();
    failures.sort_by_key(|failure| failure.index);
    self.failures.clone_from(&failures);

    self.metrics.record_run(RunSample {
      dispatched: tally.dispatched,
      masked: tally.masked,
      failed: failures.len(),
      peak_queue_depth: tally.peak_queue_depth,
      elapsed_us: duration_us(elapsed),
    });

    if !failures.is_empty() {
      tracing::warn!(failed = failures.len(), "some voxels failed and were zero-filled");
    }

    if tally.cancelled {
      tracing::warn!(dispatched = tally.dispatched, active_voxels, "run cancelled");
      return Err(EngineError::Cancelled {
        dispatched: tally.dispatched,
      });
    }

    lifecycle!(verbose, elapsed = ?elapsed, "Finished processing");
    lifecycle!(verbose, mean = ?self.mean_time(), "Mean time per voxel");

    Ok(RunSummary {
      active_voxels,
      dispatched: tally.dispatched,
      masked: tally.masked,
      failures,
      elapsed,
      peak_queue_depth: tally.peak_queue_depth,
    })
  }

  fn expect_state(&self, expected: EngineState) -> Result<(), EngineError> {
    if self.state == expected {
      Ok(())
    } else {
      Err(self.invalid_state(expected))
    }
  }

  fn invalid_state(&self, expected: EngineState) -> EngineError {
    EngineError::InvalidState {
      expected,
      found: self.state,
    }
  }

  // ---------------------------------------------------------------------------
  // Results
  // ---------------------------------------------------------------------------

  fn bundle(&self) -> Result<&OutputBundle<D>, EngineError> {
    match (self.state, &self.outputs) {
      (EngineState::Configured | EngineState::Done, Some(outputs)) => Ok(outputs),
      _ => Err(self.invalid_state(EngineState::Done)),
    }
  }

  /// Output volume `index`.
  pub fn output(&self, index: usize) -> Result<&Volume<f32, D>, EngineError> {
    let count = self.algorithm.num_outputs();
    if index >= count {
      return Err(IndexError::Output { index, count }.into());
    }
    Ok(self.bundle()?.output(index)?)
  }

  pub fn residual(&self) -> Result<&Volume<f32, D>, EngineError> {
    Ok(&self.bundle()?.residual)
  }

  /// Per-component residuals; `None` unless enabled in the config.
  pub fn all_residuals(&self) -> Result<Option<&Volume<f32, D>>, EngineError> {
    Ok(self.bundle()?.all_residuals.as_ref())
  }

  pub fn iterations(&self) -> Result<&Volume<u32, D>, EngineError> {
    Ok(&self.bundle()?.iterations)
  }

  /// Take ownership of the outputs of a finished run.
  pub fn into_outputs(self) -> Result<OutputBundle<D>, EngineError> {
    match (self.state, self.outputs) {
      (EngineState::Done, Some(outputs)) => Ok(outputs),
      (found, _) => Err(EngineError::InvalidState {
        expected: EngineState::Done,
        found,
      }),
    }
  }

  /// Wall-clock time of the last run.
  pub fn total_time(&self) -> Duration {
    self.elapsed
  }

  /// Wall-clock time divided by the number of active voxels.
  pub fn mean_time(&self) -> Duration {
    if self.active_voxels == 0 {
      return Duration::ZERO;
    }
    Duration::from_secs_f64(self.elapsed.as_secs_f64() / self.active_voxels as f64)
  }

  /// Active voxels of the last run.
  pub fn evaluations(&self) -> usize {
    self.active_voxels
  }

  /// Failed voxels of the last run, in buffer order.
  pub fn failures(&self) -> &[VoxelFailure<D>] {
    &self.failures
  }

  pub fn metrics(&self) -> &DispatchMetrics {
    &self.metrics
  }

  pub fn metrics_mut(&mut self) -> &mut DispatchMetrics {
    &mut self.metrics
  }
}

fn check_geometry<const D: usize>(
  reference: &Geometry<D>,
  volume: &Volume<f32, D>,
  channel: ChannelKind,
  scalar: bool,
) -> Result<(), ConfigurationError> {
  if !volume.geometry().is_compatible(reference) {
    return Err(ConfigurationError::GeometryMismatch(channel));
  }
  if scalar && volume.components() != 1 {
    return Err(ConfigurationError::NotScalar {
      channel,
      components: volume.components(),
    });
  }
  Ok(())
}

fn count_active<const D: usize>(mask: &Volume<f32, D>, plan: &DispatchPlan<D>) -> usize {
  plan
    .region
    .iter()
    .filter(|&position| mask.voxel(plan.extent.linear_index(position))[0] != 0.0)
    .count()
}
