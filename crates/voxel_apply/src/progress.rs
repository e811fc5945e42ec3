//! Coarse progress reporting for the dispatch loop.
//!
//! Only the dispatch thread advances the reporter, so it needs no
//! synchronization. Because `enqueue` blocks when the queue is full,
//! "dispatched" never runs more than one queue's worth ahead of "finished".

use crate::constants::PROGRESS_STEPS;

/// Counts dispatched voxels and signals every `1/steps` of the total.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
  total: usize,
  completed: usize,
  interval: usize,
  next_report: usize,
  verbose: bool,
}

impl ProgressReporter {
  /// Reporter emitting [`PROGRESS_STEPS`] signals over `total` voxels.
  pub fn new(total: usize, verbose: bool) -> Self {
    Self::with_steps(total, PROGRESS_STEPS, verbose)
  }

  pub fn with_steps(total: usize, steps: usize, verbose: bool) -> Self {
    let interval = (total / steps.max(1)).max(1);
    Self {
      total,
      completed: 0,
      interval,
      next_report: interval,
      verbose,
    }
  }

  /// Record one dispatched voxel.
  ///
  /// Returns the completed fraction when a reporting step is crossed.
  pub fn completed_voxel(&mut self) -> Option<f32> {
    self.completed += 1;
    if self.completed < self.next_report {
      return None;
    }
    self.next_report += self.interval;

    let fraction = self.fraction();
    if self.verbose {
      tracing::info!(completed = self.completed, total = self.total, "{:.0}% dispatched", fraction * 100.0);
    } else {
      tracing::debug!(completed = self.completed, total = self.total, fraction, "progress");
    }
    Some(fraction)
  }

  /// Completed fraction in `[0, 1]`. An empty run counts as complete.
  pub fn fraction(&self) -> f32 {
    if self.total == 0 {
      1.0
    } else {
      (self.completed as f64 / self.total as f64).min(1.0) as f32
    }
  }

  pub fn completed(&self) -> usize {
    self.completed
  }

  pub fn total(&self) -> usize {
    self.total
  }
}

#[cfg(test)]
#[path = "progress_test.rs"]
mod progress_test;
