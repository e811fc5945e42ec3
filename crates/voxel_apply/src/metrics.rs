//! Engine-agnostic run metrics for voxelwise dispatch.
//!
//! Feature-gated and runtime-toggled to ensure zero overhead when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use voxel_apply::metrics::{DispatchMetrics, COLLECT_METRICS};
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! // The engine records every run:
//! let summary = engine.run()?;
//! println!("{:.1} us/run", engine.metrics().avg_run_us());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Runtime toggle for metrics collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
    #[cfg(feature = "metrics")]
    {
        COLLECT_METRICS.load(Ordering::Relaxed)
    }
    #[cfg(not(feature = "metrics"))]
    {
        false
    }
}

/// Whole microseconds in `duration`, saturating at `u64::MAX`.
#[inline]
pub fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Recent run durations; the oldest is evicted once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buffer: VecDeque<u64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Mean of the retained samples, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        self.buffer.iter().sum::<u64>() as f64 / self.buffer.len() as f64
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Snapshot of one completed (or cancelled) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSample {
    pub dispatched: usize,
    pub masked: usize,
    pub failed: usize,
    pub peak_queue_depth: usize,
    pub elapsed_us: u64,
}

/// Cumulative statistics across runs of one engine.
#[derive(Debug, Clone, Default)]
pub struct DispatchMetrics {
    /// Runs recorded.
    pub runs: u64,
    /// Voxels handed to the worker pool.
    pub dispatched_voxels: u64,
    /// Voxels zero-filled by the mask.
    pub masked_voxels: u64,
    /// Voxels whose algorithm call failed.
    pub failed_voxels: u64,
    /// Highest queue depth seen by the dispatch thread in any run.
    pub peak_queue_depth: usize,
    /// Total duration of all recorded runs in microseconds.
    pub total_run_us: u64,
    /// Recent run durations in microseconds.
    pub run_timings: RollingWindow,
    /// Duration of the latest run in microseconds.
    pub last_run_us: u64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_run(&mut self, sample: RunSample) {
        if !is_enabled() {
            return;
        }
        self.runs += 1;
        self.dispatched_voxels += sample.dispatched as u64;
        self.masked_voxels += sample.masked as u64;
        self.failed_voxels += sample.failed as u64;
        self.peak_queue_depth = self.peak_queue_depth.max(sample.peak_queue_depth);
        self.total_run_us = self.total_run_us.saturating_add(sample.elapsed_us);
        self.run_timings.push(sample.elapsed_us);
        self.last_run_us = sample.elapsed_us;
    }

    pub fn avg_run_us(&self) -> f64 {
        self.run_timings.average()
    }

    /// Mean time per dispatched voxel over every recorded run.
    pub fn avg_voxel_us(&self) -> f64 {
        if self.dispatched_voxels == 0 {
            return 0.0;
        }
        self.total_run_us as f64 / self.dispatched_voxels as f64
    }
}
