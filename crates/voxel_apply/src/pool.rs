//! Fixed-size worker pool fed by a bounded FIFO queue.
//!
//! Workers live on a dedicated rayon thread pool and pull boxed jobs from a
//! `crossbeam_channel::bounded` queue. `enqueue` blocks while the queue is
//! full, which is the backpressure that keeps the number of in-flight voxel
//! snapshots bounded when fitting is slower than dispatch.
//!
//! ```text
//!  dispatch thread                 bounded queue              workers
//! ┌────────────────┐  enqueue   ┌───┬───┬───┬───┐   recv   ┌──────────┐
//! │ for voxel in.. ├──────────►│ j │ j │ j │ j ├────────►│ worker-0 │
//! │                │ (blocks    └───┴───┴───┴───┘          │ worker-1 │
//! └────────────────┘  when full)                           │ ...      │
//!                                                          └──────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let pool = WorkerPool::new(PoolConfig::with_workers(4))?;
//! let mut results = vec![0u64; 1024];
//!
//! pool.scope(|queue| {
//!     for (i, slot) in results.iter_mut().enumerate() {
//!         queue.enqueue(move || *slot = expensive(i))?;
//!     }
//!     Ok::<_, PoolError>(())
//! })?;
//! // Every job has finished here.
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{self as channel, Receiver, Sender, TrySendError};

use crate::constants::{QUEUE_SLOTS_PER_WORKER, WORKER_NAME_PREFIX};
use crate::error::{ConfigurationError, PoolError};

/// Unit of work executed on a worker thread.
///
/// `'env` lets jobs borrow data that outlives the enclosing
/// [`WorkerPool::scope`] call, such as disjoint slices of output buffers.
pub type Job<'env> = Box<dyn FnOnce() + Send + 'env>;

/// Worker pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
  /// Worker threads (0 = hardware concurrency).
  pub workers: usize,
  /// Queue slots (0 = `workers * QUEUE_SLOTS_PER_WORKER`).
  pub queue_capacity: usize,
}

impl PoolConfig {
  /// Hardware concurrency with the default queue depth.
  pub const DEFAULT: Self = Self {
    workers: 0,
    queue_capacity: 0,
  };

  /// Explicit worker count with the default queue depth.
  pub const fn with_workers(workers: usize) -> Self {
    Self {
      workers,
      queue_capacity: 0,
    }
  }

  /// Worker count after resolving the hardware default.
  pub fn resolved_workers(&self) -> usize {
    if self.workers == 0 {
      hardware_concurrency()
    } else {
      self.workers
    }
  }

  /// Queue capacity after resolving the per-worker default.
  pub fn resolved_capacity(&self) -> usize {
    if self.queue_capacity == 0 {
      self.resolved_workers() * QUEUE_SLOTS_PER_WORKER
    } else {
      self.queue_capacity
    }
  }
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// Number of hardware threads, falling back to 1 when unknown.
pub fn hardware_concurrency() -> usize {
  std::thread::available_parallelism()
    .map(|n| n.get())
    .unwrap_or(1)
}

#[derive(Default)]
struct QueueStats {
  /// Jobs currently executing.
  active: AtomicUsize,
  /// Jobs finished since the scope opened.
  completed: AtomicUsize,
}

/// Fixed set of worker threads consuming a bounded job queue.
pub struct WorkerPool {
  threads: rayon::ThreadPool,
  workers: usize,
  capacity: usize,
}

impl WorkerPool {
  /// Spawn the worker threads.
  pub fn new(config: PoolConfig) -> Result<Self, ConfigurationError> {
    let workers = config.resolved_workers();
    let capacity = config.resolved_capacity();

    let threads = rayon::ThreadPoolBuilder::new()
      .num_threads(workers)
      .thread_name(|i| format!("{WORKER_NAME_PREFIX}-{i}"))
      .build()
      .map_err(|e| ConfigurationError::InvalidPool(e.to_string()))?;

    tracing::debug!(workers, capacity, "worker pool started");

    Ok(Self {
      threads,
      workers,
      capacity,
    })
  }

  /// Number of worker threads.
  pub fn workers(&self) -> usize {
    self.workers
  }

  /// Maximum number of queued (not yet running) jobs.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Run `op` with a queue feeding the workers, then wait for every job.
  ///
  /// `op` runs on the calling thread. When it returns the queue is closed;
  /// `scope` returns only after all queued and running jobs have finished.
  pub fn scope<'env, F, R>(&self, op: F) -> R
  where
    F: FnOnce(&TaskQueue<'env>) -> R,
  {
    let (sender, receiver) = channel::bounded::<Job<'env>>(self.capacity);
    let stats = Arc::new(QueueStats::default());

    self.threads.in_place_scope(|scope| {
      for worker in 0..self.workers {
        let receiver = receiver.clone();
        let stats = Arc::clone(&stats);
        scope.spawn(move |_| run_worker(worker, receiver, &stats));
      }
      drop(receiver);

      let queue = TaskQueue {
        sender,
        capacity: self.capacity,
        stats,
      };
      let result = op(&queue);
      // Closing the queue lets workers exit once it drains.
      drop(queue);
      result
    })
  }
}

fn run_worker(worker: usize, receiver: Receiver<Job<'_>>, stats: &QueueStats) {
  let mut executed = 0usize;
  for job in receiver.iter() {
    stats.active.fetch_add(1, Ordering::AcqRel);
    job();
    stats.active.fetch_sub(1, Ordering::AcqRel);
    stats.completed.fetch_add(1, Ordering::AcqRel);
    executed += 1;
  }
  tracing::trace!(worker, executed, "worker drained");
}

/// Producer handle for the jobs of one [`WorkerPool::scope`].
pub struct TaskQueue<'env> {
  sender: Sender<Job<'env>>,
  capacity: usize,
  stats: Arc<QueueStats>,
}

impl<'env> TaskQueue<'env> {
  /// Submit a job, blocking while the queue is full.
  pub fn enqueue<F>(&self, job: F) -> Result<(), PoolError>
  where
    F: FnOnce() + Send + 'env,
  {
    self
      .sender
      .send(Box::new(job))
      .map_err(|_| PoolError::Closed)
  }

  /// Submit a job without blocking. The job is dropped when rejected.
  pub fn try_enqueue<F>(&self, job: F) -> Result<(), PoolError>
  where
    F: FnOnce() + Send + 'env,
  {
    self.sender.try_send(Box::new(job)).map_err(|e| match e {
      TrySendError::Full(_) => PoolError::Full,
      TrySendError::Disconnected(_) => PoolError::Closed,
    })
  }

  /// Jobs waiting in the queue.
  pub fn depth(&self) -> usize {
    self.sender.len()
  }

  /// Queue capacity.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// True when the next `enqueue` would block.
  pub fn is_full(&self) -> bool {
    self.sender.is_full()
  }

  /// Jobs queued or executing.
  pub fn in_flight(&self) -> usize {
    self.depth() + self.stats.active.load(Ordering::Acquire)
  }

  /// Jobs finished so far in this scope.
  pub fn completed(&self) -> usize {
    self.stats.completed.load(Ordering::Acquire)
  }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod pool_test;
