//! Error types for configuration, channel access and per-voxel execution.

use thiserror::Error;

/// Which input a geometry or shape check was applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
  Data(usize),
  Const(usize),
  Mask,
}

impl std::fmt::Display for ChannelKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ChannelKind::Data(i) => write!(f, "data input {i}"),
      ChannelKind::Const(i) => write!(f, "const input {i}"),
      ChannelKind::Mask => write!(f, "mask"),
    }
  }
}

/// Fatal setup failures. Raised before any output memory is allocated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
  #[error("Sequence size ({expected}) does not match input size ({actual})")]
  InputSizeMismatch { expected: usize, actual: usize },

  #[error("Total input size cannot be 0")]
  ZeroInputSize,

  #[error("Specified subregion is not entirely inside image (subregion start {start:?} size {size:?}, image size {extent:?})")]
  SubregionOutside {
    start: Vec<usize>,
    size: Vec<usize>,
    extent: Vec<usize>,
  },

  #[error("Data input {0} has not been set")]
  MissingDataChannel(usize),

  #[error("Geometry of {0} does not match data input 0")]
  GeometryMismatch(ChannelKind),

  #[error("{channel} must have 1 component per voxel, found {components}")]
  NotScalar { channel: ChannelKind, components: usize },

  #[error("Algorithm declares {expected} constants but provides {actual} defaults")]
  DefaultConstants { expected: usize, actual: usize },

  #[error("Cannot allocate outputs: {0}")]
  Allocation(#[from] VolumeError),

  #[error("Invalid worker pool: {0}")]
  InvalidPool(String),

  #[error("Unknown algorithm type '{0}'")]
  UnknownAlgorithm(char),
}

/// A channel index past the algorithm's declared count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
  #[error("Requested input {index} does not exist ({count} inputs)")]
  Data { index: usize, count: usize },

  #[error("Requested const input {index} does not exist ({count} const inputs)")]
  Const { index: usize, count: usize },

  #[error("Requested output {index} is past maximum ({count})")]
  Output { index: usize, count: usize },
}

/// Volume construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolumeError {
  #[error("Buffer holds {actual} values, geometry requires {expected}")]
  LengthMismatch { expected: usize, actual: usize },

  #[error("Volumes need at least one component per voxel")]
  ZeroComponents,
}

/// Failure of a single voxel's algorithm invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlgorithmError {
  #[error("Algorithm returned {actual} {what}, expected {expected}")]
  Shape {
    what: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("Algorithm panicked: {0}")]
  Panicked(String),

  #[error("{0}")]
  Failed(String),
}

/// Worker pool queue failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
  #[error("Task queue is full")]
  Full,

  #[error("Task queue is closed, all workers have exited")]
  Closed,
}

/// Lifecycle state of the dispatch engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
  Unconfigured,
  Configured,
  Running,
  Done,
}

/// Errors surfaced by the engine's public API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),

  #[error(transparent)]
  Index(#[from] IndexError),

  #[error(transparent)]
  Pool(#[from] PoolError),

  #[error("Operation requires state {expected:?}, engine is {found:?}")]
  InvalidState {
    expected: EngineState,
    found: EngineState,
  },

  #[error("Run cancelled after dispatching {dispatched} voxels")]
  Cancelled { dispatched: usize },
}
