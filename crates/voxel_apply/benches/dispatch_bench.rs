//! Dispatch engine benchmarks.
//!
//! Measures the overhead of voxelwise dispatch against the cost of the
//! per-voxel work:
//! - **workers**: pool size sweep with a fixed algorithm cost
//! - **cost**: cheap vs expensive per-voxel fits on one pool
//! - **mask**: fraction of masked voxels
//!
//! All runs use a 64x64x32 volume (131072 voxels).

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use voxel_apply::{
  Algorithm, AlgorithmError, ConstVector, EngineConfig, Geometry, PoolConfig, Volume, VoxelFit, VoxelwiseEngine,
  WorkerPool,
};

const SIZE: [usize; 3] = [64, 64, 32];
const VOXELS: usize = SIZE[0] * SIZE[1] * SIZE[2];

// =============================================================================
// Synthetic Algorithm
// =============================================================================

/// Mono-exponential decay fit by Gauss-Newton on `echoes` samples.
///
/// `rounds` scales the per-voxel cost without changing the result shape.
struct DecayFit {
  echoes: usize,
  rounds: u32,
}

impl DecayFit {
  fn cheap() -> Self {
    Self { echoes: 8, rounds: 1 }
  }

  fn expensive() -> Self {
    Self { echoes: 8, rounds: 32 }
  }
}

impl Algorithm for DecayFit {
  fn num_inputs(&self) -> usize {
    1
  }
  fn num_consts(&self) -> usize {
    1
  }
  fn num_outputs(&self) -> usize {
    2
  }
  fn data_size(&self) -> usize {
    self.echoes
  }
  fn default_consts(&self) -> ConstVector {
    ConstVector::from_slice(&[10.0])
  }

  fn apply(&self, inputs: &[f32], consts: &[f32]) -> Result<VoxelFit, AlgorithmError> {
    let spacing = consts[0];
    let mut fit = VoxelFit::zeros(2, self.echoes);
    if inputs[0] <= 0.0 {
      return Ok(fit);
    }

    let mut amplitude = inputs[0];
    let mut rate = 0.01f32;
    for _ in 0..self.rounds {
      let (mut jtj, mut jtr) = ([0.0f32; 3], [0.0f32; 2]);
      for (echo, &signal) in inputs.iter().enumerate() {
        let t = spacing * (echo + 1) as f32;
        let decay = (-rate * t).exp();
        let r = signal - amplitude * decay;
        let (da, dr) = (decay, -amplitude * t * decay);
        jtj[0] += da * da;
        jtj[1] += da * dr;
        jtj[2] += dr * dr;
        jtr[0] += da * r;
        jtr[1] += dr * r;
      }
      let det = jtj[0] * jtj[2] - jtj[1] * jtj[1];
      if det.abs() < f32::EPSILON {
        break;
      }
      amplitude += (jtj[2] * jtr[0] - jtj[1] * jtr[1]) / det;
      rate += (jtj[0] * jtr[1] - jtj[1] * jtr[0]) / det;
      fit.iterations += 1;
    }

    let mut sum_sq = 0.0;
    for (echo, (&signal, residual)) in inputs.iter().zip(fit.residuals.iter_mut()).enumerate() {
      let t = spacing * (echo + 1) as f32;
      *residual = signal - amplitude * (-rate * t).exp();
      sum_sq += *residual * *residual;
    }
    fit.outputs[0] = amplitude;
    fit.outputs[1] = if rate > 0.0 { 1.0 / rate } else { 0.0 };
    fit.residual = (sum_sq / self.echoes as f32).sqrt();
    Ok(fit)
  }
}

fn decay_volume(echoes: usize) -> Volume<f32> {
  Volume::from_fn(Geometry::new(SIZE), echoes, |[x, y, z]| {
    let amplitude = 1000.0 + (x * 7 + y * 3 + z) as f32;
    let t2 = 40.0 + ((x + y + z) % 60) as f32;
    (1..=echoes)
      .map(|echo| amplitude * (-(echo as f32 * 10.0) / t2).exp())
      .collect()
  })
  .expect("bench volume")
}

/// Scalar mask keeping `keep` out of every 8 voxels.
fn stripe_mask(keep: usize) -> Volume<f32> {
  Volume::from_fn(Geometry::new(SIZE), 1, |[x, _, _]| vec![if x % 8 < keep { 1.0 } else { 0.0 }])
    .expect("bench mask")
}

fn run_once<A: Algorithm + 'static>(
  algorithm: Arc<A>,
  pool: &WorkerPool,
  data: &Volume<f32>,
  mask: Option<&Volume<f32>>,
) -> usize {
  let mut engine = VoxelwiseEngine::new(algorithm, EngineConfig::default());
  engine.set_data(0, data).expect("data input");
  engine.set_mask(mask);
  engine.configure().expect("configure");
  engine.run_on(pool).expect("run").dispatched
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_workers(c: &mut Criterion) {
  let mut group = c.benchmark_group("dispatch_workers");
  group.throughput(Throughput::Elements(VOXELS as u64));
  group.sample_size(10);

  let data = decay_volume(8);
  let algorithm = Arc::new(DecayFit::expensive());

  for workers in [1, 2, 4, 8] {
    let pool = WorkerPool::new(PoolConfig::with_workers(workers)).expect("pool");
    group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
      b.iter(|| black_box(run_once(Arc::clone(&algorithm), &pool, &data, None)))
    });
  }

  group.finish();
}

fn bench_cost(c: &mut Criterion) {
  let mut group = c.benchmark_group("dispatch_cost");
  group.throughput(Throughput::Elements(VOXELS as u64));
  group.sample_size(10);

  let data = decay_volume(8);
  let pool = WorkerPool::new(PoolConfig::DEFAULT).expect("pool");

  for (name, algorithm) in [("cheap", DecayFit::cheap()), ("expensive", DecayFit::expensive())] {
    let algorithm = Arc::new(algorithm);
    group.bench_function(name, |b| {
      b.iter(|| black_box(run_once(Arc::clone(&algorithm), &pool, &data, None)))
    });
  }

  group.finish();
}

fn bench_mask(c: &mut Criterion) {
  let mut group = c.benchmark_group("dispatch_mask");
  group.sample_size(10);

  let data = decay_volume(8);
  let pool = WorkerPool::new(PoolConfig::DEFAULT).expect("pool");
  let algorithm = Arc::new(DecayFit::cheap());

  for keep in [1, 4, 8] {
    let mask = stripe_mask(keep);
    group.throughput(Throughput::Elements((VOXELS * keep / 8) as u64));
    group.bench_with_input(BenchmarkId::new("active_eighths", keep), &keep, |b, _| {
      b.iter(|| black_box(run_once(Arc::clone(&algorithm), &pool, &data, Some(&mask))))
    });
  }

  group.finish();
}

criterion_group!(dispatch, bench_workers, bench_cost, bench_mask);

criterion_main!(dispatch);
