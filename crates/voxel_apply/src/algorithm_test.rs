use super::*;

struct Sum;

impl Algorithm for Sum {
  fn num_inputs(&self) -> usize {
    1
  }
  fn num_consts(&self) -> usize {
    0
  }
  fn num_outputs(&self) -> usize {
    1
  }
  fn data_size(&self) -> usize {
    2
  }
  fn default_consts(&self) -> ConstVector {
    ConstVector::new()
  }
  fn apply(&self, inputs: &[f32], _consts: &[f32]) -> Result<VoxelFit, AlgorithmError> {
    let mut fit = VoxelFit::zeros(1, 2);
    fit.outputs[0] = inputs.iter().sum();
    fit.iterations = 1;
    Ok(fit)
  }
}

struct Scale(f32);

impl Algorithm for Scale {
  fn num_inputs(&self) -> usize {
    1
  }
  fn num_consts(&self) -> usize {
    1
  }
  fn num_outputs(&self) -> usize {
    1
  }
  fn data_size(&self) -> usize {
    1
  }
  fn default_consts(&self) -> ConstVector {
    ConstVector::from_slice(&[self.0])
  }
  fn apply(&self, inputs: &[f32], consts: &[f32]) -> Result<VoxelFit, AlgorithmError> {
    let mut fit = VoxelFit::zeros(1, 1);
    fit.outputs[0] = inputs[0] * consts[0];
    Ok(fit)
  }
}

#[test]
fn test_zeros_shape() {
  let fit = VoxelFit::zeros(3, 5);
  assert_eq!(fit.outputs.len(), 3);
  assert_eq!(fit.residuals.len(), 5);
  assert_eq!(fit.residual, 0.0);
  assert_eq!(fit.iterations, 0);
  assert!(fit.check_shape(3, 5).is_ok());
}

#[test]
fn test_check_shape_reports_mismatch() {
  let fit = VoxelFit::zeros(2, 4);
  assert_eq!(
    fit.check_shape(3, 4),
    Err(AlgorithmError::Shape {
      what: "outputs",
      expected: 3,
      actual: 2
    })
  );
  assert_eq!(
    fit.check_shape(2, 6),
    Err(AlgorithmError::Shape {
      what: "residuals",
      expected: 6,
      actual: 4
    })
  );
}

#[test]
fn test_apply_through_trait_object() {
  let algorithm: Arc<dyn Algorithm> = Arc::new(Sum);
  let fit = algorithm.apply(&[1.5, 2.5], &[]).unwrap();
  assert_eq!(fit.outputs.as_slice(), &[4.0]);
  assert_eq!(fit.iterations, 1);
}

#[test]
fn test_registry_select_by_tag() {
  let mut registry = AlgorithmRegistry::new();
  registry
    .register('s', "sum", || Arc::new(Sum))
    .register('x', "scale", || Arc::new(Scale(2.0)));

  assert_eq!(registry.len(), 2);
  assert_eq!(registry.name('x'), Some("scale"));

  let scale = registry.select('x').unwrap();
  assert_eq!(scale.num_consts(), 1);
  assert_eq!(scale.default_consts().as_slice(), &[2.0]);

  let sum = registry.select('s').unwrap();
  assert_eq!(sum.data_size(), 2);
}

#[test]
fn test_registry_unknown_tag() {
  let registry = AlgorithmRegistry::new();
  assert!(registry.is_empty());
  assert_eq!(
    registry.select('q').err(),
    Some(ConfigurationError::UnknownAlgorithm('q'))
  );
}

#[test]
fn test_registry_replaces_repeated_tag() {
  let mut registry = AlgorithmRegistry::new();
  registry.register('x', "scale-by-2", || Arc::new(Scale(2.0)));
  registry.register('x', "scale-by-3", || Arc::new(Scale(3.0)));

  assert_eq!(registry.len(), 1);
  let tags: Vec<_> = registry.tags().collect();
  assert_eq!(tags, vec![('x', "scale-by-3")]);
  assert_eq!(registry.select('x').unwrap().default_consts().as_slice(), &[3.0]);
}
