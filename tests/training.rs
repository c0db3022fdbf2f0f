use rand::SeedableRng;
use rand::rngs::StdRng;

use decorrnet::{
  Activation, Dataset, Error, Mlp, TrainConfig,
  correlation_penalty, covariance_penalty, fit, synthetic_blobs,
};


fn blob_dataset(seed: u64, n_classes: usize) -> Dataset {
  let mut rng = StdRng::seed_from_u64(seed);
  let train = synthetic_blobs(80, 6, n_classes, 0.5, &mut rng).unwrap();
  let valid = synthetic_blobs(40, 6, n_classes, 0.5, &mut rng).unwrap();
  let test = synthetic_blobs(40, 6, n_classes, 0.5, &mut rng).unwrap();
  Dataset::new(train, valid, Some(test)).unwrap()
}

fn small_config() -> TrainConfig {
  TrainConfig {
    learning_rate: 0.1,
    n_epochs: 10,
    batch_size: 8,
    n_hidden: 12,
    ..TrainConfig::default()
  }
}

#[test]
fn trains_under_every_penalty_mode() {
  let dataset = blob_dataset(21, 2);
  for (covariance_reg, correlation_reg) in [(0.0, 0.0), (0.05, 0.0), (0.0, 0.05)] {
    let config = TrainConfig { covariance_reg, correlation_reg, ..small_config() };
    let (model, report) = fit(&config, &dataset).unwrap();
    assert!(report.best_validation_error < 0.25,
      "cov {} corr {} left validation error at {}",
      covariance_reg, correlation_reg, report.best_validation_error);
    assert!(report.best_test_error.is_some());
    for param in model.state() {
      assert!(param.is_finite(), "parameters must stay finite");
    }
  }
}

#[test]
fn conflicting_penalties_fail_before_any_update() {
  let config = TrainConfig {
    covariance_reg: 0.1,
    correlation_reg: 0.1,
    ..small_config()
  };
  let result = fit(&config, &blob_dataset(3, 2));
  assert!(matches!(result, Err(Error::ExclusivePenalties)));
}

#[test]
fn leftover_examples_are_skipped() {
  // 80 training examples with batches of 25 gives three updates per epoch
  let config = TrainConfig { batch_size: 25, n_epochs: 4, ..small_config() };
  let (_model, report) = fit(&config, &blob_dataset(5, 2)).unwrap();
  assert_eq!(report.iterations, 4 * 3);
}

#[test]
fn identical_seeds_reproduce_everything() {
  let dataset = blob_dataset(9, 3);
  let config = TrainConfig { correlation_reg: 0.02, n_epochs: 4, ..small_config() };
  let (model_a, report_a) = fit(&config, &dataset).unwrap();
  let (model_b, report_b) = fit(&config, &dataset).unwrap();
  assert_eq!(report_a.best_validation_error, report_b.best_validation_error);
  assert_eq!(report_a.best_epoch, report_b.best_epoch);
  for (a, b) in model_a.state().iter().zip(model_b.state().iter()) {
    assert_eq!(a, b);
  }
}

#[test]
fn penalties_evaluate_on_trained_activations() {
  let dataset = blob_dataset(13, 2);
  let config = TrainConfig { covariance_reg: 0.05, ..small_config() };
  let (model, _report) = fit(&config, &dataset).unwrap();
  let (features, _labels) = dataset.valid.batch(0, dataset.valid.len());
  let (hidden, _log_probs) = model.forward(&features.detach());
  assert!(covariance_penalty(&hidden).item().is_finite());
  assert!(correlation_penalty(&hidden).item().is_finite());
}

#[test]
fn checkpoints_round_trip_through_disk() {
  let mut rng = StdRng::seed_from_u64(17);
  let trained = Mlp::new(6, 12, 2, Activation::Tanh, &mut rng);
  let path = std::env::temp_dir().join("decorrnet-checkpoint-test.bin");

  trained.save(&path).unwrap();
  let restored = Mlp::new(6, 12, 2, Activation::Tanh, &mut rng);
  restored.load(&path).unwrap();
  std::fs::remove_file(&path).unwrap();

  for (a, b) in trained.state().iter().zip(restored.state().iter()) {
    assert_eq!(a, b);
  }
}

#[test]
fn checkpoint_shape_mismatch_is_rejected() {
  let mut rng = StdRng::seed_from_u64(19);
  let narrow = Mlp::new(4, 8, 2, Activation::Tanh, &mut rng);
  let path = std::env::temp_dir().join("decorrnet-mismatch-test.bin");

  narrow.save(&path).unwrap();
  let wide = Mlp::new(6, 8, 2, Activation::Tanh, &mut rng);
  let result = wide.load(&path);
  std::fs::remove_file(&path).unwrap();

  assert!(matches!(result, Err(Error::Data(_))));
}
