use std::time::{ Duration, Instant };

use log::{ debug, info };
use itertools::Itertools;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{
  data::{ Dataset, Split },
  model::{ Mlp, Activation, negative_log_likelihood, zero_one_errors },
  penalty::Penalty,
  error::{ Error, Result },
};


/// Hyperparameters for [fit].
///
/// The defaults train a 500 unit tanh network with minibatches of 20
/// at a learning rate of 0.01, L2 regularized with 0.0001 and no
/// decorrelation penalty.

#[derive(Debug, Clone)]
pub struct TrainConfig {
  pub learning_rate: f32,
  pub l1_reg: f32,
  pub l2_reg: f32,
  pub covariance_reg: f32,
  pub correlation_reg: f32,
  pub seed: u64,
  pub n_epochs: usize,
  pub batch_size: usize,
  pub n_hidden: usize,
  pub activation: Activation,
}

impl Default for TrainConfig {
  fn default() -> Self {
    Self {
      learning_rate: 0.01,
      l1_reg: 0.0,
      l2_reg: 0.0001,
      covariance_reg: 0.0,
      correlation_reg: 0.0,
      seed: 1234,
      n_epochs: 1000,
      batch_size: 20,
      n_hidden: 500,
      activation: Activation::Tanh,
    }
  }
}

impl TrainConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
      return Err(Error::Config(format!("learning rate must be positive, got {}", self.learning_rate)));
    }
    for (name, value) in [
      ("l1_reg", self.l1_reg),
      ("l2_reg", self.l2_reg),
      ("covariance_reg", self.covariance_reg),
      ("correlation_reg", self.correlation_reg),
    ] {
      if !(value >= 0.0 && value.is_finite()) {
        return Err(Error::Config(format!("{} must be non-negative, got {}", name, value)));
      }
    }
    if self.n_epochs == 0 {
      return Err(Error::Config("need at least one epoch".into()));
    }
    if self.batch_size < 2 {
      return Err(Error::Config("batch size must be at least two for sample covariances".into()));
    }
    if self.n_hidden == 0 {
      return Err(Error::Config("need at least one hidden unit".into()));
    }
    Ok(())
  }
}


/// Outcome of a [fit] run.

#[derive(Debug, Clone)]
pub struct TrainingReport {
  pub best_validation_error: f32,
  pub best_epoch: usize,
  pub best_test_error: Option<f32>,
  /// Mean zero-one validation error after each epoch, in order.
  pub validation_errors: Vec<f32>,
  pub epochs_run: usize,
  pub iterations: usize,
  pub elapsed: Duration,
}


/// Train a fresh [Mlp] on the dataset with minibatch gradient descent.
///
/// Every epoch visits each training example exactly once in a freshly
/// shuffled order. The returned model carries the parameters from the
/// epoch with the lowest validation error.

pub fn fit(config: &TrainConfig, dataset: &Dataset) -> Result<(Mlp, TrainingReport)> {
  config.validate()?;
  let penalty = Penalty::from_weights(config.covariance_reg, config.correlation_reg)?;
  if dataset.train.len() < config.batch_size {
    return Err(Error::Data(format!(
      "training split holds {} examples, need at least one batch of {}",
      dataset.train.len(), config.batch_size)));
  }
  if dataset.valid.len() < config.batch_size {
    return Err(Error::Data(format!(
      "validation split holds {} examples, need at least one batch of {}",
      dataset.valid.len(), config.batch_size)));
  }

  let mut rng = StdRng::seed_from_u64(config.seed);
  let n_in = dataset.train.n_features();
  let n_out = dataset.n_classes();
  let model = Mlp::new(n_in, config.n_hidden, n_out, config.activation, &mut rng);

  // Leftover examples that do not fill a batch are skipped
  let n_train_batches = dataset.train.len() / config.batch_size;

  info!(
    "training {}-{}-{} network, {} batches of {} per epoch, penalty {:?}",
    n_in, config.n_hidden, n_out, n_train_batches, config.batch_size, penalty,
  );

  let started = Instant::now();
  let mut best_validation_error = f32::INFINITY;
  let mut best_epoch = 0;
  let mut best_test_error = None;
  let mut best_state = model.state();
  let mut validation_errors = Vec::with_capacity(config.n_epochs);
  let mut iterations = 0;

  for epoch in 1..=config.n_epochs {
    let order = epoch_order(dataset.train.len(), &mut rng);

    for batch in 0..n_train_batches {
      let indices = &order[batch * config.batch_size..(batch + 1) * config.batch_size];
      let (features, labels) = dataset.train.gather(indices);

      let (hidden, log_probs) = model.forward(&features);
      let mut cost = negative_log_likelihood(&log_probs, &labels);
      if config.l1_reg != 0.0 {
        cost = cost + model.l1() * config.l1_reg;
      }
      if config.l2_reg != 0.0 {
        cost = cost + model.l2_sqr() * config.l2_reg;
      }
      if let Some(term) = penalty.apply(&hidden) {
        cost = cost + term;
      }

      debug!("epoch {} batch {}: cost {}", epoch, batch, cost.item());

      cost.backward();
      for mut param in model.params() {
        let change = match param.grad() {
          Some(grad) => grad * config.learning_rate,
          None => continue,
        };
        param -= change;
      }
      cost.reset();
      iterations += 1;
    }

    let validation_error = evaluate(&model, &dataset.valid, config.batch_size);
    validation_errors.push(validation_error);
    info!(
      "epoch {}/{}, minibatch {}: validation error {:.2}%",
      epoch, config.n_epochs, iterations, validation_error * 100.0,
    );

    if validation_error < best_validation_error {
      best_validation_error = validation_error;
      best_epoch = epoch;
      best_state = model.state();
      if let Some(test) = &dataset.test {
        let test_error = evaluate(&model, test, config.batch_size);
        best_test_error = Some(test_error);
        info!("  new best, test error {:.2}%", test_error * 100.0);
      }
    }
  }

  model.restore(&best_state)?;
  let elapsed = started.elapsed();
  info!(
    "done: best validation error {:.2}% at epoch {}, {} iterations in {:.2}m",
    best_validation_error * 100.0, best_epoch, iterations,
    elapsed.as_secs_f64() / 60.0,
  );

  Ok((model, TrainingReport {
    best_validation_error,
    best_epoch,
    best_test_error,
    validation_errors,
    epochs_run: config.n_epochs,
    iterations,
    elapsed,
  }))
}

/// Fresh visiting order over all training examples.

fn epoch_order(n: usize, rng: &mut impl Rng) -> Vec<usize> {
  let mut order: Vec<usize> = (0..n).collect();
  order.shuffle(rng);
  debug_assert!(order.iter().all_unique());
  order
}

/// Mean zero-one error over all full batches of a split, in order.

fn evaluate(model: &Mlp, split: &Split, batch_size: usize) -> f32 {
  let n_batches = split.len() / batch_size;
  let mut total = 0.0;
  for batch in 0..n_batches {
    let (features, labels) = split.batch(batch * batch_size, batch_size);
    let (_hidden, log_probs) = model.forward(&features.detach());
    total += zero_one_errors(log_probs.tensor(), &labels);
  }
  total / n_batches as f32
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::data::synthetic_blobs;

  fn toy_dataset(seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let train = synthetic_blobs(40, 4, 2, 0.5, &mut rng).unwrap();
    let valid = synthetic_blobs(20, 4, 2, 0.5, &mut rng).unwrap();
    Dataset::new(train, valid, None).unwrap()
  }

  #[test]
  fn epoch_order_is_a_bijection() {
    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..5 {
      let mut order = epoch_order(97, &mut rng);
      order.sort_unstable();
      assert_eq!(order, (0..97).collect::<Vec<_>>());
    }
  }

  #[test]
  fn rejects_bad_learning_rate() {
    let config = TrainConfig { learning_rate: 0.0, ..TrainConfig::default() };
    assert!(config.validate().is_err());
  }

  #[test]
  fn rejects_both_penalties_before_training() {
    let config = TrainConfig {
      covariance_reg: 0.1,
      correlation_reg: 0.1,
      n_epochs: 1,
      ..TrainConfig::default()
    };
    let result = fit(&config, &toy_dataset(3));
    assert!(matches!(result, Err(Error::ExclusivePenalties)));
  }

  #[test]
  fn learns_separable_blobs() {
    let config = TrainConfig {
      learning_rate: 0.1,
      n_epochs: 15,
      batch_size: 4,
      n_hidden: 8,
      ..TrainConfig::default()
    };
    let (_model, report) = fit(&config, &toy_dataset(7)).unwrap();
    assert!(report.best_validation_error < 0.2,
      "blobs should be learnable, got {}", report.best_validation_error);
    assert_eq!(report.iterations, 15 * 10);
  }

  #[test]
  fn tiny_network_two_epochs() {
    let mut rng = StdRng::seed_from_u64(1234);
    let train = synthetic_blobs(40, 4, 2, 0.5, &mut rng).unwrap();
    let valid = synthetic_blobs(20, 4, 2, 0.5, &mut rng).unwrap();
    let dataset = Dataset::new(train, valid, None).unwrap();
    let config = TrainConfig {
      learning_rate: 0.1,
      l2_reg: 0.0001,
      n_epochs: 2,
      batch_size: 4,
      n_hidden: 3,
      ..TrainConfig::default()
    };
    let (model, report) = fit(&config, &dataset).unwrap();
    assert_eq!(report.iterations, 2 * 10);
    assert_eq!(report.validation_errors.len(), 2);
    // The toy set is trivially separable, so the error should not climb
    assert!(report.validation_errors[1] <= report.validation_errors[0],
      "validation error rose: {:?}", report.validation_errors);
    // The best-model record points at the first epoch achieving the minimum
    assert_eq!(report.best_validation_error, report.validation_errors[report.best_epoch - 1]);
    let minimum = report.validation_errors.iter().cloned().fold(f32::INFINITY, f32::min);
    assert_eq!(report.best_validation_error, minimum);
    for param in model.state() {
      assert!(param.is_finite());
    }
  }

  #[test]
  fn same_seed_same_outcome() {
    let config = TrainConfig {
      n_epochs: 3,
      batch_size: 5,
      n_hidden: 6,
      covariance_reg: 0.01,
      ..TrainConfig::default()
    };
    let dataset = toy_dataset(11);
    let (model_a, report_a) = fit(&config, &dataset).unwrap();
    let (model_b, report_b) = fit(&config, &dataset).unwrap();
    assert_eq!(report_a.best_validation_error, report_b.best_validation_error);
    for (a, b) in model_a.state().iter().zip(model_b.state().iter()) {
      assert_eq!(a, b);
    }
  }
}
