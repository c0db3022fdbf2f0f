use std::process::exit;

use log::error;
use rand::SeedableRng;
use rand::rngs::StdRng;

use decorrnet::{
  Dataset, TrainConfig, Mlp,
  synthetic_blobs, correlation_penalty, fit,
};


/// Train the same network once per penalty mode and report how
/// correlated the hidden units end up.

fn main() {
  env_logger::Builder::from_default_env()
    .filter_level(log::LevelFilter::Warn)
    .init();

  if let Err(err) = run() {
    error!("{}", err);
    exit(1);
  }
}

fn run() -> decorrnet::Result<()> {
  let mut rng = StdRng::seed_from_u64(1234);
  let train = synthetic_blobs(400, 8, 2, 0.75, &mut rng)?;
  let valid = synthetic_blobs(120, 8, 2, 0.75, &mut rng)?;
  let dataset = Dataset::new(train, valid, None)?;

  let base = TrainConfig {
    learning_rate: 0.05,
    n_hidden: 16,
    n_epochs: 25,
    ..TrainConfig::default()
  };

  let modes = [
    ("no penalty", 0.0, 0.0),
    ("covariance", 0.05, 0.0),
    ("correlation", 0.0, 0.05),
  ];

  for (name, covariance_reg, correlation_reg) in modes {
    let config = TrainConfig { covariance_reg, correlation_reg, ..base.clone() };
    let (model, report) = fit(&config, &dataset)?;
    println!(
      "{:<12} validation error {:.2}%, hidden correlation {:.4}",
      name,
      report.best_validation_error * 100.0,
      hidden_correlation(&model, &dataset),
    );
  }
  Ok(())
}

fn hidden_correlation(model: &Mlp, dataset: &Dataset) -> f32 {
  let (features, _labels) = dataset.valid.batch(0, dataset.valid.len());
  let (hidden, _log_probs) = model.forward(&features.detach());
  correlation_penalty(&hidden).item()
}
