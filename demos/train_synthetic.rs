use std::process::exit;

use log::error;
use rand::SeedableRng;
use rand::rngs::StdRng;

use decorrnet::{ Dataset, TrainConfig, synthetic_blobs, fit };


fn main() {
  env_logger::Builder::from_default_env()
    .filter_level(log::LevelFilter::Info)
    .init();

  if let Err(err) = run() {
    error!("{}", err);
    exit(1);
  }
}

fn run() -> decorrnet::Result<()> {
  let mut rng = StdRng::seed_from_u64(1234);
  let train = synthetic_blobs(400, 8, 3, 0.75, &mut rng)?;
  let valid = synthetic_blobs(120, 8, 3, 0.75, &mut rng)?;
  let test = synthetic_blobs(120, 8, 3, 0.75, &mut rng)?;
  let dataset = Dataset::new(train, valid, Some(test))?;

  let config = TrainConfig {
    learning_rate: 0.05,
    n_hidden: 32,
    n_epochs: 30,
    covariance_reg: 0.01,
    ..TrainConfig::default()
  };

  let (model, report) = fit(&config, &dataset)?;

  println!(
    "best validation error {:.2}% at epoch {} ({} iterations, {:.1}s)",
    report.best_validation_error * 100.0,
    report.best_epoch,
    report.iterations,
    report.elapsed.as_secs_f64(),
  );
  if let Some(test_error) = report.best_test_error {
    println!("test error at that epoch: {:.2}%", test_error * 100.0);
  }

  model.save("trained.bin")?;
  println!("parameters written to trained.bin");
  Ok(())
}
