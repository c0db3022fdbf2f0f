//! Two layer perceptron classifier with optional decorrelation of its
//! hidden units, built on a small eager autodiff core.
//!
//! [Tensor]s hold the data, [Variable]s track the operations applied to
//! them and provide gradients through [backward](Variable::backward).
//! [Mlp] combines a tanh hidden layer with a softmax head, [fit] trains
//! it with minibatch gradient descent, and [Penalty] adds a
//! differentiable term that discourages covariance or correlation
//! among the hidden activations.
//!
//! ```no_run
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//! use decorrnet::{ Dataset, TrainConfig, synthetic_blobs, fit };
//!
//! fn main() -> decorrnet::Result<()> {
//!   let mut rng = StdRng::seed_from_u64(1234);
//!   let train = synthetic_blobs(400, 8, 2, 0.5, &mut rng)?;
//!   let valid = synthetic_blobs(100, 8, 2, 0.5, &mut rng)?;
//!   let dataset = Dataset::new(train, valid, None)?;
//!
//!   let config = TrainConfig {
//!     n_hidden: 32,
//!     n_epochs: 50,
//!     covariance_reg: 0.01,
//!     ..TrainConfig::default()
//!   };
//!   let (model, report) = fit(&config, &dataset)?;
//!   println!("validation error {:.2}%", report.best_validation_error * 100.0);
//!   model.save("model.bin")?;
//!   Ok(())
//! }
//! ```

mod internal;

pub mod scalar;
pub mod shape;
pub mod tensor;
pub mod variable;
pub mod error;
pub mod model;
pub mod penalty;
pub mod data;
pub mod train;

pub use shape::Shape;
pub use tensor::{ Tensor, Cops };
pub use variable::Variable;
pub use error::{ Error, Result };
pub use model::{ Mlp, DenseLayer, SoftmaxLayer, Activation, negative_log_likelihood, zero_one_errors };
pub use penalty::{ Penalty, covariance_penalty, correlation_penalty };
pub use data::{ Dataset, Split, synthetic_blobs };
pub use train::{ TrainConfig, TrainingReport, fit };
