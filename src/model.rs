use std::path::Path;

use rand::Rng;
use serde::{ Serialize, Deserialize };

use crate::{
  tensor::Tensor,
  variable::Variable,
  error::{ Error, Result },
};


/// Hidden layer nonlinearity.

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
  Tanh,
  Sigmoid,
}

impl Activation {
  // Glorot & Bengio suggest scaling the init interval by four
  // for sigmoid units
  fn gain(&self) -> f32 {
    match self {
      Self::Tanh => 1.0,
      Self::Sigmoid => 4.0,
    }
  }

  fn apply(&self, x: &Variable<f32>) -> Variable<f32> {
    match self {
      Self::Tanh => x.tanh(),
      Self::Sigmoid => ((-x).exp() + 1.0).powf(-1.0),
    }
  }
}


/// Fully connected layer with a nonlinearity.
///
/// Weights start from a Glorot uniform sample, biases from zero.

#[derive(Debug, Clone)]
pub struct DenseLayer {
  pub weights: Variable<f32>,
  pub bias: Variable<f32>,
  activation: Activation,
}

impl DenseLayer {
  pub fn init(n_in: usize, n_out: usize, activation: Activation, rng: &mut impl Rng) -> Self {
    Self {
      weights: Tensor::glorot_uniform(&[n_in, n_out], activation.gain(), rng).trained(),
      bias: Tensor::zeros(&[n_out]).trained(),
      activation,
    }
  }

  pub fn forward(&self, input: &Variable<f32>) -> Variable<f32> {
    self.activation.apply(&(input.mm(&self.weights) + &self.bias))
  }
}


/// Linear layer mapped through a log-softmax.
///
/// Both weights and biases start from zero.

#[derive(Debug, Clone)]
pub struct SoftmaxLayer {
  pub weights: Variable<f32>,
  pub bias: Variable<f32>,
}

impl SoftmaxLayer {
  pub fn init(n_in: usize, n_out: usize) -> Self {
    Self {
      weights: Tensor::zeros(&[n_in, n_out]).trained(),
      bias: Tensor::zeros(&[n_out]).trained(),
    }
  }

  /// Log of the class membership probabilities, one row per example.

  pub fn log_probs(&self, input: &Variable<f32>) -> Variable<f32> {
    let logits = input.mm(&self.weights) + &self.bias;
    // Shift by the row maximum, treated as a constant, so that the
    // exponentials below cannot overflow
    let max = logits.tensor().max(-1).unsqueeze(-1).tracked();
    let shifted = logits - max;
    let log_norm = shifted.exp().sum(-1).log().unsqueeze(-1);
    shifted - log_norm
  }
}


/// Mean negative log-likelihood of the correct classes.

pub fn negative_log_likelihood(log_probs: &Variable<f32>, labels: &Tensor<u16>) -> Variable<f32> {
  let classes = log_probs.dim(-1);
  let mask = labels.one_hot::<f32>(classes).tracked();
  -(log_probs * mask).sum(-1).mean(0)
}

/// Fraction of examples whose most likely class is not their label.

pub fn zero_one_errors(log_probs: &Tensor<f32>, labels: &Tensor<u16>) -> f32 {
  let predictions: Tensor<u16> = log_probs.argmax(-1);
  let hits = predictions.equal(labels).numeric::<f32>().sum(0).item();
  1.0 - hits / labels.size() as f32
}


/// Two layer classifier: a nonlinear hidden layer followed by a
/// softmax head.

#[derive(Debug, Clone)]
pub struct Mlp {
  pub hidden: DenseLayer,
  pub output: SoftmaxLayer,
}

impl Mlp {
  pub fn new(n_in: usize, n_hidden: usize, n_out: usize, activation: Activation, rng: &mut impl Rng) -> Self {
    Self {
      hidden: DenseLayer::init(n_in, n_hidden, activation, rng),
      output: SoftmaxLayer::init(n_hidden, n_out),
    }
  }

  /// Run a batch of examples through both layers, returning the hidden
  /// activations alongside the class log-probabilities.

  pub fn forward(&self, input: &Tensor<f32>) -> (Variable<f32>, Variable<f32>) {
    let hidden = self.hidden.forward(&input.tracked());
    let log_probs = self.output.log_probs(&hidden);
    (hidden, log_probs)
  }

  /// Trainable parameters in update order.

  pub fn params(&self) -> Vec<Variable<f32>> {
    vec![
      self.hidden.weights.clone(),
      self.hidden.bias.clone(),
      self.output.weights.clone(),
      self.output.bias.clone(),
    ]
  }

  /// Sum of absolute weight values. Biases are left unregularized.

  pub fn l1(&self) -> Variable<f32> {
    self.hidden.weights.abs().sum(0) + self.output.weights.abs().sum(0)
  }

  /// Sum of squared weight values. Biases are left unregularized.

  pub fn l2_sqr(&self) -> Variable<f32> {
    self.hidden.weights.sqr().sum(0) + self.output.weights.sqr().sum(0)
  }

  /// Copy the current parameter values out of the graph.

  pub fn state(&self) -> Vec<Tensor<f32>> {
    self.params().iter().map(|param| param.tensor().detach() ).collect()
  }

  /// Write a saved state back into the live parameters.

  pub fn restore(&self, state: &[Tensor<f32>]) -> Result<()> {
    let params = self.params();
    if state.len() != params.len() {
      return Err(Error::Data(format!(
        "expected {} parameter tensors, got {}", params.len(), state.len())));
    }
    for (param, saved) in params.iter().zip(state) {
      if param.shape().dims != saved.shape().dims {
        return Err(Error::Data(format!(
          "parameter shape {} does not match saved {}", param.shape(), saved.shape())));
      }
      param.tensor().assign(saved);
    }
    Ok(())
  }

  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let bytes = postcard::to_allocvec(&self.state())?;
    std::fs::write(path, bytes)?;
    Ok(())
  }

  pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
    let bytes = std::fs::read(path)?;
    let state: Vec<Tensor<f32>> = postcard::from_bytes(&bytes)?;
    self.restore(&state)
  }
}
