use crate::{
  tensor::Tensor,
  variable::Variable,
  error::{ Error, Result },
};


/// Decorrelation penalty applied to the hidden activations of a batch.
///
/// Both modes penalize the off-diagonal entries of a second moment
/// matrix of the hidden units. `Covariance` works on the raw sample
/// covariance, `Correlation` normalizes it by the per-unit standard
/// deviations first. Only one of the two may be active at a time.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Penalty {
  Off,
  Covariance(f32),
  Correlation(f32),
}

impl Penalty {
  /// Select the penalty mode from the two config weights.

  pub fn from_weights(covariance: f32, correlation: f32) -> Result<Self> {
    if covariance != 0.0 && correlation != 0.0 {
      return Err(Error::ExclusivePenalties)
    }
    Ok(if covariance != 0.0 {
      Self::Covariance(covariance)
    } else if correlation != 0.0 {
      Self::Correlation(correlation)
    } else {
      Self::Off
    })
  }

  /// Weighted penalty term for a `[batch, units]` activation matrix,
  /// or `None` when turned off.

  pub fn apply(&self, hidden: &Variable<f32>) -> Option<Variable<f32>> {
    match self {
      Self::Off => None,
      Self::Covariance(weight) => Some(covariance_penalty(hidden) * *weight),
      Self::Correlation(weight) => Some(correlation_penalty(hidden) * *weight),
    }
  }
}

/// Sample covariance of the hidden units, `[units, units]`.

fn covariance(hidden: &Variable<f32>) -> Variable<f32> {
  let batch = hidden.dim(0) as f32;
  let mean = hidden.transpose(0, 1).sum(-1) / batch;
  let centered = hidden - mean;
  centered.transpose(0, 1).mm(&centered) / (batch - 1.0)
}

/// Sum over a square matrix with its diagonal masked out.

fn off_diagonal_sum(matrix: &Variable<f32>) -> Variable<f32> {
  let units = matrix.dim(0);
  let mask = (Tensor::<f32>::ones(&[units, units]) - Tensor::eye(units)).tracked();
  (matrix * mask).sum(0)
}

/// Sum of squared off-diagonal covariances of the hidden units.

pub fn covariance_penalty(hidden: &Variable<f32>) -> Variable<f32> {
  off_diagonal_sum(&covariance(hidden).sqr())
}

/// Sum of squared off-diagonal correlation coefficients of the
/// hidden units.

pub fn correlation_penalty(hidden: &Variable<f32>) -> Variable<f32> {
  let cov = covariance(hidden);
  let units = cov.dim(0);
  let variances = (&cov * Tensor::<f32>::eye(units).tracked()).sum(-1);
  let inv_std = variances.powf(-0.5);
  // Scale rows and columns by the inverse standard deviations
  let corr = (cov * &inv_std).transpose(0, 1) * &inv_std;
  off_diagonal_sum(&corr.sqr())
}


#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  #[test]
  fn exclusive_modes() {
    assert!(Penalty::from_weights(0.1, 0.1).is_err());
    assert_eq!(Penalty::from_weights(0.0, 0.0).unwrap(), Penalty::Off);
    assert_eq!(Penalty::from_weights(0.5, 0.0).unwrap(), Penalty::Covariance(0.5));
    assert_eq!(Penalty::from_weights(0.0, 0.5).unwrap(), Penalty::Correlation(0.5));
  }

  #[test]
  fn identical_columns_saturate_correlation() {
    // Three copies of the same varying unit: every off-diagonal
    // correlation is exactly one, so the penalty is n * (n - 1)
    let hidden = Tensor::new(&[4, 3], vec![
      1.0, 1.0, 1.0,
      2.0, 2.0, 2.0,
      4.0, 4.0, 4.0,
      8.0, 8.0, 8.0,
    ]).tracked();
    let penalty = correlation_penalty(&hidden).item();
    assert!((penalty - 6.0).abs() < 1e-4, "expected 6, got {}", penalty);
  }

  #[test]
  fn independent_columns_stay_cheap() {
    let mut rng = StdRng::seed_from_u64(1234);
    let hidden = Tensor::<f32>::uniform(&[512, 4], -1.0, 1.0, &mut rng).tracked();
    let penalty = correlation_penalty(&hidden).item();
    assert!(penalty < 0.5, "uncorrelated units should be near zero, got {}", penalty);
  }

  #[test]
  fn covariance_matches_hand_computation() {
    // Two units over three examples, cross covariance is -2
    let hidden = Tensor::new(&[3, 2], vec![
      1.0, 4.0,
      2.0, 2.0,
      3.0, 0.0,
    ]).tracked();
    let penalty = covariance_penalty(&hidden).item();
    assert!((penalty - 8.0).abs() < 1e-5, "expected 8, got {}", penalty);
  }

  #[test]
  fn correlation_penalty_gradients() {
    let mut rng = StdRng::seed_from_u64(3);
    let diff = Variable::<f64>::check_gradients(&[8, 3], &mut rng, |hidden| {
      let batch = hidden.dim(0) as f64;
      let mean = hidden.transpose(0, 1).sum(-1) / batch;
      let centered = hidden - mean;
      let cov = centered.transpose(0, 1).mm(&centered) / (batch - 1.0);
      let units = cov.dim(0);
      let variances = (&cov * Tensor::<f64>::eye(units).tracked()).sum(-1);
      let inv_std = variances.powf(-0.5);
      let corr = (cov * &inv_std).transpose(0, 1) * &inv_std;
      let mask = (Tensor::<f64>::ones(&[units, units]) - Tensor::eye(units)).tracked();
      (corr.sqr() * mask).sum(0)
    });
    assert!(diff < 1e-3, "gradient mismatch: {}", diff);
  }

  #[test]
  fn identical_columns_of_five_units() {
    let column = [1.0, -2.0, 0.5, 3.0];
    let mut data = Vec::with_capacity(column.len() * 5);
    for value in column {
      data.extend(std::iter::repeat(value).take(5));
    }
    let hidden = Tensor::new(&[4, 5], data).tracked();
    let penalty = correlation_penalty(&hidden).item();
    assert!((penalty - 20.0).abs() < 1e-4, "expected 20, got {}", penalty);
  }

  #[test]
  fn covariance_penalty_gradients() {
    let mut rng = StdRng::seed_from_u64(5);
    let diff = Variable::<f64>::check_gradients(&[6, 3], &mut rng, |hidden| {
      let batch = hidden.dim(0) as f64;
      let mean = hidden.transpose(0, 1).sum(-1) / batch;
      let centered = hidden - mean;
      let cov = centered.transpose(0, 1).mm(&centered) / (batch - 1.0);
      let units = cov.dim(0);
      let mask = (Tensor::<f64>::ones(&[units, units]) - Tensor::eye(units)).tracked();
      (cov.sqr() * mask).sum(0)
    });
    assert!(diff < 1e-3, "gradient mismatch: {}", diff);
  }
}
