use rand::Rng;

use crate::{
  tensor::Tensor,
  error::{ Error, Result },
};


/// One split of a classification dataset: a `[examples, features]`
/// matrix and one class index per row.

#[derive(Debug, Clone)]
pub struct Split {
  pub features: Tensor<f32>,
  pub labels: Tensor<u16>,
}

impl Split {
  pub fn new(features: Tensor<f32>, labels: Tensor<u16>) -> Result<Self> {
    if features.rank() != 2 {
      return Err(Error::Data(format!("features must be a matrix, got {}", features.shape())));
    }
    if labels.rank() != 1 {
      return Err(Error::Data(format!("labels must be a vector, got {}", labels.shape())));
    }
    if features.dim(0) != labels.dim(0) {
      return Err(Error::Data(format!(
        "{} examples but {} labels", features.dim(0), labels.dim(0))));
    }
    if features.dim(0) == 0 {
      return Err(Error::Data("split contains no examples".into()));
    }
    Ok(Self { features, labels })
  }

  pub fn len(&self) -> usize {
    self.features.dim(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn n_features(&self) -> usize {
    self.features.dim(-1)
  }

  pub(crate) fn max_label(&self) -> u16 {
    self.labels.param_iter().max().unwrap_or(0)
  }

  /// Contiguous batch as zero-copy views into the split.

  pub fn batch(&self, start: usize, len: usize) -> (Tensor<f32>, Tensor<u16>) {
    let range = start as isize..(start + len) as isize;
    (self.features.range(&[range.clone()]), self.labels.range(&[range]))
  }

  /// Copy out the given rows, in order. Used for shuffled minibatches.

  pub fn gather(&self, indices: &[usize]) -> (Tensor<f32>, Tensor<u16>) {
    let width = self.n_features();
    let mut features = Vec::with_capacity(indices.len() * width);
    let mut labels = Vec::with_capacity(indices.len());
    for &i in indices {
      let row = self.features.range(&[i as isize..i as isize + 1]);
      features.extend(row.param_iter());
      labels.push(self.labels.at(&[i]));
    }
    (Tensor::new(&[indices.len(), width], features), Tensor::vec(&labels))
  }
}


/// Train/validation pair with an optional held-out test split.

#[derive(Debug, Clone)]
pub struct Dataset {
  pub train: Split,
  pub valid: Split,
  pub test: Option<Split>,
}

impl Dataset {
  pub fn new(train: Split, valid: Split, test: Option<Split>) -> Result<Self> {
    let width = train.n_features();
    for split in [Some(&valid), test.as_ref()].into_iter().flatten() {
      if split.n_features() != width {
        return Err(Error::Data(format!(
          "splits disagree on feature count: {} vs {}", width, split.n_features())));
      }
    }
    Ok(Self { train, valid, test })
  }

  /// Number of classes, taken from the largest label in any split.

  pub fn n_classes(&self) -> usize {
    let mut max = self.train.max_label().max(self.valid.max_label());
    if let Some(test) = &self.test {
      max = max.max(test.max_label());
    }
    max as usize + 1
  }
}


/// Linearly separable toy data: one noisy cluster per class.

pub fn synthetic_blobs(
  n_examples: usize,
  n_features: usize,
  n_classes: usize,
  noise: f32,
  rng: &mut impl Rng,
) -> Result<Split> {
  if n_classes < 2 {
    return Err(Error::Data("need at least two classes".into()));
  }
  if noise <= 0.0 {
    return Err(Error::Data("noise must be positive".into()));
  }
  let mut features = Vec::with_capacity(n_examples * n_features);
  let mut labels = Vec::with_capacity(n_examples);
  for n in 0..n_examples {
    let class = (n % n_classes) as u16;
    for f in 0..n_features {
      let center = if f % n_classes == class as usize { 2.0 } else { 0.0 };
      features.push(center + rng.gen_range(-noise, noise));
    }
    labels.push(class);
  }
  Split::new(Tensor::new(&[n_examples, n_features], features), Tensor::vec(&labels))
}


#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  #[test]
  fn rejects_mismatched_lengths() {
    let features = Tensor::<f32>::zeros(&[4, 2]);
    let labels = Tensor::<u16>::vec(&[0, 1, 0]);
    assert!(Split::new(features, labels).is_err());
  }

  #[test]
  fn gather_copies_requested_rows() {
    let split = Split::new(
      Tensor::new(&[3, 2], vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1]),
      Tensor::vec(&[0, 1, 0]),
    ).unwrap();
    let (features, labels) = split.gather(&[2, 0]);
    assert_eq!(features, Tensor::new(&[2, 2], vec![2.0, 2.1, 0.0, 0.1]));
    assert_eq!(labels, Tensor::vec(&[0, 0]));
  }

  #[test]
  fn batch_views_share_storage() {
    let split = Split::new(
      Tensor::new(&[4, 1], vec![0.0, 1.0, 2.0, 3.0]),
      Tensor::vec(&[0, 1, 0, 1]),
    ).unwrap();
    let (features, labels) = split.batch(2, 2);
    assert_eq!(features, Tensor::new(&[2, 1], vec![2.0, 3.0]));
    assert_eq!(labels, Tensor::vec(&[0, 1]));
  }

  #[test]
  fn blobs_cover_all_classes() {
    let mut rng = StdRng::seed_from_u64(1);
    let split = synthetic_blobs(30, 4, 3, 0.5, &mut rng).unwrap();
    assert_eq!(split.len(), 30);
    assert_eq!(split.max_label(), 2);
  }
}
