use crate::{
  tensor::Tensor,
  scalar::Numeric,
};


/// Low-level matrix multiplication kernel.
///
/// With the default `unsafe` feature this is backed by the
/// [matrixmultiply] crate; otherwise a plain triple loop is used.

pub trait Cops<T: Numeric> {
  fn matmul(&self, rhs: &Tensor<T>) -> Vec<T>;
}

#[cfg(feature = "unsafe")]
impl Cops<f32> for Tensor<f32> {
  fn matmul(&self, rhs: &Tensor<f32>) -> Vec<f32> {
    let rows_l = self.shape()[-2];
    let cols_l = self.shape()[-1];
    let cols_r = rhs.shape()[-1];

    let mut data = vec![0.0; rows_l * cols_r];

    // Shared borrows, so both operands may view the same storage
    let data_l = self.raw();
    let data_r = rhs.raw();

    unsafe {
      matrixmultiply::sgemm(
        rows_l,
        cols_l,
        cols_r,
        1.0,
        data_l.as_ptr().add(self.shape().offset),
        self.shape().strides[0],
        self.shape().strides[1],
        data_r.as_ptr().add(rhs.shape().offset),
        rhs.shape().strides[0],
        rhs.shape().strides[1],
        0.0,
        data.as_mut_ptr(),
        cols_r as isize,
        1,
      );
    };

    data
  }
}

#[cfg(feature = "unsafe")]
impl Cops<f64> for Tensor<f64> {
  fn matmul(&self, rhs: &Tensor<f64>) -> Vec<f64> {
    let rows_l = self.shape()[-2];
    let cols_l = self.shape()[-1];
    let cols_r = rhs.shape()[-1];

    let mut data = vec![0.0; rows_l * cols_r];

    let data_l = self.raw();
    let data_r = rhs.raw();

    unsafe {
      matrixmultiply::dgemm(
        rows_l,
        cols_l,
        cols_r,
        1.0,
        data_l.as_ptr().add(self.shape().offset),
        self.shape().strides[0],
        self.shape().strides[1],
        data_r.as_ptr().add(rhs.shape().offset),
        rhs.shape().strides[0],
        rhs.shape().strides[1],
        0.0,
        data.as_mut_ptr(),
        cols_r as isize,
        1,
      );
    };

    data
  }
}

#[cfg(not(feature = "unsafe"))]
impl Cops<f32> for Tensor<f32> {
  fn matmul(&self, rhs: &Tensor<f32>) -> Vec<f32> {
    matmul_naive(self, rhs)
  }
}

#[cfg(not(feature = "unsafe"))]
impl Cops<f64> for Tensor<f64> {
  fn matmul(&self, rhs: &Tensor<f64>) -> Vec<f64> {
    matmul_naive(self, rhs)
  }
}

#[cfg(not(feature = "unsafe"))]
fn matmul_naive<T: Numeric>(lhs: &Tensor<T>, rhs: &Tensor<T>) -> Vec<T> {
  let lhs = lhs.contiguous();
  let rhs = rhs.contiguous();

  let rows_l = lhs.shape()[-2];
  let cols_l = lhs.shape()[-1];
  let cols_r = rhs.shape()[-1];

  let data_l = lhs.raw();
  let data_r = rhs.raw();
  let offset_l = lhs.shape().offset;
  let offset_r = rhs.shape().offset;

  let mut data = vec![T::zero(); rows_l * cols_r];
  for i in 0..rows_l {
    for j in 0..cols_r {
      for k in 0..cols_l {
        data[i * cols_r + j] = data[i * cols_r + j] +
          data_l[offset_l + i * cols_l + k] *
          data_r[offset_r + k * cols_r + j];
      }
    }
  }

  data
}

impl<T: Numeric> Tensor<T>
where
  Tensor<T>: Cops<T>,
{
  /// Matrix product of two rank-2 tensors.

  pub fn mm(&self, rhs: &Self) -> Self {
    assert_eq!(self.rank(), 2, "Expected matrix, got {}", self.shape());
    assert_eq!(rhs.rank(), 2, "Expected matrix, got {}", rhs.shape());
    assert_eq!(self.shape()[-1], rhs.shape()[-2],
      "Cannot multiply {} & {} matrices", self.shape(), rhs.shape());
    let data = self.matmul(rhs);
    Self::new(&[self.shape()[-2], rhs.shape()[-1]], data)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn matmul() {
    let x = Tensor::new(&[2,3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let y = Tensor::new(&[3,2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(x.mm(&y), Tensor::new(&[2,2], vec![22.0, 28.0, 49.0, 64.0]));
  }

  #[test]
  fn matmul_transposed() {
    let x = Tensor::new(&[2,3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let xt = x.transpose(0, 1);
    assert_eq!(xt.mm(&x), Tensor::new(&[3,3], vec![
      17.0, 22.0, 27.0,
      22.0, 29.0, 36.0,
      27.0, 36.0, 45.0,
    ]));
  }
}
