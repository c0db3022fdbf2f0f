use std::rc::Rc;
use std::cell::{ Ref, RefMut, RefCell };
use std::ops::Range;

use rand::Rng;
use num_traits::NumCast;
use serde::{ Serialize, Deserialize };

mod cops;

pub use cops::Cops;

use crate::{
  internal::*,
  shape::Shape,
  variable::Variable,
  scalar::{ Inner, Numeric, Integer, Real },
};


/// Multidimensional array.
///
/// Tensors may contain any type that satisfies [Inner], but
/// additional methods are available for [Numeric], [Real]
/// and [boolean](bool) inner types.
///
/// [Real] tensor types can be wrapped in a [Variable] by
/// calling [tracked](Tensor::tracked) or [trained](Tensor::trained).

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor<T: Inner> {
  shape: Shape,
  data: Rc<RefCell<Vec<T>>>,
}

impl<T: Inner> PartialEq for Tensor<T> {
  fn eq(&self, rhs: &Self) -> bool {
    if self.shape.squeeze().dims != rhs.shape.squeeze().dims { return false }
    let data_l = self.data.borrow();
    let data_r = rhs.data.borrow();
    for (i, j) in self.shape.iter().zip(rhs.shape.iter()) {
      if data_l[i] != data_r[j] { return false }
    }
    true
  }
}

impl<T: Inner> Tensor<T> {
  pub fn from_shape(shape: Shape, data: Vec<T>) -> Self {
    assert_eq!(shape.size(), data.len(),
      "{} doesn't match data length {}", shape, data.len());
    Self { shape, data: Rc::new(RefCell::new(data)) }
  }

  pub fn new(dims: &[usize], data: Vec<T>) -> Self {
    Self::from_shape(Shape::new(dims), data)
  }

  pub fn vec(vec: &[T]) -> Self {
    Self::new(&[vec.len()], vec.to_vec())
  }

  pub fn scalar(item: T) -> Self {
    Self::new(&[], vec![item])
  }

  pub fn fill(dims: &[usize], filler: T) -> Self {
    Self::new(dims, vec![filler; dims.iter().product()])
  }

  pub fn raw(&self) -> Ref<Vec<T>> {
    self.data.borrow()
  }

  pub fn raw_mut(&self) -> RefMut<Vec<T>> {
    self.data.borrow_mut()
  }

  pub fn shape(&self) -> &Shape {
    &self.shape
  }

  pub fn size(&self) -> usize {
    self.shape.size()
  }

  pub fn rank(&self) -> usize {
    self.shape.rank()
  }

  pub fn dim(&self, i: isize) -> usize {
    self.shape[i]
  }

  /// Overwrite this tensor's elements in place, leaving its
  /// storage shared with any views onto it.

  pub fn assign(&self, other: &Self) {
    assert!(self.shape.squeeze().dims == other.shape.squeeze().dims,
      "Could not assign {} tensor from {} tensor", self.shape, other.shape);
    // Avoid clashing borrow when tensors share storage
    let other = if Rc::ptr_eq(&self.data, &other.data) {
      other.detach()
    } else {
      other.clone()
    };
    let mut data = self.data.borrow_mut();
    let other_data = other.data.borrow();
    for (i, j) in self.shape.iter().zip(other.shape.iter()) {
      data[i] = other_data[j];
    }
  }

  pub fn refill(&self, filler: T) {
    let mut data = self.data.borrow_mut();
    for i in self.shape.iter() {
      data[i] = filler;
    }
  }

  /// Copy into fresh, contiguous storage.

  pub fn detach(&self) -> Self {
    self.vectorize(|a| a )
  }

  pub fn contiguous(&self) -> Self {
    if self.shape.contiguous() {
      self.clone()
    } else {
      self.detach()
    }
  }

  pub fn zip<O, F>(&self, rhs: &Self, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: Fn((T, T)) -> O,
  {
    let rhs = rhs.broadcast(self.shape());
    let lhs = self.broadcast(rhs.shape());
    let data: Vec<O> = lhs.param_iter()
      .zip(rhs.param_iter())
      .map(cb)
      .collect();
    Tensor::new(&rhs.shape.dims, data)
  }

  pub fn vectorize<O, F>(&self, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: FnMut(T) -> O,
  {
    let data = self.param_iter().map(cb).collect();
    Tensor::new(&self.shape.dims, data)
  }

  /// Collapse all dimensions from `dim` onward by reducing every
  /// trailing block to a single element.

  pub fn collapse<O, F>(&self, dim: isize, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: Fn(&[T]) -> O,
  {
    let dim = negative_index(dim, self.rank(), false);
    let block: usize = self.shape.dims[dim..].iter().product();
    let flat: Vec<T> = self.param_iter().collect();
    let data = flat.chunks(block.max(1)).map(|chunk| cb(chunk) ).collect();
    Tensor::new(&self.shape.dims[..dim], data)
  }

  pub fn param_iter(&self) -> TensorIterator<T> {
    TensorIterator::new(self)
  }

  pub fn at(&self, indices: &[usize]) -> T {
    self.data.borrow()[self.shape.index(indices)]
  }

  pub fn range(&self, ranges: &[Range<isize>]) -> Self {
    let shape = self.shape.range(ranges);
    let data = self.data.clone();
    Self { shape, data }
  }

  pub fn item(&self) -> T {
    assert!(self.shape.squeeze().rank() == 0,
      "Can't extract item from non-scalar {}", self.shape);
    self.raw()[self.shape.offset]
  }

  pub fn reshape(&self, dims: &[usize]) -> Self {
    let this = self.contiguous();
    let shape = this.shape.view(dims);
    Self { shape, data: this.data }
  }

  pub fn unsqueeze(&self, dim: isize) -> Self {
    let shape = self.shape.unsqueeze(dim);
    let data = self.data.clone();
    Self { shape, data }
  }

  pub fn transpose(&self, dim1: isize, dim2: isize) -> Self {
    let shape = self.shape.transpose(dim1, dim2);
    let data = self.data.clone();
    Self { shape, data }
  }

  pub fn broadcast(&self, shape: &Shape) -> Self {
    Self {
      shape: self.shape.broadcast(shape),
      data: self.data.clone(),
    }
  }

  pub fn equal(&self, rhs: &Self) -> Tensor<bool> {
    self.zip(rhs, |(a, b)| a == b )
  }
}

impl<T: Numeric> Tensor<T> {
  pub fn ones(dims: &[usize]) -> Self {
    Self::fill(dims, T::one())
  }

  pub fn zeros(dims: &[usize]) -> Self {
    Self::fill(dims, T::zero())
  }

  /// Identity matrix.

  pub fn eye(size: usize) -> Self {
    let mut data = vec![T::zero(); size * size];
    for i in 0..size {
      data[i * size + i] = T::one();
    }
    Self::new(&[size, size], data)
  }

  pub fn add(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a + b )
  }

  pub fn sub(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a - b )
  }

  pub fn mul(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a * b )
  }

  pub fn div(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a / b )
  }

  /// Collapse all dimensions from `dim` onward into their sum.

  pub fn sum(&self, dim: isize) -> Self {
    self.collapse(dim, |block| block.iter().cloned().sum() )
  }

  /// Sum along a single axis, keeping it as size one.

  pub fn sum_axis(&self, dim: isize) -> Self {
    let d = negative_index(dim, self.rank(), false);
    let last = self.rank() as isize - 1;
    let moved = self.transpose(d as isize, last);
    let summed = moved.sum(-1).unsqueeze(-1);
    summed.transpose(d as isize, last)
  }

  pub fn max(&self, dim: isize) -> Self {
    self.collapse(dim, |block| {
      block.iter()
        .cloned()
        .fold(block[0], |acc, a| if a > acc { a } else { acc } )
    })
  }

  /// Collapse dimensions from `dim` using the index of their greatest value.

  pub fn argmax<O: Integer>(&self, dim: isize) -> Tensor<O> {
    self.collapse(dim, |block| {
      let mut max = block[0];
      let mut index = 0;
      for (i, value) in block.iter().enumerate() {
        if *value > max {
          max = *value;
          index = i;
        }
      }
      O::from(index).unwrap()
    })
  }

  /// Add `change` to this tensor in place, broadcasting it as needed.

  pub fn accumulate(&self, change: &Self) {
    let change = if Rc::ptr_eq(&self.data, &change.data) {
      change.detach()
    } else {
      change.clone()
    };
    let change = change.broadcast(&self.shape);
    let mut data = self.data.borrow_mut();
    let change_data = change.data.borrow();
    for (i, j) in self.shape.iter().zip(change.shape.iter()) {
      let value = data[i] + change_data[j];
      data[i] = value;
    }
  }
}

impl<T: Real> Tensor<T> {
  /// Sample uniformly from `low..high` using an injected random source,
  /// keeping runs reproducible for a fixed seed.

  pub fn uniform(dims: &[usize], low: T, high: T, rng: &mut impl Rng) -> Self {
    let data = (0..dims.iter().product())
      .map(|_| rng.gen_range(low, high) )
      .collect();
    Self::new(dims, data)
  }

  /// Glorot/Bengio uniform init for a weight matrix of shape
  /// `[fan_in, fan_out]`: samples from ±sqrt(6 / (fan_in + fan_out)),
  /// times `gain`.

  pub fn glorot_uniform(dims: &[usize; 2], gain: T, rng: &mut impl Rng) -> Self {
    let six = T::from(6.0).unwrap();
    let bound = gain * (six / T::from(dims[0] + dims[1]).unwrap()).sqrt();
    Self::uniform(dims, -bound, bound, rng)
  }

  pub fn trained(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), true)
  }

  pub fn tracked(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), false)
  }

  pub fn tanh(&self) -> Self {
    self.vectorize(|a| a.tanh() )
  }

  pub fn exp(&self) -> Self {
    self.vectorize(|a| a.exp() )
  }

  pub fn log(&self) -> Self {
    self.vectorize(|a| a.ln() )
  }

  pub fn abs(&self) -> Self {
    self.vectorize(|a| a.abs() )
  }

  pub fn signum(&self) -> Self {
    self.vectorize(|a| a.signum() )
  }

  pub fn powf(&self, exp: T) -> Self {
    self.vectorize(|a| a.powf(exp) )
  }

  pub fn sqr(&self) -> Self {
    self.vectorize(|a| a * a )
  }

  pub fn is_finite(&self) -> bool {
    self.param_iter().all(|a| a.is_finite() )
  }
}

impl<T: Integer> Tensor<T> {
  /// Expand class indices into one-hot rows.

  pub fn one_hot<O: Numeric>(&self, size: usize) -> Tensor<O> {
    let mut data = vec![O::zero(); self.size() * size];
    for (n, index) in self.param_iter().enumerate() {
      let i: usize = NumCast::from(index).unwrap();
      assert!(i < size, "Class index {} outside of [0, {})", i, size);
      data[n * size + i] = O::one();
    }
    let mut dims = self.shape.dims.clone();
    dims.push(size);
    Tensor::new(&dims, data)
  }
}

impl Tensor<bool> {
  pub fn numeric<O: Numeric>(&self) -> Tensor<O> {
    self.vectorize(|a| if a { O::one() } else { O::zero() })
  }
}

impl<T: Numeric> std::ops::Neg for &Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    self.vectorize(|a| T::zero() - a )
  }
}

impl<T: Numeric> std::ops::Neg for Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    -&self
  }
}

macro_rules! add_operator {
  ($trait:ident, $meth:ident, $symbol:tt) => {
    impl<T: Numeric> std::ops::$trait for &Tensor<T> { // &tensor + &other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Self) -> Tensor<T> {
        self.$meth(rhs)
      }
    }

    impl<T: Numeric> std::ops::$trait for Tensor<T> { // tensor + other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Self) -> Tensor<T> {
        (&self).$meth(&rhs)
      }
    }

    impl<T: Numeric> std::ops::$trait<Tensor<T>> for &Tensor<T> { // &tensor + other
      type Output = Tensor<T>;

      fn $meth(self, rhs: Tensor<T>) -> Tensor<T> {
        self.$meth(&rhs)
      }
    }

    impl<T: Numeric> std::ops::$trait<&Tensor<T>> for Tensor<T> { // tensor + &other
      type Output = Tensor<T>;

      fn $meth(self, rhs: &Tensor<T>) -> Tensor<T> {
        (&self).$meth(rhs)
      }
    }

    impl<T: Numeric> std::ops::$trait<T> for &Tensor<T> { // &tensor + T
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        self.$meth(&Tensor::scalar(rhs))
      }
    }

    impl<T: Numeric> std::ops::$trait<T> for Tensor<T> { // tensor + T
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        (&self).$meth(&Tensor::scalar(rhs))
      }
    }

    impl std::ops::$trait<&Tensor<f32>> for f32 { // f32 + &tensor
      type Output = Tensor<f32>;

      fn $meth(self, tensor: &Tensor<f32>) -> Tensor<f32> {
        Tensor::scalar(self) $symbol tensor
      }
    }

    impl std::ops::$trait<Tensor<f32>> for f32 { // f32 + tensor
      type Output = Tensor<f32>;

      fn $meth(self, tensor: Tensor<f32>) -> Tensor<f32> {
        Tensor::scalar(self) $symbol &tensor
      }
    }

    impl std::ops::$trait<&Tensor<f64>> for f64 { // f64 + &tensor
      type Output = Tensor<f64>;

      fn $meth(self, tensor: &Tensor<f64>) -> Tensor<f64> {
        Tensor::scalar(self) $symbol tensor
      }
    }

    impl std::ops::$trait<Tensor<f64>> for f64 { // f64 + tensor
      type Output = Tensor<f64>;

      fn $meth(self, tensor: Tensor<f64>) -> Tensor<f64> {
        Tensor::scalar(self) $symbol &tensor
      }
    }
  };
}

add_operator!(Add, add, +);
add_operator!(Sub, sub, -);
add_operator!(Mul, mul, *);
add_operator!(Div, div, /);

impl<T: Inner> std::fmt::Display for Tensor<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Tensor{:?} ", self.shape.dims)?;
    print_chunks(0, &self.shape, &self.detach().raw(), f)?;
    Ok(())
  }
}

fn print_chunks<T: std::fmt::Debug>(idx: usize, shape: &Shape, vec: &[T], f: &mut std::fmt::Formatter) -> std::fmt::Result {
  let indent = (0..idx * 2).map(|_| " " ).collect::<String>();
  if shape.rank() == 0 {
    write!(f, "{indent}{:?}", vec[0])?;
  } else if idx == shape.rank() - 1 {
    write!(f, "{indent}{:?}\n", vec)?;
  } else {
    let chunks = vec.chunks(vec.len() / shape.dims[idx]);
    write!(f, "{indent}[\n")?;
    for chunk in chunks {
      print_chunks(idx + 1, shape, chunk, f)?;
    }
    write!(f, "{indent}]\n")?;
  }
  Ok(())
}


pub struct TensorIterator<'a, T: Inner> {
  data: Ref<'a, Vec<T>>,
  shape_iter: Box<dyn Iterator<Item=usize> + 'a>,
}

impl<'a, T: Inner> TensorIterator<'a, T> {
  fn new(tensor: &'a Tensor<T>) -> Self {
    Self {
      data: tensor.data.borrow(),
      shape_iter: tensor.shape.iter(),
    }
  }
}

impl<T: Inner> Iterator for TensorIterator<'_, T> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    self.shape_iter.next().map(|i| self.data[i] )
  }
}
