use crate::{
  internal::*,
  shape::Shape,
  tensor::{ Tensor, Cops },
  variable::Variable,
  scalar::Real,
};


/// Differentiable operations.
///
/// Every op knows how to produce its output from its inputs and how to
/// push a gradient back to each input.

#[derive(Debug, Clone)]
pub(crate) enum Op<T: Real> {
  Add,
  Sub,
  Mul,
  Div,
  MatMul,
  Broadcast(Vec<usize>),
  Reshape(Vec<usize>),
  Transpose(isize, isize),
  Sum(isize),
  Pow(T),
  Tanh,
  Exp,
  Log,
  Abs,
}

impl<T: Real> Op<T>
where
  Tensor<T>: Cops<T>,
{
  pub fn run(&self, inputs: &[&Tensor<T>]) -> Tensor<T> {
    match self {
      Self::Add => inputs[0].add(inputs[1]),
      Self::Sub => inputs[0].sub(inputs[1]),
      Self::Mul => inputs[0].mul(inputs[1]),
      Self::Div => inputs[0].div(inputs[1]),
      Self::MatMul => inputs[0].mm(inputs[1]),
      Self::Broadcast(dims) => inputs[0].broadcast(&Shape::new(dims)),
      Self::Reshape(dims) => inputs[0].reshape(dims),
      Self::Transpose(dim1, dim2) => inputs[0].transpose(*dim1, *dim2),
      Self::Sum(dim) => inputs[0].sum(*dim),
      Self::Pow(exp) => inputs[0].powf(*exp),
      Self::Tanh => inputs[0].tanh(),
      Self::Exp => inputs[0].exp(),
      Self::Log => inputs[0].log(),
      Self::Abs => inputs[0].abs(),
    }
  }

  pub fn derive(&self, inputs: &[&Tensor<T>], grad: &Tensor<T>) -> Vec<Tensor<T>> {
    match self {
      Self::Add => vec![grad.clone(), grad.clone()],
      Self::Sub => vec![grad.clone(), -grad],
      Self::Mul => vec![grad * inputs[1], grad * inputs[0]],
      Self::Div => vec![
        grad / inputs[1],
        -(grad * inputs[0]) / (inputs[1] * inputs[1]),
      ],
      Self::MatMul => vec![
        grad.mm(&inputs[1].transpose(0, 1)),
        inputs[0].transpose(0, 1).mm(grad),
      ],
      Self::Broadcast(dims) => {
        let lhs = inputs[0];
        let lead = dims.len() - lhs.rank();
        let mut out = grad.clone();
        for d in 0..dims.len() {
          let before = if d < lead { 1 } else { lhs.shape().dims[d - lead] };
          if before == 1 && dims[d] != 1 {
            out = out.sum_axis(d as isize);
          }
        }
        vec![out.reshape(&lhs.shape().dims)]
      },
      Self::Reshape(_dims) => vec![grad.reshape(&inputs[0].shape().dims)],
      Self::Transpose(dim1, dim2) => vec![grad.transpose(*dim1, *dim2)],
      Self::Sum(_dim) => {
        // Re-append the collapsed dimensions as size one and let
        // gradient accumulation broadcast across them
        let mut out = grad.clone();
        while out.rank() < inputs[0].rank() {
          out = out.unsqueeze(-1);
        }
        vec![out]
      },
      Self::Pow(exp) => vec![grad * inputs[0].powf(*exp - T::one()) * *exp],
      Self::Tanh => vec![grad * (-inputs[0].tanh().sqr() + T::one())],
      Self::Exp => vec![grad * inputs[0].exp()],
      Self::Log => vec![grad / inputs[0]],
      Self::Abs => vec![grad * inputs[0].signum()],
    }
  }
}

impl<T: Real> Variable<T>
where
  Tensor<T>: Cops<T>,
{
  fn unary_op(&self, op: Op<T>) -> Self {
    let data = op.run(&[self.tensor()]);
    Self::operation(op, data, self.grad().is_some(), vec![self.node.clone()])
  }

  fn binary_op(&self, op: Op<T>, rhs: &Self) -> Self {
    let (lhs, rhs) = Self::upcast(self, rhs);
    let data = op.run(&[lhs.tensor(), rhs.tensor()]);
    let grad = lhs.grad().is_some() || rhs.grad().is_some();
    Self::operation(op, data, grad, vec![lhs.node, rhs.node])
  }

  // Broadcast both operands to their combined shape, so that elementwise
  // ops always see equal dims and their gradients unbroadcast cleanly.

  fn upcast(lhs: &Self, rhs: &Self) -> (Self, Self) {
    let dims = lhs.shape().broadcast(rhs.shape()).dims;
    (lhs.broadcast_to(&dims), rhs.broadcast_to(&dims))
  }

  fn broadcast_to(&self, dims: &[usize]) -> Self {
    if self.shape().dims == dims { return self.clone() }
    self.unary_op(Op::Broadcast(dims.to_vec()))
  }

  /// Matrix product of two rank-2 variables.

  pub fn mm(&self, rhs: &Self) -> Self {
    let data = self.tensor().mm(rhs.tensor());
    let grad = self.grad().is_some() || rhs.grad().is_some();
    Self::operation(Op::MatMul, data, grad, vec![self.node.clone(), rhs.node.clone()])
  }

  /// Collapse all dimensions from `dim` onward into their sum.

  pub fn sum(&self, dim: isize) -> Self {
    self.unary_op(Op::Sum(dim))
  }

  /// Collapse all dimensions from `dim` onward into their mean.

  pub fn mean(&self, dim: isize) -> Self {
    let d = negative_index(dim, self.rank(), false);
    let n: usize = self.shape().dims[d..].iter().product();
    self.sum(dim) / T::from(n).unwrap()
  }

  pub fn transpose(&self, dim1: isize, dim2: isize) -> Self {
    self.unary_op(Op::Transpose(dim1, dim2))
  }

  pub fn reshape(&self, dims: &[usize]) -> Self {
    self.unary_op(Op::Reshape(dims.to_vec()))
  }

  pub fn unsqueeze(&self, dim: isize) -> Self {
    let dims = self.shape().unsqueeze(dim).dims;
    self.reshape(&dims)
  }

  pub fn powf(&self, exp: T) -> Self {
    self.unary_op(Op::Pow(exp))
  }

  pub fn sqr(&self) -> Self {
    self.powf(T::from(2.0).unwrap())
  }

  pub fn tanh(&self) -> Self {
    self.unary_op(Op::Tanh)
  }

  pub fn exp(&self) -> Self {
    self.unary_op(Op::Exp)
  }

  pub fn log(&self) -> Self {
    self.unary_op(Op::Log)
  }

  pub fn abs(&self) -> Self {
    self.unary_op(Op::Abs)
  }
}

impl<T: Real> std::ops::Neg for &Variable<T>
where
  Tensor<T>: Cops<T>,
{
  type Output = Variable<T>;

  fn neg(self) -> Self::Output {
    self * -T::one()
  }
}

impl<T: Real> std::ops::Neg for Variable<T>
where
  Tensor<T>: Cops<T>,
{
  type Output = Variable<T>;

  fn neg(self) -> Self::Output {
    -&self
  }
}

macro_rules! add_operator {
  ($trait:ident, $meth:ident, $op:ident) => {
    impl<T: Real> std::ops::$trait for &Variable<T> // &variable + &other
    where
      Tensor<T>: Cops<T>,
    {
      type Output = Variable<T>;

      fn $meth(self, rhs: Self) -> Variable<T> {
        self.binary_op(Op::$op, rhs)
      }
    }

    impl<T: Real> std::ops::$trait for Variable<T> // variable + other
    where
      Tensor<T>: Cops<T>,
    {
      type Output = Variable<T>;

      fn $meth(self, rhs: Self) -> Variable<T> {
        (&self).binary_op(Op::$op, &rhs)
      }
    }

    impl<T: Real> std::ops::$trait<Variable<T>> for &Variable<T> // &variable + other
    where
      Tensor<T>: Cops<T>,
    {
      type Output = Variable<T>;

      fn $meth(self, rhs: Variable<T>) -> Variable<T> {
        self.binary_op(Op::$op, &rhs)
      }
    }

    impl<T: Real> std::ops::$trait<&Variable<T>> for Variable<T> // variable + &other
    where
      Tensor<T>: Cops<T>,
    {
      type Output = Variable<T>;

      fn $meth(self, rhs: &Variable<T>) -> Variable<T> {
        (&self).binary_op(Op::$op, rhs)
      }
    }

    impl<T: Real> std::ops::$trait<T> for &Variable<T> // &variable + T
    where
      Tensor<T>: Cops<T>,
    {
      type Output = Variable<T>;

      fn $meth(self, rhs: T) -> Variable<T> {
        self.binary_op(Op::$op, &Tensor::scalar(rhs).tracked())
      }
    }

    impl<T: Real> std::ops::$trait<T> for Variable<T> // variable + T
    where
      Tensor<T>: Cops<T>,
    {
      type Output = Variable<T>;

      fn $meth(self, rhs: T) -> Variable<T> {
        (&self).binary_op(Op::$op, &Tensor::scalar(rhs).tracked())
      }
    }

    impl std::ops::$trait<&Variable<f32>> for f32 { // f32 + &variable
      type Output = Variable<f32>;

      fn $meth(self, rhs: &Variable<f32>) -> Variable<f32> {
        Tensor::scalar(self).tracked().binary_op(Op::$op, rhs)
      }
    }

    impl std::ops::$trait<Variable<f32>> for f32 { // f32 + variable
      type Output = Variable<f32>;

      fn $meth(self, rhs: Variable<f32>) -> Variable<f32> {
        Tensor::scalar(self).tracked().binary_op(Op::$op, &rhs)
      }
    }

    impl std::ops::$trait<&Variable<f64>> for f64 { // f64 + &variable
      type Output = Variable<f64>;

      fn $meth(self, rhs: &Variable<f64>) -> Variable<f64> {
        Tensor::scalar(self).tracked().binary_op(Op::$op, rhs)
      }
    }

    impl std::ops::$trait<Variable<f64>> for f64 { // f64 + variable
      type Output = Variable<f64>;

      fn $meth(self, rhs: Variable<f64>) -> Variable<f64> {
        Tensor::scalar(self).tracked().binary_op(Op::$op, &rhs)
      }
    }
  };
}

add_operator!(Add, add, Add);
add_operator!(Sub, sub, Sub);
add_operator!(Mul, mul, Mul);
add_operator!(Div, div, Div);


#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  #[test]
  fn broadcast_gradient_sums_over_batch() {
    let bias = Tensor::vec(&[1.0, 2.0, 3.0]).trained();
    let batch = Tensor::<f64>::ones(&[4, 3]).tracked();
    let out = (&batch + &bias).sum(0);
    out.backward();
    assert_eq!(bias.grad(), Some(&Tensor::vec(&[4.0, 4.0, 4.0])));
  }

  #[test]
  fn mean_gradient() {
    let x = Tensor::vec(&[1.0, 2.0, 3.0, 4.0]).trained();
    let out = x.mean(0);
    assert_eq!(out.item(), 2.5);
    out.backward();
    assert_eq!(x.grad(), Some(&Tensor::vec(&[0.25, 0.25, 0.25, 0.25])));
  }

  #[test]
  fn transposed_sum_gradient() {
    let x = Tensor::new(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).trained();
    let out = x.transpose(0, 1).sum(-1);
    assert_eq!(out, Tensor::vec(&[5.0, 7.0, 9.0]).tracked());
    out.sum(0).backward();
    assert_eq!(x.grad(), Some(&Tensor::ones(&[2, 3])));
  }

  #[test]
  fn division_gradients() {
    let mut rng = StdRng::seed_from_u64(7);
    let diff = Variable::<f64>::check_gradients(&[2, 2], &mut rng, |x| {
      let denom = x.sqr() + 2.0;
      x.exp() / denom
    });
    assert!(diff < 1e-3, "gradient mismatch: {}", diff);
  }

  #[test]
  fn abs_gradient_follows_sign() {
    let x = Tensor::vec(&[-2.0, 3.0]).trained();
    let z = x.abs().sum(0);
    assert_eq!(z.item(), 5.0);
    z.backward();
    assert_eq!(x.grad(), Some(&Tensor::vec(&[-1.0, 1.0])));
  }

  #[test]
  fn log_gradients() {
    let mut rng = StdRng::seed_from_u64(11);
    let diff = Variable::<f64>::check_gradients(&[5], &mut rng, |x| {
      (x.sqr() + 1.0).log()
    });
    assert!(diff < 1e-3, "gradient mismatch: {}", diff);
  }
}
