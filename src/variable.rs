use std::rc::Rc;
use std::collections::HashSet;
use std::sync::atomic::{ AtomicUsize, Ordering };

mod ops;

pub(crate) use ops::Op;

use crate::{
  tensor::{ Tensor, Cops },
  scalar::Real,
};


pub(crate) fn make_id() -> usize {
  static LAST_ID: AtomicUsize = AtomicUsize::new(0);
  LAST_ID.fetch_add(1, Ordering::Relaxed)
}


/// Node in a computation graph, containing a [Variable]'s data and gradient,
/// as well as the operation used to create it.

#[derive(Debug)]
pub(crate) struct Node<T: Real> {
  pub id: usize,
  pub data: Tensor<T>,
  pub grad: Option<Tensor<T>>,
  op: Option<Op<T>>,
  previous: Vec<Rc<Self>>,
  trainable: bool,
}

impl<T: Real> PartialEq for Node<T> {
  fn eq(&self, rhs: &Self) -> bool {
    self.id == rhs.id
  }
}

impl<T: Real> Node<T> {
  fn reset_gradient(&self, filler: T) {
    if let Some(grad) = &self.grad {
      grad.refill(filler);
    }
  }
}

impl<T: Real> Node<T>
where
  Tensor<T>: Cops<T>,
{
  fn backward_step(&self) {
    if let (Some(op), Some(grad)) = (&self.op, &self.grad) {
      let inputs: Vec<&Tensor<T>> = self.previous.iter().map(|prev| &prev.data ).collect();
      let changes = op.derive(&inputs, grad);
      for (change, prev) in changes.iter().zip(self.previous.iter()) {
        if let Some(grad) = &prev.grad {
          grad.accumulate(change);
        }
      }
    }
  }
}


/// Variables track the computational operations used to create them and allow
/// for computing their gradient with respect to all input variables involved.
///
/// They get created by calling [tracked](Tensor::tracked) or
/// [trained](Tensor::trained) on any differentiable [Tensor] type.
///
/// Variables dereference to their underlying [Tensor] automatically for
/// non-differentiable operations. Differentiable operations, on the other hand,
/// will always return another Variable.

#[derive(Debug, Clone)]
pub struct Variable<T: Real> {
  pub(crate) node: Rc<Node<T>>,
}

impl<T: Real> std::ops::Deref for Variable<T> {
  type Target = Tensor<T>;

  fn deref(&self) -> &Self::Target {
    &self.node.data
  }
}

impl<T: Real> PartialEq for Variable<T> {
  fn eq(&self, rhs: &Self) -> bool {
    self.node.data == rhs.node.data
  }
}

impl<T: Real> Variable<T> {
  pub(crate) fn from_tensor(tensor: Tensor<T>, trainable: bool) -> Self {
    Self {
      node: Rc::new(Node {
        id: make_id(),
        grad: trainable.then(|| Tensor::zeros(&tensor.shape().dims) ),
        data: tensor,
        op: None,
        previous: vec![],
        trainable,
      }),
    }
  }

  pub(crate) fn operation(op: Op<T>, data: Tensor<T>, grad: bool, previous: Vec<Rc<Node<T>>>) -> Self {
    Self {
      node: Rc::new(Node {
        id: make_id(),
        grad: grad.then(|| Tensor::zeros(&data.shape().dims) ),
        data,
        op: Some(op),
        previous,
        trainable: false,
      }),
    }
  }

  pub fn id(&self) -> usize {
    self.node.id
  }

  pub fn tensor(&self) -> &Tensor<T> {
    &self.node.data
  }

  pub fn grad(&self) -> Option<&Tensor<T>> {
    self.node.grad.as_ref()
  }

  /// Set gradients to zero for this Variable's entire graph.

  pub fn reset(&self) {
    for node in self.history() {
      node.reset_gradient(T::zero());
    }
  }

  fn history(&self) -> Vec<Rc<Node<T>>> {
    let mut history = vec![];
    Self::history_recurse(&self.node, &mut history, &mut HashSet::new());
    history
  }

  fn history_recurse(node: &Rc<Node<T>>, history: &mut Vec<Rc<Node<T>>>, visited: &mut HashSet<usize>) {
    if visited.contains(&node.id) { return }
    visited.insert(node.id);
    for prev in &node.previous {
      Self::history_recurse(prev, history, visited);
    }
    history.push(node.clone());
  }
}

impl<T: Real> Variable<T>
where
  Tensor<T>: Cops<T>,
{
  /// Compute gradients across this Variable's entire graph.

  pub fn backward(&self) {
    assert!(self.grad().is_some(), "Cannot compute gradients for constant {}", self.tensor());
    self.node.reset_gradient(T::one());
    for node in self.history().iter().rev() {
      node.backward_step();
    }
  }

  /// Compute a function's gradient with respect to a generated
  /// input numerically and compare it to the automatically derived
  /// solution.
  ///
  /// Supply any function to check that it gets differentiated correctly.

  pub fn check_gradients<F>(dims: &[usize], rng: &mut impl rand::Rng, generator: F) -> T
  where
    F: Fn(&Self) -> Self,
  {
    let eps = T::from(0.01).unwrap();
    let two = T::from(2.0).unwrap();
    // Generate random input
    let input = Tensor::uniform(dims, -T::one(), T::one(), rng);
    let var = input.trained();
    // Compute gradient using auto diff
    let output = generator(&var).sum(0);
    output.backward();
    let grad = var.grad().unwrap().detach();
    // Compute gradient numerically for every param in input
    let len = input.size();
    let mut num_grad = vec![T::zero(); len];
    for i in 0..len {
      let mut hot = vec![T::zero(); len];
      hot[i] = eps;
      let epst = Tensor::new(&input.shape().dims, hot);
      let prev = generator(&(&input - &epst).tracked()).sum(0);
      let next = generator(&(&input + &epst).tracked()).sum(0);
      num_grad[i] = (next.item() - prev.item()) / (two * eps);
    }
    let num_grad = Tensor::new(&grad.shape().dims, num_grad);
    // Return average difference between both gradients
    (grad - num_grad).abs().sum(0).item() / T::from(len).unwrap()
  }
}

impl<T: Real> std::ops::SubAssign<Tensor<T>> for Variable<T> {
  fn sub_assign(&mut self, rhs: Tensor<T>) {
    self.node.data.accumulate(&-rhs);
  }
}

impl<T: Real> std::fmt::Display for Variable<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    let title = if self.node.trainable { "Trainable" } else {
      if self.node.grad.is_some() { "Computed" } else { "Tracked" }
    };
    write!(f, "{title} {}", self.tensor())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  #[test]
  fn x_squared() {
    let x = Tensor::vec(&[3.0, 5.0]).trained();
    let z = &x * &x + 2.0;
    z.backward();
    assert_eq!(z, Tensor::vec(&[11.0, 27.0]).tracked());
    assert_eq!(x.grad(), Some(&Tensor::vec(&[6.0, 10.0])));
  }

  #[test]
  fn reset_clears_the_whole_graph() {
    let x = Tensor::vec(&[1.0, 2.0]).trained();
    let z = (&x * &x).sum(0);
    z.backward();
    assert_eq!(x.grad(), Some(&Tensor::vec(&[2.0, 4.0])));
    z.reset();
    assert_eq!(x.grad(), Some(&Tensor::vec(&[0.0, 0.0])));
    z.backward();
    assert_eq!(x.grad(), Some(&Tensor::vec(&[2.0, 4.0])));
  }

  #[test]
  fn matmul_gradients() {
    let mut rng = StdRng::seed_from_u64(5);
    let w = Tensor::<f64>::uniform(&[3, 2], -1.0, 1.0, &mut rng).tracked();
    let diff = Variable::check_gradients(&[2, 3], &mut rng, |x| x.mm(&w).tanh() );
    assert!(diff < 1e-3, "gradient mismatch: {}", diff);
  }
}
