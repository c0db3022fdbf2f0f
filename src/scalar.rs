use rand::distributions::uniform::SampleUniform;
use num_traits::{ PrimInt, NumAssignOps, Num, NumCast };


/// All types that may be used in a [Tensor](crate::Tensor).
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Inner: PartialEq + Clone + Copy + Send + Sync + std::fmt::Debug {}
impl<T: PartialEq + Clone + Copy + Send + Sync + std::fmt::Debug> Inner for T {}


/// All numeric types.
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Numeric: Inner + PartialOrd + Num + NumCast + NumAssignOps + std::iter::Sum {}
impl<T: Inner + PartialOrd + Num + NumCast + NumAssignOps + std::iter::Sum> Numeric for T {}


/// All unsigned integer types. Class labels are stored as these.
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Integer: Numeric + PrimInt + num_traits::Unsigned {}
impl<T: Numeric + PrimInt + num_traits::Unsigned> Integer for T {}


/// All continuous numeric types. Gradients can be computed
/// for tensors over these.
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Real: Numeric + num_traits::Float + num_traits::Signed + SampleUniform {}
impl<T: Numeric + num_traits::Float + num_traits::Signed + SampleUniform> Real for T {}
