//! Dense matrix and gradient-tensor primitives.
//!
//! Everything in the engine is expressed over [`Matrix`] (one column per
//! batch element) and [`GradientTensor`] (the canonically ordered collection
//! of per-connection gradient matrices that travels between the backward
//! pass, the optimizer, and the weight update).

pub mod matrix;
pub mod tensor;

pub use matrix::{one_hot_batch, Matrix};
pub use tensor::GradientTensor;
