//! Layer activation kinds and their elementwise derivatives.

use serde::{Deserialize, Serialize};

/// Activation applied elementwise to a layer's summed input.
///
/// `Softmax` is only meaningful on the output layer, where the forward pass
/// applies it per batch column with temperature scaling instead of
/// elementwise; its stored derivative is zero because backprop folds the
/// softmax Jacobian into the cross-entropy delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Tanh,
    Logistic,
    Relu,
    Softmax,
}

impl Activation {
    /// Activation value for a single summed input.
    #[inline]
    pub fn value(self, x: f64) -> f64 {
        match self {
            Self::Tanh => x.tanh(),
            Self::Logistic => logistic(x),
            Self::Relu => x.max(0.0),
            Self::Softmax => x,
        }
    }

    /// Derivative at the same point, given both the input and the already
    /// computed activation value.
    #[inline]
    pub fn derivative(self, x: f64, value: f64) -> f64 {
        match self {
            Self::Tanh => 1.0 - value * value,
            Self::Logistic => value * (1.0 - value),
            Self::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Softmax => 0.0,
        }
    }
}

#[inline]
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
