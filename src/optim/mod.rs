//! Adaptive moment estimation over gradient tensors.
//!
//! The optimizer is a stateful, shape-preserving transform from a raw
//! gradient tensor to a weight-update tensor. First- and second-moment
//! estimates are carried across calls and lazily initialized to zero on the
//! first one.
//!
//! Bias correction here divides by the constant `1 - beta` rather than the
//! step-dependent `1 - beta^t`: the estimator does not track a step counter.
//! This deviates from the textbook formulation on purpose and is pinned by
//! tests — do not "fix" it without revisiting the training behavior that
//! was tuned against it.

use serde::{Deserialize, Serialize};

use crate::math::GradientTensor;

/// Optimizer hyperparameters, fixed per instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdamConfig {
    /// First-moment decay.
    pub beta1: f64,
    /// Second-moment decay.
    pub beta2: f64,
    /// Numerical floor inside the variance square root.
    pub epsilon: f64,
    /// Step size.
    pub learning_rate: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            learning_rate: 0.001,
        }
    }
}

/// Stateful gradient-to-update transform.
#[derive(Debug, Clone)]
pub struct AdamOptimizer {
    config: AdamConfig,
    /// First-moment estimate, allocated on the first update.
    momentum: Option<GradientTensor>,
    /// Second-moment estimate, same shape as `momentum`.
    variance: Option<GradientTensor>,
}

impl AdamOptimizer {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            momentum: None,
            variance: None,
        }
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Transform a gradient tensor into a weight-update tensor.
    ///
    /// The input must keep the same shape across calls; moment state is
    /// scoped to one training run over one network.
    pub fn update(&mut self, gradient: &GradientTensor) -> GradientTensor {
        let AdamConfig {
            beta1,
            beta2,
            epsilon,
            learning_rate,
        } = self.config;

        let momentum = self
            .momentum
            .get_or_insert_with(|| GradientTensor::zeros_like(gradient));
        assert!(
            momentum.same_shape(gradient),
            "gradient tensor shape changed between optimizer calls"
        );
        *momentum = momentum.zip_map(gradient, |m, g| beta1 * m + (1.0 - beta1) * g);

        let variance = self
            .variance
            .get_or_insert_with(|| GradientTensor::zeros_like(gradient));
        *variance = variance.zip_map(gradient, |v, g| beta2 * v + (1.0 - beta2) * g * g);

        // Fixed-decay bias correction (see module docs).
        let corrected_momentum = {
            let mut m = momentum.clone();
            m.scale_assign(1.0 / (1.0 - beta1));
            m
        };
        let corrected_variance = {
            let mut v = variance.clone();
            v.scale_assign(1.0 / (1.0 - beta2));
            v
        };

        corrected_momentum.zip_map(&corrected_variance, |m, v| {
            -learning_rate * m / (v + epsilon).sqrt()
        })
    }
}
