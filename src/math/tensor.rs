//! Gradient tensor: the ordered collection of per-connection matrices that
//! moves between the backward pass, the optimizer, and the weight update.
//!
//! The entry order is a structural contract — layers in declaration order,
//! connections within a layer in declaration order — and is the sole means
//! of associating an entry with its connection. Every producer and consumer
//! must traverse the network the same way.

use crate::math::Matrix;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// Ordered sequence of per-connection matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientTensor {
    entries: Vec<Matrix>,
}

impl GradientTensor {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// All-zero tensor with the same entry shapes as `other`.
    pub fn zeros_like(other: &Self) -> Self {
        Self {
            entries: other
                .entries
                .iter()
                .map(|m| Matrix::zeros(m.rows(), m.cols()))
                .collect(),
        }
    }

    /// Append the next entry in canonical order.
    pub fn push(&mut self, entry: Matrix) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Matrix> {
        self.entries.iter()
    }

    /// True if both tensors have the same entry count and per-entry shapes.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a.same_shape(b))
    }

    /// Elementwise in-place add. Shapes must match exactly.
    pub fn add_assign(&mut self, other: &Self) {
        assert!(
            self.same_shape(other),
            "gradient tensor shape mismatch: {} vs {} entries",
            self.entries.len(),
            other.entries.len()
        );
        for (a, b) in self.entries.iter_mut().zip(other.entries.iter()) {
            a.add_assign(b);
        }
    }

    /// In-place scalar multiply of every entry.
    pub fn scale_assign(&mut self, factor: f64) {
        for m in &mut self.entries {
            m.scale_assign(factor);
        }
    }

    /// Combine two tensors entrywise into a new tensor.
    pub fn zip_map<F: Fn(f64, f64) -> f64>(&self, other: &Self, f: F) -> Self {
        assert!(
            self.same_shape(other),
            "gradient tensor shape mismatch in zip_map"
        );
        let entries = self
            .entries
            .iter()
            .zip(other.entries.iter())
            .map(|(a, b)| {
                let mut out = Matrix::zeros(a.rows(), a.cols());
                for ((o, &x), &y) in out
                    .as_mut_slice()
                    .iter_mut()
                    .zip(a.as_slice())
                    .zip(b.as_slice())
                {
                    *o = f(x, y);
                }
                out
            })
            .collect();
        Self { entries }
    }

    /// Elementwise average of a non-empty set of identically shaped tensors.
    pub fn average(tensors: &[Self]) -> Self {
        assert!(!tensors.is_empty(), "cannot average zero gradient tensors");
        let mut sum = tensors[0].clone();
        for t in &tensors[1..] {
            sum.add_assign(t);
        }
        sum.scale_assign(1.0 / tensors.len() as f64);
        sum
    }
}

impl Default for GradientTensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for GradientTensor {
    type Output = Matrix;

    fn index(&self, index: usize) -> &Matrix {
        &self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor_of(value: f64) -> GradientTensor {
        let mut t = GradientTensor::new();
        t.push(Matrix::zeros(2, 3).map(|_| value));
        t.push(Matrix::zeros(1, 4).map(|_| value));
        t
    }

    #[test]
    fn test_average_elementwise() {
        let avg = GradientTensor::average(&[tensor_of(1.0), tensor_of(3.0)]);
        assert_eq!(avg.len(), 2);
        assert!(avg[0].as_slice().iter().all(|&v| (v - 2.0).abs() < 1e-12));
        assert!(avg[1].as_slice().iter().all(|&v| (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_zip_map_shapes_preserved() {
        let a = tensor_of(2.0);
        let b = tensor_of(5.0);
        let c = a.zip_map(&b, |x, y| x * y);
        assert!(c.same_shape(&a));
        assert!(c[0].as_slice().iter().all(|&v| (v - 10.0).abs() < 1e-12));
    }

    #[test]
    #[should_panic(expected = "shape mismatch")]
    fn test_add_assign_rejects_mismatched_tensors() {
        let mut a = tensor_of(1.0);
        let mut b = GradientTensor::new();
        b.push(Matrix::zeros(2, 3));
        a.add_assign(&b);
    }
}
