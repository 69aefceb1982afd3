//! Dense f64 matrix with the batch convention used throughout the engine:
//! activations are stored node-count × batch-size, one column per batch
//! element. Weight matrices are destination-nodes × (source-nodes + 1), the
//! trailing column being the bias term.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Row-major dense matrix of `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        assert!(rows > 0 && cols > 0, "matrix dimensions must be non-zero");
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Matrix with entries drawn uniformly from `[-range, range)`.
    pub fn uniform<R: Rng>(rows: usize, cols: usize, range: f64, rng: &mut R) -> Self {
        assert!(rows > 0 && cols > 0, "matrix dimensions must be non-zero");
        let data = (0..rows * cols)
            .map(|_| rng.gen::<f64>() * 2.0 * range - range)
            .collect();
        Self { rows, cols, data }
    }

    /// Build a matrix from a row-major slice of rows.
    pub fn from_rows(rows: &[&[f64]]) -> Self {
        assert!(!rows.is_empty() && !rows[0].is_empty());
        let cols = rows[0].len();
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            assert_eq!(row.len(), cols, "ragged rows");
            data.extend_from_slice(row);
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Flat row-major view of the entries.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Flat mutable row-major view of the entries.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Matrix product `self * other`.
    pub fn matmul(&self, other: &Self) -> Self {
        assert_eq!(
            self.cols, other.rows,
            "matmul shape mismatch: {}x{} * {}x{}",
            self.rows, self.cols, other.rows, other.cols
        );
        let mut out = Self::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let lhs = self.data[r * self.cols + k];
                if lhs == 0.0 {
                    continue;
                }
                for c in 0..other.cols {
                    out.data[r * other.cols + c] += lhs * other.data[k * other.cols + c];
                }
            }
        }
        out
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    /// Copy of `self` with a row of constant 1.0 appended at the bottom.
    ///
    /// Applied to a source activation before multiplying by a connection's
    /// weight matrix so the trailing weight column acts as the bias.
    pub fn with_bias_row(&self) -> Self {
        let mut out = Self::zeros(self.rows + 1, self.cols);
        out.data[..self.rows * self.cols].copy_from_slice(&self.data);
        for c in 0..self.cols {
            out.data[self.rows * self.cols + c] = 1.0;
        }
        out
    }

    /// Copy of `self` without its last column (the bias column of a weight
    /// matrix), used when propagating deltas back to a source layer.
    pub fn drop_bias_column(&self) -> Self {
        assert!(self.cols > 1, "weight matrix has no non-bias columns");
        let mut out = Self::zeros(self.rows, self.cols - 1);
        for r in 0..self.rows {
            let src = &self.data[r * self.cols..r * self.cols + self.cols - 1];
            out.data[r * (self.cols - 1)..(r + 1) * (self.cols - 1)].copy_from_slice(src);
        }
        out
    }

    /// Elementwise difference `self - other`.
    pub fn sub(&self, other: &Self) -> Self {
        self.assert_same_shape(other);
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a - b)
            .collect();
        Self {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Elementwise in-place add.
    pub fn add_assign(&mut self, other: &Self) {
        self.assert_same_shape(other);
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    /// Elementwise in-place multiply (Hadamard product).
    pub fn hadamard_assign(&mut self, other: &Self) {
        self.assert_same_shape(other);
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a *= b;
        }
    }

    /// In-place scalar multiply.
    pub fn scale_assign(&mut self, factor: f64) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Scaled copy.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut out = self.clone();
        out.scale_assign(factor);
        out
    }

    /// Elementwise map.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        let data = self.data.iter().map(|&v| f(v)).collect();
        Self {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Sum of squared entries.
    pub fn squared_sum(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// True if every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    pub fn same_shape(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    fn assert_same_shape(&self, other: &Self) {
        assert!(
            self.same_shape(other),
            "shape mismatch: {}x{} vs {}x{}",
            self.rows,
            self.cols,
            other.rows,
            other.cols
        );
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        assert!(r < self.rows && c < self.cols, "index out of bounds");
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        assert!(r < self.rows && c < self.cols, "index out of bounds");
        &mut self.data[r * self.cols + c]
    }
}

/// One-hot batch: `dim × symbols.len()`, with a single 1.0 per column.
pub fn one_hot_batch(symbols: &[usize], dim: usize) -> Matrix {
    assert!(!symbols.is_empty());
    let mut out = Matrix::zeros(dim, symbols.len());
    for (c, &s) in symbols.iter().enumerate() {
        assert!(s < dim, "symbol index {s} out of range for dimension {dim}");
        out[(s, c)] = 1.0;
    }
    out
}
