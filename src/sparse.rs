//! Sparse row vectors and the few linear-algebra helpers the ensemble needs.

use serde::{Deserialize, Serialize};

/// A sparse vector with strictly increasing indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseVector {
    /// Build from `(index, value)` pairs. Pairs are sorted, duplicates summed,
    /// zeros dropped.
    pub fn from_pairs(mut pairs: Vec<(usize, f64)>) -> Self {
        pairs.sort_by_key(|&(index, _)| index);
        let mut indices: Vec<usize> = Vec::with_capacity(pairs.len());
        let mut values: Vec<f64> = Vec::with_capacity(pairs.len());
        for (index, value) in pairs {
            if indices.last() == Some(&index) {
                if let Some(last) = values.last_mut() {
                    *last += value;
                }
            } else {
                indices.push(index);
                values.push(value);
            }
        }
        let (indices, values) = indices
            .into_iter()
            .zip(values)
            .filter(|&(_, value)| value != 0.0)
            .unzip();
        Self { indices, values }
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Value at `index`, zero when absent.
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    pub fn squared_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// Scale to unit L2 norm; the zero vector stays zero.
    pub fn l2_normalized(mut self) -> Self {
        let norm = self.squared_norm().sqrt();
        if norm > 0.0 {
            for value in &mut self.values {
                *value /= norm;
            }
        }
        self
    }
}

/// Squared Euclidean distance from precomputed squared norms, clamped at zero
/// against rounding.
pub fn squared_distance(a: &SparseVector, a_sq: f64, b: &SparseVector, b_sq: f64) -> f64 {
    (a_sq + b_sq - 2.0 * a.dot(b)).max(0.0)
}

/// Euclidean distance between two dense vectors of equal length.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// A row-major sparse matrix with a fixed column count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    n_features: usize,
    rows: Vec<SparseVector>,
}

impl SparseMatrix {
    pub fn new(n_features: usize, rows: Vec<SparseVector>) -> Self {
        Self { n_features, rows }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn rows(&self) -> &[SparseVector] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> &SparseVector {
        &self.rows[index]
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Variance over every cell, implicit zeros included.
    pub fn variance(&self) -> f64 {
        let cells = (self.rows.len() * self.n_features) as f64;
        if cells == 0.0 {
            return 0.0;
        }
        let (sum, sum_sq) = self
            .rows
            .iter()
            .flat_map(|row| row.values.iter())
            .fold((0.0, 0.0), |(s, sq), v| (s + v, sq + v * v));
        let mean = sum / cells;
        (sum_sq / cells - mean * mean).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_sorts_merges_and_drops_zeros() {
        let v = SparseVector::from_pairs(vec![(5, 1.0), (1, 2.0), (5, 0.5), (3, 0.0)]);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![(1, 2.0), (5, 1.5)]);
        assert_eq!(v.get(5), 1.5);
        assert_eq!(v.get(3), 0.0);
    }

    #[test]
    fn test_dot_and_distance() {
        let a = SparseVector::from_pairs(vec![(0, 1.0), (2, 2.0)]);
        let b = SparseVector::from_pairs(vec![(1, 3.0), (2, 4.0)]);
        assert_eq!(a.dot(&b), 8.0);
        let d = squared_distance(&a, a.squared_norm(), &b, b.squared_norm());
        assert!((d - (1.0 + 9.0 + 4.0)).abs() < 1e-12);
        assert_eq!(squared_distance(&a, a.squared_norm(), &a, a.squared_norm()), 0.0);
    }

    #[test]
    fn test_l2_normalized() {
        let v = SparseVector::from_pairs(vec![(0, 3.0), (1, 4.0)]).l2_normalized();
        assert!((v.squared_norm() - 1.0).abs() < 1e-12);
        assert!(SparseVector::default().l2_normalized().is_empty());
    }

    #[test]
    fn test_euclidean() {
        assert_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }

    #[test]
    fn test_variance_counts_implicit_zeros() {
        let m = SparseMatrix::new(2, vec![SparseVector::from_pairs(vec![(0, 2.0)]), SparseVector::default()]);
        // cells: [2, 0, 0, 0] -> mean 0.5, var 0.75
        assert!((m.variance() - 0.75).abs() < 1e-12);
    }
}
