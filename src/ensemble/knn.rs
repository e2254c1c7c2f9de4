//! Brute-force k-nearest-neighbour distance index over sparse rows.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{ImpactError, Result};
use crate::sparse::{squared_distance, SparseMatrix, SparseVector};

/// Stores the fitted rows and answers "how far are my k nearest neighbours".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnIndex {
    k: usize,
    n_features: usize,
    points: Vec<SparseVector>,
    squared_norms: Vec<f64>,
}

impl KnnIndex {
    /// Index every row of `x`. `k` must not exceed the row count.
    pub fn fit(x: &SparseMatrix, k: usize) -> Result<Self> {
        if x.is_empty() {
            return Err(ImpactError::InsufficientData { found: 0, required: 1 });
        }
        if k == 0 || k > x.n_rows() {
            return Err(ImpactError::Configuration(format!(
                "neighbour count {k} must be between 1 and {}",
                x.n_rows()
            )));
        }
        let points = x.rows().to_vec();
        let squared_norms = points.iter().map(SparseVector::squared_norm).collect();
        Ok(Self {
            k,
            n_features: x.n_features(),
            points,
            squared_norms,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// For each query row, the distances to its `k` nearest indexed rows in
    /// ascending order. A query identical to an indexed row sees itself at 0.
    pub fn kneighbors(&self, x: &SparseMatrix) -> Result<Vec<Vec<f64>>> {
        if x.n_features() != self.n_features {
            return Err(ImpactError::DimensionMismatch {
                expected: self.n_features,
                found: x.n_features(),
            });
        }
        Ok(x.rows().par_iter().map(|row| self.neighbors_of(row)).collect())
    }

    fn neighbors_of(&self, query: &SparseVector) -> Vec<f64> {
        let query_sq = query.squared_norm();
        let mut distances: Vec<f64> = self
            .points
            .iter()
            .zip(&self.squared_norms)
            .map(|(point, &point_sq)| squared_distance(query, query_sq, point, point_sq).sqrt())
            .collect();

        if self.k < distances.len() {
            distances.select_nth_unstable_by(self.k - 1, f64::total_cmp);
            distances.truncate(self.k);
        }
        distances.sort_by(f64::total_cmp);
        distances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[(usize, f64)]]) -> SparseMatrix {
        SparseMatrix::new(
            3,
            rows.iter().map(|r| SparseVector::from_pairs(r.to_vec())).collect(),
        )
    }

    #[test]
    fn test_neighbors_sorted_and_include_self() {
        let x = matrix(&[&[(0, 1.0)], &[(1, 1.0)], &[(0, 1.0), (1, 1.0)], &[(2, 3.0)]]);
        let index = KnnIndex::fit(&x, 2).unwrap();
        let neighbors = index.kneighbors(&x).unwrap();

        assert_eq!(neighbors.len(), 4);
        for row in &neighbors {
            assert_eq!(row.len(), 2);
            assert_eq!(row[0], 0.0);
            assert!(row[0] <= row[1]);
        }
        // Row 0's nearest other point is row 2 at distance 1.
        assert!((neighbors[0][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_k_bounds() {
        let x = matrix(&[&[(0, 1.0)], &[(1, 1.0)]]);
        assert!(matches!(KnnIndex::fit(&x, 3), Err(ImpactError::Configuration(_))));
        assert!(matches!(KnnIndex::fit(&x, 0), Err(ImpactError::Configuration(_))));
        assert!(matches!(
            KnnIndex::fit(&SparseMatrix::new(3, vec![]), 1),
            Err(ImpactError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let x = matrix(&[&[(0, 1.0)], &[(1, 1.0)]]);
        let index = KnnIndex::fit(&x, 1).unwrap();
        let other = SparseMatrix::new(5, vec![SparseVector::default()]);
        assert!(matches!(
            index.kneighbors(&other),
            Err(ImpactError::DimensionMismatch { expected: 3, found: 5 })
        ));
    }
}
