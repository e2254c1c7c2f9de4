// =============================================================================
// one_class_svm.rs — THE BOUNDARY
// =============================================================================
//
// A one-class SVM with an RBF kernel, solved with SMO the way libsvm does it:
//
//   min  1/2 a'Ka   s.t.  0 <= a_i <= 1,  sum(a) = nu * l
//
// Working-set selection uses second-order information (WSS3 from Fan, Chen
// and Lin 2005). The decision value of a point is sum(a_i K(x_i, x)) - rho;
// positive means inside the learned boundary.
//
// gamma defaults to the "scale" heuristic, 1 / (n_features * var(X)).
//
// The kernel matrix is never materialized. Rows are computed when the solver
// asks for them and kept in an LRU cache bounded by `cache_bytes`, so memory
// stays flat no matter how many postings we train on.
// =============================================================================

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{ImpactError, Result};
use crate::sparse::{squared_distance, SparseMatrix, SparseVector};

/// Stopping tolerance on the maximal KKT violation.
const TOLERANCE: f64 = 1e-3;
/// Floor for non-positive curvature in the two-variable subproblem.
const TAU: f64 = 1e-12;
/// Kernel cache budget when none is given, 200 MiB.
pub const DEFAULT_CACHE_BYTES: usize = 200 * 1024 * 1024;
/// The solver holds two rows at once.
const MIN_CACHED_ROWS: usize = 2;

/// Hyperparameters for [`OneClassSvm::fit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvmParams {
    /// Upper bound on the fraction of training errors, in (0, 1].
    pub nu: f64,
    /// RBF width. `None` selects the scale heuristic.
    pub gamma: Option<f64>,
    /// Memory budget for cached kernel rows.
    pub cache_bytes: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            nu: 0.5,
            gamma: None,
            cache_bytes: DEFAULT_CACHE_BYTES,
        }
    }
}

/// A fitted one-class SVM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneClassSvm {
    gamma: f64,
    rho: f64,
    n_features: usize,
    support: Vec<SparseVector>,
    support_norms: Vec<f64>,
    coef: Vec<f64>,
}

impl OneClassSvm {
    pub fn fit(x: &SparseMatrix, params: SvmParams) -> Result<Self> {
        if x.is_empty() {
            return Err(ImpactError::InsufficientData { found: 0, required: 1 });
        }
        if !(params.nu > 0.0 && params.nu <= 1.0) {
            return Err(ImpactError::Configuration(format!(
                "nu must be in (0, 1], got {}",
                params.nu
            )));
        }

        let gamma = match params.gamma {
            Some(gamma) => gamma,
            None => {
                let spread = x.n_features() as f64 * x.variance();
                if spread > 0.0 { 1.0 / spread } else { 1.0 }
            }
        };

        let rows = x.rows();
        let norms: Vec<f64> = rows.iter().map(SparseVector::squared_norm).collect();
        let mut kernel = KernelCache::new(rows, &norms, gamma, params.cache_bytes);
        let (alpha, rho, iterations) = solve(&mut kernel, params.nu);

        let mut support = Vec::new();
        let mut support_norms = Vec::new();
        let mut coef = Vec::new();
        for (i, &a) in alpha.iter().enumerate() {
            if a > 0.0 {
                support.push(rows[i].clone());
                support_norms.push(norms[i]);
                coef.push(a);
            }
        }

        debug!(
            rows = rows.len(),
            support_vectors = support.len(),
            gamma = gamma,
            rho = rho,
            iterations = iterations,
            cached_rows = kernel.capacity(),
            "One-class SVM fitted"
        );

        Ok(Self {
            gamma,
            rho,
            n_features: x.n_features(),
            support,
            support_norms,
            coef,
        })
    }

    /// Signed distance to the boundary for every row of `x`.
    pub fn decision_function(&self, x: &SparseMatrix) -> Result<Vec<f64>> {
        if x.n_features() != self.n_features {
            return Err(ImpactError::DimensionMismatch {
                expected: self.n_features,
                found: x.n_features(),
            });
        }
        Ok(x.rows().par_iter().map(|row| self.decision(row)).collect())
    }

    fn decision(&self, row: &SparseVector) -> f64 {
        let row_sq = row.squared_norm();
        let sum: f64 = self
            .support
            .iter()
            .zip(&self.support_norms)
            .zip(&self.coef)
            .map(|((sv, &sv_sq), &a)| a * rbf(self.gamma, squared_distance(row, row_sq, sv, sv_sq)))
            .sum();
        sum - self.rho
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn support_vector_count(&self) -> usize {
        self.support.len()
    }

    /// Sum of the dual coefficients; equals `nu * l` after fitting.
    pub fn coef_sum(&self) -> f64 {
        self.coef.iter().sum()
    }
}

fn rbf(gamma: f64, squared_distance: f64) -> f64 {
    (-gamma * squared_distance).exp()
}

/// Kernel rows on demand, least recently used evicted first.
struct KernelCache<'a> {
    rows: &'a [SparseVector],
    norms: &'a [f64],
    gamma: f64,
    diag: Vec<f64>,
    cache: LruCache<usize, Arc<[f64]>>,
}

impl<'a> KernelCache<'a> {
    fn new(rows: &'a [SparseVector], norms: &'a [f64], gamma: f64, cache_bytes: usize) -> Self {
        let row_bytes = (rows.len() * std::mem::size_of::<f64>()).max(1);
        let capacity = (cache_bytes / row_bytes).clamp(MIN_CACHED_ROWS, rows.len().max(MIN_CACHED_ROWS));
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let diag = rows
            .iter()
            .zip(norms)
            .map(|(row, &sq)| rbf(gamma, squared_distance(row, sq, row, sq)))
            .collect();

        Self {
            rows,
            norms,
            gamma,
            diag,
            cache: LruCache::new(capacity),
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    #[inline]
    fn diag(&self, i: usize) -> f64 {
        self.diag[i]
    }

    /// Row `i` of the kernel matrix.
    fn row(&mut self, i: usize) -> Arc<[f64]> {
        if let Some(row) = self.cache.get(&i) {
            return Arc::clone(row);
        }

        let (rows, norms, gamma) = (self.rows, self.norms, self.gamma);
        let row: Arc<[f64]> = (0..rows.len())
            .into_par_iter()
            .map(|j| rbf(gamma, squared_distance(&rows[i], norms[i], &rows[j], norms[j])))
            .collect::<Vec<f64>>()
            .into();
        self.cache.put(i, Arc::clone(&row));
        row
    }
}

/// SMO for the one-class dual. Returns `(alpha, rho, iterations)`.
fn solve(kernel: &mut KernelCache<'_>, nu: f64) -> (Vec<f64>, f64, usize) {
    const UPPER: f64 = 1.0;
    let l = kernel.len();
    let total = nu * l as f64;
    let full = (total.floor() as usize).min(l);

    let mut alpha = vec![0.0; l];
    for a in alpha.iter_mut().take(full) {
        *a = UPPER;
    }
    if full < l {
        alpha[full] = total - full as f64;
    }

    // Only rows with a non-zero alpha contribute to the starting gradient.
    let mut grad = vec![0.0; l];
    for (i, &a) in alpha.iter().enumerate() {
        if a > 0.0 {
            let row = kernel.row(i);
            for (g, &q) in grad.iter_mut().zip(row.iter()) {
                *g += a * q;
            }
        }
    }

    let max_iter = (100 * l).max(10_000_000);
    let mut iterations = 0;

    while iterations < max_iter {
        let Some((i, j, row_i)) = select_working_set(kernel, &alpha, &grad, UPPER) else {
            break;
        };
        iterations += 1;
        let row_j = kernel.row(j);

        let (old_i, old_j) = (alpha[i], alpha[j]);
        let mut quad = kernel.diag(i) + kernel.diag(j) - 2.0 * row_i[j];
        if quad <= 0.0 {
            quad = TAU;
        }
        let delta = (grad[i] - grad[j]) / quad;
        let sum = alpha[i] + alpha[j];
        alpha[i] -= delta;
        alpha[j] += delta;

        if sum > UPPER {
            if alpha[i] > UPPER {
                alpha[i] = UPPER;
                alpha[j] = sum - UPPER;
            }
        } else if alpha[j] < 0.0 {
            alpha[j] = 0.0;
            alpha[i] = sum;
        }
        if sum > UPPER {
            if alpha[j] > UPPER {
                alpha[j] = UPPER;
                alpha[i] = sum - UPPER;
            }
        } else if alpha[i] < 0.0 {
            alpha[i] = 0.0;
            alpha[j] = sum;
        }

        let (delta_i, delta_j) = (alpha[i] - old_i, alpha[j] - old_j);
        for ((g, &qi), &qj) in grad.iter_mut().zip(row_i.iter()).zip(row_j.iter()) {
            *g += qi * delta_i + qj * delta_j;
        }
    }

    if iterations >= max_iter {
        warn!(iterations = iterations, "One-class SVM solver hit the iteration cap");
    }

    let rho = compute_rho(&alpha, &grad, UPPER);
    (alpha, rho, iterations)
}

/// Pick the maximal violating pair, or `None` once within tolerance. Hands
/// back row `i` so the caller does not fetch it twice.
fn select_working_set(
    kernel: &mut KernelCache<'_>,
    alpha: &[f64],
    grad: &[f64],
    upper: f64,
) -> Option<(usize, usize, Arc<[f64]>)> {
    let mut gmax = f64::NEG_INFINITY;
    let mut i_sel = None;
    for (t, (&a, &g)) in alpha.iter().zip(grad).enumerate() {
        if a < upper && -g >= gmax {
            gmax = -g;
            i_sel = Some(t);
        }
    }
    let i = i_sel?;
    let row_i = kernel.row(i);

    let mut gmax2 = f64::NEG_INFINITY;
    let mut j_sel = None;
    let mut obj_min = f64::INFINITY;
    for (t, (&a, &g)) in alpha.iter().zip(grad).enumerate() {
        if a <= 0.0 {
            continue;
        }
        let grad_diff = gmax + g;
        if g >= gmax2 {
            gmax2 = g;
        }
        if grad_diff > 0.0 {
            let mut quad = kernel.diag(i) + kernel.diag(t) - 2.0 * row_i[t];
            if quad <= 0.0 {
                quad = TAU;
            }
            let obj = -(grad_diff * grad_diff) / quad;
            if obj <= obj_min {
                obj_min = obj;
                j_sel = Some(t);
            }
        }
    }

    if gmax + gmax2 < TOLERANCE {
        return None;
    }
    j_sel.map(|j| (i, j, row_i))
}

fn compute_rho(alpha: &[f64], grad: &[f64], upper: f64) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free_count = 0usize;

    for (&a, &g) in alpha.iter().zip(grad) {
        if a >= upper {
            lb = lb.max(g);
        } else if a <= 0.0 {
            ub = ub.min(g);
        } else {
            free_count += 1;
            free_sum += g;
        }
    }

    if free_count > 0 {
        free_sum / free_count as f64
    } else {
        (ub + lb) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> SparseMatrix {
        let rows = (0..12)
            .map(|i| {
                let wobble = (i as f64) * 0.01;
                SparseVector::from_pairs(vec![(0, 1.0 + wobble), (1, 1.0 - wobble)])
            })
            .collect();
        SparseMatrix::new(3, rows)
    }

    #[test]
    fn test_dual_constraint_holds() {
        let svm = OneClassSvm::fit(&cluster(), SvmParams::default()).unwrap();
        assert!((svm.coef_sum() - 0.5 * 12.0).abs() < 1e-9);
        assert!(svm.support_vector_count() >= 6);
    }

    #[test]
    fn test_far_point_scores_below_cluster_point() {
        let x = cluster();
        let params = SvmParams {
            gamma: Some(0.5),
            ..SvmParams::default()
        };
        let svm = OneClassSvm::fit(&x, params).unwrap();
        let probe = SparseMatrix::new(
            3,
            vec![
                SparseVector::from_pairs(vec![(0, 1.05), (1, 0.95)]),
                SparseVector::from_pairs(vec![(2, 6.0)]),
            ],
        );
        let scores = svm.decision_function(&probe).unwrap();
        assert!(scores[0] > scores[1], "{scores:?}");
        assert!(scores[1] < 0.0);
    }

    #[test]
    fn test_identical_rows_score_identically() {
        let row = SparseVector::from_pairs(vec![(0, 0.6), (1, 0.8)]);
        let x = SparseMatrix::new(2, vec![row.clone(); 5]);
        let svm = OneClassSvm::fit(&x, SvmParams::default()).unwrap();
        let scores = svm.decision_function(&x).unwrap();
        for s in &scores {
            assert!((s - scores[0]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rejects_bad_nu_and_empty_input() {
        assert!(matches!(
            OneClassSvm::fit(&cluster(), SvmParams { nu: 0.0, ..SvmParams::default() }),
            Err(ImpactError::Configuration(_))
        ));
        assert!(matches!(
            OneClassSvm::fit(&SparseMatrix::new(3, vec![]), SvmParams::default()),
            Err(ImpactError::InsufficientData { .. })
        ));
    }

    fn spread() -> SparseMatrix {
        let rows = (0..16)
            .map(|i| {
                let t = i as f64;
                SparseVector::from_pairs(vec![(0, (t * 0.7).sin()), (1, (t * 0.3).cos()), (2, t * 0.05)])
            })
            .collect();
        SparseMatrix::new(3, rows)
    }

    #[test]
    fn test_kernel_cache_evicts_and_recomputes() {
        let x = spread();
        let norms: Vec<f64> = x.rows().iter().map(SparseVector::squared_norm).collect();
        let row_bytes = x.n_rows() * std::mem::size_of::<f64>();
        let mut kernel = KernelCache::new(x.rows(), &norms, 0.5, 3 * row_bytes);
        assert_eq!(kernel.capacity(), 3);

        let first = kernel.row(0);
        for i in 1..x.n_rows() {
            kernel.row(i);
        }
        assert_eq!(kernel.cache.len(), 3);
        assert!(!kernel.cache.contains(&0));

        let again = kernel.row(0);
        assert_eq!(&first[..], &again[..]);
        for (j, &k) in again.iter().enumerate() {
            let expected = rbf(0.5, squared_distance(&x.rows()[0], norms[0], &x.rows()[j], norms[j]));
            assert_eq!(k, expected);
        }
        assert_eq!(kernel.diag(0), again[0]);
    }

    #[test]
    fn test_tiny_cache_matches_full_cache() {
        let x = spread();
        let full = OneClassSvm::fit(&x, SvmParams::default()).unwrap();
        assert_eq!(full_capacity(&x), x.n_rows());

        let tiny = OneClassSvm::fit(
            &x,
            SvmParams {
                cache_bytes: 2 * x.n_rows() * std::mem::size_of::<f64>(),
                ..SvmParams::default()
            },
        )
        .unwrap();

        assert_eq!(tiny, full);
        assert_eq!(
            tiny.decision_function(&x).unwrap(),
            full.decision_function(&x).unwrap()
        );
    }

    fn full_capacity(x: &SparseMatrix) -> usize {
        let norms: Vec<f64> = x.rows().iter().map(SparseVector::squared_norm).collect();
        KernelCache::new(x.rows(), &norms, 1.0, DEFAULT_CACHE_BYTES).capacity()
    }

    #[test]
    fn test_dimension_mismatch() {
        let svm = OneClassSvm::fit(&cluster(), SvmParams::default()).unwrap();
        let other = SparseMatrix::new(7, vec![SparseVector::default()]);
        assert!(matches!(
            svm.decision_function(&other),
            Err(ImpactError::DimensionMismatch { expected: 3, found: 7 })
        ));
    }
}
