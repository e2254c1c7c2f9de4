// =============================================================================
// ensemble/mod.rs — TWO DETECTORS, ONE SCORE, ONE LINE IN THE SAND
// =============================================================================
//
// Neither a neighbour-distance detector nor a one-class boundary gets to
// decide alone. Each row gets:
//
//   1. its distance vector to the 8 nearest training rows (KNN), and
//   2. its signed distance to the one-class SVM boundary.
//
// Calibration (learn = true, held-out data only) finds the two rows whose
// distance vectors are farthest apart and remembers them as max_pair /
// max_distance. Every row is then scored as
//
//   d_i     = max pairwise distance among { own vector, max_pair.0, max_pair.1 }
//   score_i = (10 - |max_distance - d_i|) + boundary_i
//
// and the threshold lands halfway between the mean score and the max score
// of the calibration batch. Rows at or below the threshold are impact jobs.
// =============================================================================

pub mod knn;
pub mod one_class_svm;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{ImpactError, Result};
use crate::models::Verdict;
use crate::sparse::{euclidean, SparseMatrix};

pub use knn::KnnIndex;
pub use one_class_svm::{OneClassSvm, SvmParams};

/// Neighbours per row in the distance signal.
pub const NEIGHBOR_COUNT: usize = 8;

/// A row whose geometry reproduces the calibration extreme scores this much
/// before its boundary term.
const SCORE_CEILING: f64 = 10.0;

/// What a calibration pass learned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// The mutually farthest pair of neighbour-distance vectors.
    pub max_pair: Option<(Vec<f64>, Vec<f64>)>,
    /// Euclidean separation of `max_pair`.
    pub max_distance: f64,
    /// Mean boundary score over the calibration batch. Diagnostic only.
    pub svm_score: f64,
    /// Rows scoring at or below this are impact jobs.
    pub threshold: f64,
}

/// KNN-distance + one-class-SVM outlier ensemble with a learned threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierEnsemble {
    nu: f64,
    knn: Option<KnnIndex>,
    svm: Option<OneClassSvm>,
    calibration: Calibration,
}

impl Default for OutlierEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl OutlierEnsemble {
    pub fn new() -> Self {
        Self::with_nu(SvmParams::default().nu)
    }

    pub fn with_nu(nu: f64) -> Self {
        Self {
            nu,
            knn: None,
            svm: None,
            calibration: Calibration::default(),
        }
    }

    /// Fit both detectors on the training matrix. Any previous calibration
    /// is discarded. No scoring happens here.
    pub fn fit(&mut self, x: &SparseMatrix) -> Result<()> {
        if x.is_empty() {
            return Err(ImpactError::InsufficientData { found: 0, required: 1 });
        }

        let k = NEIGHBOR_COUNT.min(x.n_rows());
        if k < NEIGHBOR_COUNT {
            warn!(
                rows = x.n_rows(),
                k = k,
                "Fewer training rows than neighbours; clamping k"
            );
        }

        let knn = KnnIndex::fit(x, k)?;
        let svm = OneClassSvm::fit(
            x,
            SvmParams {
                nu: self.nu,
                ..SvmParams::default()
            },
        )?;

        self.knn = Some(knn);
        self.svm = Some(svm);
        self.calibration = Calibration::default();
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.knn.is_some() && self.svm.is_some()
    }

    /// Feature dimension the detectors were fit on.
    pub fn n_features(&self) -> Option<usize> {
        self.knn.as_ref().map(KnnIndex::n_features)
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn threshold(&self) -> f64 {
        self.calibration.threshold
    }

    /// Score and label `x`. With `learn`, calibrate on `x` first.
    pub fn predict(&mut self, x: &SparseMatrix, learn: bool) -> Result<Vec<Verdict>> {
        if learn {
            self.calibrate(x)
        } else {
            self.classify(x)
        }
    }

    /// Calibration pass: learn `max_pair`, `max_distance`, `svm_score` and the
    /// threshold from `x`, then label it.
    pub fn calibrate(&mut self, x: &SparseMatrix) -> Result<Vec<Verdict>> {
        let (distances, boundary) = self.signals(x)?;
        if distances.len() < 2 {
            return Err(ImpactError::CalibrationDegenerate { rows: distances.len() });
        }

        let (a, b, max_distance) = farthest_pair(&distances);
        let svm_score = boundary.iter().sum::<f64>() / boundary.len() as f64;

        let mut calibration = Calibration {
            max_pair: Some((distances[a].clone(), distances[b].clone())),
            max_distance,
            svm_score,
            threshold: 0.0,
        };
        let scores = score_rows(&distances, &boundary, &calibration);
        calibration.threshold = midpoint_threshold(&scores);

        info!(
            rows = scores.len(),
            max_pair = ?(a, b),
            max_distance = max_distance,
            svm_score = svm_score,
            threshold = calibration.threshold,
            "Ensemble threshold calibrated"
        );

        self.calibration = calibration;
        Ok(label(&scores, self.calibration.threshold))
    }

    /// Read-only pass against the current calibration.
    pub fn classify(&self, x: &SparseMatrix) -> Result<Vec<Verdict>> {
        let scores = self.scores(x)?;
        Ok(label(&scores, self.calibration.threshold))
    }

    /// Raw ensemble scores against the current calibration.
    pub fn scores(&self, x: &SparseMatrix) -> Result<Vec<f64>> {
        let (distances, boundary) = self.signals(x)?;
        Ok(score_rows(&distances, &boundary, &self.calibration))
    }

    fn signals(&self, x: &SparseMatrix) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
        let (Some(knn), Some(svm)) = (&self.knn, &self.svm) else {
            return Err(ImpactError::ModelNotTrained);
        };
        let distances = knn.kneighbors(x)?;
        let boundary = svm.decision_function(x)?;
        Ok((distances, boundary))
    }
}

/// All-pairs farthest pair of points, `i < j` in row-major order; the first
/// pair wins ties, so an all-identical batch yields `(0, 1, 0.0)`.
/// Requires at least two points.
fn farthest_pair(points: &[Vec<f64>]) -> (usize, usize, f64) {
    let mut best = (0, 1, euclidean(&points[0], &points[1]));
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let distance = euclidean(&points[i], &points[j]);
            if distance > best.2 {
                best = (i, j, distance);
            }
        }
    }
    best
}

/// Largest pairwise distance among the row's own vector and the calibration pair.
fn combined_spread(own: &[f64], pair: Option<&(Vec<f64>, Vec<f64>)>) -> f64 {
    match pair {
        None => 0.0,
        Some((a, b)) => euclidean(own, a).max(euclidean(own, b)).max(euclidean(a, b)),
    }
}

fn score_rows(distances: &[Vec<f64>], boundary: &[f64], calibration: &Calibration) -> Vec<f64> {
    distances
        .par_iter()
        .zip(boundary.par_iter())
        .map(|(own, &margin)| {
            let spread = combined_spread(own, calibration.max_pair.as_ref());
            (SCORE_CEILING - (calibration.max_distance - spread).abs()) + margin
        })
        .collect()
}

/// Halfway between the mean and the maximum score. The mean is clamped into
/// the observed range so a batch of identical scores yields that score exactly.
fn midpoint_threshold(scores: &[f64]) -> f64 {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let mean = (scores.iter().sum::<f64>() / scores.len() as f64).clamp(min, max);
    mean + (max - mean) / 2.0
}

fn label(scores: &[f64], threshold: f64) -> Vec<Verdict> {
    scores
        .iter()
        .map(|&score| if score <= threshold { Verdict::Impact } else { Verdict::NotImpact })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::SparseVector;

    fn training_matrix() -> SparseMatrix {
        let rows = (0..16)
            .map(|i| {
                let t = i as f64 * 0.05;
                SparseVector::from_pairs(vec![(0, 1.0 - t), (1, t), (2, (i % 3) as f64 * 0.1)]).l2_normalized()
            })
            .collect();
        SparseMatrix::new(4, rows)
    }

    fn held_out() -> SparseMatrix {
        SparseMatrix::new(
            4,
            vec![
                SparseVector::from_pairs(vec![(0, 0.9), (1, 0.1)]).l2_normalized(),
                SparseVector::from_pairs(vec![(0, 0.5), (1, 0.5)]).l2_normalized(),
                SparseVector::from_pairs(vec![(3, 1.0)]),
                SparseVector::from_pairs(vec![(1, 1.0), (2, 0.2)]).l2_normalized(),
                SparseVector::default(),
            ],
        )
    }

    #[test]
    fn test_predict_before_fit_is_not_trained() {
        let mut ensemble = OutlierEnsemble::new();
        let x = held_out();
        for _ in 0..10 {
            assert!(matches!(ensemble.classify(&x), Err(ImpactError::ModelNotTrained)));
            assert!(matches!(ensemble.predict(&x, true), Err(ImpactError::ModelNotTrained)));
            assert!(matches!(ensemble.predict(&x, false), Err(ImpactError::ModelNotTrained)));
        }
    }

    #[test]
    fn test_fit_on_empty_matrix_fails() {
        let mut ensemble = OutlierEnsemble::new();
        assert!(matches!(
            ensemble.fit(&SparseMatrix::new(4, vec![])),
            Err(ImpactError::InsufficientData { .. })
        ));
        assert!(!ensemble.is_fitted());
    }

    #[test]
    fn test_calibration_needs_two_rows() {
        let mut ensemble = OutlierEnsemble::new();
        ensemble.fit(&training_matrix()).unwrap();
        let single = SparseMatrix::new(4, vec![SparseVector::from_pairs(vec![(0, 1.0)])]);
        assert!(matches!(
            ensemble.predict(&single, true),
            Err(ImpactError::CalibrationDegenerate { rows: 1 })
        ));
    }

    #[test]
    fn test_calibrate_then_classify_agree_with_threshold() {
        let mut ensemble = OutlierEnsemble::new();
        ensemble.fit(&training_matrix()).unwrap();
        let x = held_out();

        let calibrated = ensemble.predict(&x, true).unwrap();
        let classified = ensemble.predict(&x, false).unwrap();
        assert_eq!(calibrated, classified);

        let threshold = ensemble.threshold();
        let scores = ensemble.scores(&x).unwrap();
        for (score, verdict) in scores.iter().zip(&classified) {
            if *score <= threshold {
                assert_eq!(*verdict, Verdict::Impact);
                assert_eq!(verdict.label(), 1);
            } else {
                assert_eq!(*verdict, Verdict::NotImpact);
                assert_eq!(verdict.label(), 0);
            }
        }
        // The max-scoring row is always above the midpoint unless all tie.
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(max >= threshold);
    }

    #[test]
    fn test_identical_rows_calibrate_to_zero_distance() {
        let mut ensemble = OutlierEnsemble::new();
        ensemble.fit(&training_matrix()).unwrap();

        let row = SparseVector::from_pairs(vec![(0, 0.8), (1, 0.6)]);
        let x = SparseMatrix::new(4, vec![row; 4]);
        let verdicts = ensemble.predict(&x, true).unwrap();

        let calibration = ensemble.calibration();
        assert_eq!(calibration.max_distance, 0.0);

        let scores = ensemble.scores(&x).unwrap();
        for score in &scores {
            assert_eq!(*score, scores[0]);
        }
        assert_eq!(calibration.threshold, scores[0]);
        // Score equals threshold, and the boundary is inclusive.
        assert!(verdicts.iter().all(|v| *v == Verdict::Impact));
    }

    #[test]
    fn test_farthest_pair_prefers_first_on_ties() {
        let points = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let (a, b, d) = farthest_pair(&points);
        // (0,3) and (1,2) both have distance sqrt(2); (0,3) comes first.
        assert_eq!((a, b), (0, 3));
        assert!((d - 2f64.sqrt()).abs() < 1e-12);

        let same = vec![vec![0.5, 0.5]; 3];
        assert_eq!(farthest_pair(&same), (0, 1, 0.0));
    }

    #[test]
    fn test_score_formula() {
        let calibration = Calibration {
            max_pair: Some((vec![0.0, 0.0], vec![3.0, 4.0])),
            max_distance: 5.0,
            svm_score: 0.0,
            threshold: 0.0,
        };
        // Own vector far from both ends: spread = max(10, |(-6,-8) - (3,4)|, 5) = 15.
        let scores = score_rows(&[vec![-6.0, -8.0], vec![0.0, 0.0]], &[0.25, -0.5], &calibration);
        assert!((scores[0] - ((10.0 - 10.0) + 0.25)).abs() < 1e-12);
        // Own vector coincides with an end: spread = 5, |5 - 5| = 0.
        assert!((scores[1] - (10.0 - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_midpoint_threshold() {
        assert_eq!(midpoint_threshold(&[1.0, 2.0, 3.0, 6.0]), 3.0 + (6.0 - 3.0) / 2.0);
        assert_eq!(midpoint_threshold(&[0.1; 7]), 0.1);
    }

    #[test]
    fn test_refit_clears_calibration() {
        let mut ensemble = OutlierEnsemble::new();
        ensemble.fit(&training_matrix()).unwrap();
        ensemble.calibrate(&held_out()).unwrap();
        assert!(ensemble.calibration().max_pair.is_some());
        ensemble.fit(&training_matrix()).unwrap();
        assert_eq!(ensemble.calibration(), &Calibration::default());
    }
}
