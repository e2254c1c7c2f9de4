// =============================================================================
// errors.rs — EVERYTHING THAT CAN GO WRONG, ENUMERATED
// =============================================================================
//
// One error type for the whole pipeline. Data problems, "you forgot to
// train" problems, and "the held-out set has one row in it" problems all
// land here and propagate to the caller.
//
// Artifact loading has its own error type in artifact.rs. Those never
// escape: a broken cache just means we train from scratch.
// =============================================================================

use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = ImpactError> = std::result::Result<T, E>;

/// Errors surfaced by the impact detection pipeline.
#[derive(Debug, Error)]
pub enum ImpactError {
    /// The data source supplied fewer records than training needs.
    #[error("insufficient data: {found} records available, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    /// Prediction was requested before any model was fitted.
    #[error("model not trained")]
    ModelNotTrained,

    /// The fuzzy fallback could not extract a single keyword from a query.
    #[error("no keywords could be extracted from query {index}")]
    EmptyKeywordSet { index: usize },

    /// Threshold calibration needs at least two rows to find a farthest pair.
    #[error("calibration needs at least 2 rows, got {rows}")]
    CalibrationDegenerate { rows: usize },

    /// A feature matrix does not match the dimension the models were fit on.
    #[error("feature dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A record field failed validation at ingestion.
    #[error("invalid record field '{field}': {reason}")]
    Schema { field: String, reason: String },

    /// One document in a preprocessing batch failed; the batch is discarded.
    #[error("preprocessing failed for document {index}: {reason}")]
    Preprocess { index: usize, reason: String },

    /// A parameter is outside its valid range.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The record source could not produce records.
    #[error("data source failure: {0}")]
    DataSource(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
