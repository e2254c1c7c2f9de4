//! Impact-job classification.
//!
//! Job postings are flattened to text, compressed into YAKE keyword bags,
//! vectorized with TF-IDF and scored by an outlier ensemble (KNN distance
//! geometry plus a one-class SVM) whose threshold is calibrated on held-out
//! postings. At query time a fuzzy match against a fixed taxonomy of impact
//! phrases can force a positive verdict.
//!
//! [`ImpactDetectorModel`] is the entry point.

pub mod artifact;
pub mod config;
pub mod detector;
pub mod ensemble;
pub mod errors;
pub mod fallback;
pub mod keywords;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod source;
pub mod sparse;
pub mod split;
pub mod text;
pub mod vectorizer;

pub use artifact::{ArtifactLoadError, ArtifactStore, FileArtifactStore, ModelArtifact};
pub use config::Config;
pub use detector::{ImpactDetectorModel, TrainOutcome, TrainReport};
pub use ensemble::OutlierEnsemble;
pub use errors::{ImpactError, Result};
pub use fallback::{FuzzyFallback, IMPACT_KEYWORDS};
pub use keywords::{Keyword, KeywordExtractor};
pub use metrics::{DetectorMetrics, MetricsSnapshot};
pub use models::{FieldValue, Record, Status, Verdict};
pub use preprocess::{LogProgress, Preprocessor, ProgressEvent, ProgressSink};
pub use source::{JsonRecordSource, RecordSource};
pub use text::normalize;
pub use vectorizer::TfIdfVectorizer;
