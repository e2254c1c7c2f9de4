// =============================================================================
// detector.rs — THE ORCHESTRATOR
// =============================================================================
//
// ImpactDetectorModel owns the whole lifecycle:
//
//   Init ──train()──► Training ──ok──► Trained
//                        │
//                        └──err──► (whatever it was before)
//
// One training cycle:
//   1. pull records, refuse fewer than min_records
//   2. seeded shuffle into train / held-out
//   3. unless forced, try the artifact cache; a hit skips straight to 6
//   4. preprocess the training documents
//   5. fit the TF-IDF vectorizer (once) and the outlier ensemble
//   6. evaluate on the held-out set, which also calibrates the threshold
//   7. persist the artifact if it is new; a failed save is only logged
//
// Prediction never touches the training machinery. It takes an Arc snapshot
// of the last trained pipeline and reads it, so any number of callers can
// predict while a retrain runs in the background. The new pipeline is
// swapped in only when the retrain has fully succeeded.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use portable_atomic::AtomicF64;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactStore, ModelArtifact};
use crate::config::Config;
use crate::ensemble::OutlierEnsemble;
use crate::errors::{ImpactError, Result};
use crate::fallback::FuzzyFallback;
use crate::keywords::KeywordExtractor;
use crate::metrics::DetectorMetrics;
use crate::models::{Record, Status};
use crate::preprocess::{LogProgress, Preprocessor, ProgressSink};
use crate::source::RecordSource;
use crate::split::split_records;
use crate::vectorizer::TfIdfVectorizer;

/// Summary of a completed training cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    /// Run id of the pipeline now in service (the cached one on a cache hit).
    pub run_id: Uuid,
    pub total_records: usize,
    pub train_records: usize,
    pub test_records: usize,
    /// Share of held-out records labelled impact.
    pub accuracy: f64,
    pub from_cache: bool,
    pub threshold: f64,
}

/// What a call to [`ImpactDetectorModel::train`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    Trained(TrainReport),
    /// Another training cycle was already running; nothing happened.
    AlreadyTraining,
}

impl TrainOutcome {
    pub fn report(&self) -> Option<&TrainReport> {
        match self {
            TrainOutcome::Trained(report) => Some(report),
            TrainOutcome::AlreadyTraining => None,
        }
    }
}

/// Puts the status back to what it was unless `finish` is called.
struct StatusGuard<'a> {
    status: &'a RwLock<Status>,
    previous: Status,
}

impl StatusGuard<'_> {
    fn finish(self, next: Status) {
        *self.status.write() = next;
        std::mem::forget(self);
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        *self.status.write() = self.previous;
    }
}

/// Impact-job classifier: keyword bags, TF-IDF, outlier ensemble, fuzzy
/// fallback.
pub struct ImpactDetectorModel {
    config: Config,
    source: Box<dyn RecordSource>,
    store: Box<dyn ArtifactStore>,
    extractor: Arc<KeywordExtractor>,
    preprocessor: Preprocessor,
    fallback: FuzzyFallback,
    status: RwLock<Status>,
    pipeline: RwLock<Option<Arc<ModelArtifact>>>,
    accuracy: AtomicF64,
    rng: Mutex<ChaCha8Rng>,
    metrics: Arc<DetectorMetrics>,
}

impl ImpactDetectorModel {
    pub fn new<S, A>(config: Config, source: S, store: A) -> Self
    where
        S: RecordSource + 'static,
        A: ArtifactStore + 'static,
    {
        let extractor = Arc::new(KeywordExtractor::new());
        let preprocessor = Preprocessor::new(
            config.model_name.clone(),
            Arc::clone(&extractor),
            config.progress_interval,
            Arc::new(LogProgress),
        );
        let fallback = FuzzyFallback::new(Arc::clone(&extractor), config.fuzzy_threshold);
        let rng = match config.split_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            config,
            source: Box::new(source),
            store: Box::new(store),
            extractor,
            preprocessor,
            fallback,
            status: RwLock::new(Status::Init),
            pipeline: RwLock::new(None),
            accuracy: AtomicF64::new(0.0),
            rng: Mutex::new(rng),
            metrics: Arc::new(DetectorMetrics::new()),
        }
    }

    /// Fix the train/test shuffle seed.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Route preprocessing progress somewhere other than the log.
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.preprocessor = Preprocessor::new(
            self.config.model_name.clone(),
            Arc::clone(&self.extractor),
            self.config.progress_interval,
            sink,
        );
        self
    }

    pub fn status(&self) -> Status {
        *self.status.read()
    }

    /// Held-out accuracy of the last successful training cycle.
    pub fn accuracy(&self) -> f64 {
        self.accuracy.load(portable_atomic::Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.config.model_name
    }

    pub fn model_name(&self) -> String {
        self.config.model_file_name()
    }

    pub fn vectorizer_name(&self) -> String {
        self.config.vectorizer_file_name()
    }

    pub fn metrics(&self) -> &Arc<DetectorMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one training cycle. `force` skips the artifact cache.
    ///
    /// On error the status reverts to what it was before the call and any
    /// previously trained pipeline keeps serving.
    pub fn train(&self, force: bool) -> Result<TrainOutcome> {
        let previous = {
            let mut status = self.status.write();
            if *status == Status::Training {
                info!(name = self.name(), "Training already in progress; ignoring request");
                return Ok(TrainOutcome::AlreadyTraining);
            }
            std::mem::replace(&mut *status, Status::Training)
        };
        // Restores `previous` on any early exit, unwinding included.
        let guard = StatusGuard {
            status: &self.status,
            previous,
        };
        self.metrics.increment_training_runs();

        match self.run_training(force) {
            Ok((artifact, report)) => {
                *self.pipeline.write() = Some(Arc::new(artifact));
                self.accuracy.store(report.accuracy, portable_atomic::Ordering::Relaxed);
                self.metrics.record_accuracy(report.accuracy);
                guard.finish(Status::Trained);
                info!(
                    name = self.name(),
                    run_id = %report.run_id,
                    accuracy = report.accuracy,
                    from_cache = report.from_cache,
                    "Training done"
                );
                Ok(TrainOutcome::Trained(report))
            }
            Err(err) => {
                drop(guard);
                self.metrics.increment_failed_trainings();
                warn!(name = self.name(), error = %err, status = %previous, "Training failed; status restored");
                Err(err)
            }
        }
    }

    fn run_training(&self, force: bool) -> Result<(ModelArtifact, TrainReport)> {
        let records = self.source.load()?;
        let total = records.len();
        if total < self.config.min_records {
            return Err(ImpactError::InsufficientData {
                found: total,
                required: self.config.min_records,
            });
        }

        let split = split_records(records, self.config.test_percent, &mut *self.rng.lock());
        info!(
            name = self.name(),
            total = total,
            train = split.train.len(),
            test = split.test.len(),
            "Fetched records"
        );

        if !force {
            match self.store.load() {
                Ok(mut artifact) => {
                    self.metrics.increment_cache_hits();
                    info!(name = self.name(), run_id = %artifact.run_id, "Using cached artifact");
                    let accuracy = self.evaluate(&mut artifact, &split.test)?;
                    let report = TrainReport {
                        run_id: artifact.run_id,
                        total_records: total,
                        train_records: split.train.len(),
                        test_records: split.test.len(),
                        accuracy,
                        from_cache: true,
                        threshold: artifact.ensemble.threshold(),
                    };
                    return Ok((artifact, report));
                }
                Err(err) => {
                    self.metrics.increment_cache_misses();
                    info!(name = self.name(), kind = err.kind(), reason = %err, "No usable cached artifact");
                }
            }
        }

        info!(name = self.name(), documents = split.train.len(), "Train start processing texts");
        let documents: Vec<String> = split.train.iter().map(Record::document).collect();
        let processed = self.preprocessor.preprocess_batch(&documents)?;
        self.metrics.add_documents_preprocessed(processed.len());

        info!(name = self.name(), "Start training");
        let (vectorizer, matrix) = TfIdfVectorizer::fit_transform(&processed);
        let mut ensemble = OutlierEnsemble::with_nu(self.config.svm_nu);
        ensemble.fit(&matrix)?;

        let mut artifact = ModelArtifact {
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            ensemble,
            vectorizer,
        };
        let accuracy = self.evaluate(&mut artifact, &split.test)?;

        if let Err(err) = self.store.save(&artifact) {
            warn!(name = self.name(), error = %err, "Failed to persist artifact; continuing with the in-memory model");
        }

        let report = TrainReport {
            run_id: artifact.run_id,
            total_records: total,
            train_records: split.train.len(),
            test_records: split.test.len(),
            accuracy,
            from_cache: false,
            threshold: artifact.ensemble.threshold(),
        };
        Ok((artifact, report))
    }

    /// Calibrate on the held-out records and return the share labelled impact.
    fn evaluate(&self, artifact: &mut ModelArtifact, test: &[Record]) -> Result<f64> {
        let documents: Vec<String> = test.iter().map(Record::document).collect();
        let processed = self.preprocessor.preprocess_batch(&documents)?;
        self.metrics.add_documents_preprocessed(processed.len());

        let matrix = artifact.vectorizer.transform(&processed);
        let verdicts = artifact.ensemble.predict(&matrix, true)?;

        let impact = verdicts.iter().filter(|v| v.is_impact()).count();
        let accuracy = impact as f64 / verdicts.len() as f64;
        info!(
            name = self.name(),
            accuracy = accuracy,
            threshold = artifact.ensemble.threshold(),
            "Held-out accuracy"
        );
        Ok(accuracy)
    }

    /// Classify `queries`. Output `i` belongs to query `i`.
    pub fn predict(&self, queries: &[Record]) -> Result<Vec<bool>> {
        let pipeline = self.pipeline.read().clone().ok_or(ImpactError::ModelNotTrained)?;

        let documents: Vec<String> = queries.iter().map(Record::document).collect();
        let processed = self.preprocessor.preprocess_batch(&documents)?;
        self.metrics.add_documents_preprocessed(processed.len());

        let matrix = pipeline.vectorizer.transform(&processed);
        let verdicts = pipeline.ensemble.classify(&matrix)?;

        let results = documents
            .par_iter()
            .zip(verdicts.par_iter())
            .enumerate()
            .map(|(index, (document, verdict))| -> Result<bool> {
                let fuzzy = self.fallback.matches(index, document)?;
                if fuzzy && !verdict.is_impact() {
                    self.metrics.increment_fallback_overrides();
                    debug!(name = self.name(), index = index, "Fuzzy fallback overrode ensemble verdict");
                }
                Ok(fuzzy || verdict.is_impact())
            })
            .collect::<Result<Vec<bool>>>()?;

        self.metrics.add_predictions_served(results.len());
        Ok(results)
    }

    /// Classify a single record.
    pub fn predict_one(&self, record: &Record) -> Result<bool> {
        let verdicts = self.predict(std::slice::from_ref(record))?;
        Ok(verdicts[0])
    }
}
