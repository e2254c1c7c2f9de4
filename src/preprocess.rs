// =============================================================================
// preprocess.rs — THE FAN-OUT
// =============================================================================
//
// Turning a job posting into a keyword bag is embarrassingly parallel:
// normalize, run YAKE, split the phrases into words, dedupe, join. So every
// document goes to rayon's work-stealing pool and comes back in the order it
// went in. par_iter + collect preserves input order no matter which worker
// finishes first, and collecting into a Result means one bad document sinks
// the whole batch instead of silently vanishing from it.
//
// A coarse progress ticker rides along. It reports at most once per
// interval and only when the percentage moved forward. Workers finish out of
// order, so "forward" is not a given.
// =============================================================================

use parking_lot::Mutex;
use portable_atomic::AtomicF64;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::errors::{ImpactError, Result};
use crate::keywords::KeywordExtractor;
use crate::text::normalize;

/// A coarse progress notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub label: String,
    pub percent: f64,
}

/// Receives preprocessing progress. Purely observational.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, label: &str, percent: f64);
}

/// Logs progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn notify(&self, label: &str, percent: f64) {
        info!(label = label, percent = %format!("{:.2}", percent), "Text processing progress");
    }
}

/// Forwards progress into a crossbeam channel. A disconnected receiver is
/// ignored; progress must never fail a batch.
impl ProgressSink for crossbeam_channel::Sender<ProgressEvent> {
    fn notify(&self, label: &str, percent: f64) {
        let _ = self.try_send(ProgressEvent {
            label: label.to_string(),
            percent,
        });
    }
}

/// Per-batch progress bookkeeping shared by all workers.
struct ProgressTicker<'a> {
    label: &'a str,
    total: usize,
    interval: Duration,
    started: Instant,
    /// Nanoseconds since `started` at the last notification.
    last_tick: AtomicU64,
    last_percent: AtomicF64,
    lock: Mutex<()>,
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressTicker<'a> {
    fn new(label: &'a str, total: usize, interval: Duration, sink: &'a dyn ProgressSink) -> Self {
        Self {
            label,
            total,
            interval,
            started: Instant::now(),
            last_tick: AtomicU64::new(0),
            last_percent: AtomicF64::new(0.0),
            lock: Mutex::new(()),
            sink,
        }
    }

    fn tick(&self, index: usize) {
        let percent = ((index + 1) as f64 * 100.0) / self.total as f64;
        if !self.due(percent) {
            return;
        }
        // Whoever holds the lock is already reporting; everyone else moves on.
        let Some(_guard) = self.lock.try_lock() else {
            return;
        };
        if !self.due(percent) {
            return;
        }
        self.last_tick.store(self.elapsed_nanos(), Ordering::Relaxed);
        self.last_percent.store(percent, portable_atomic::Ordering::Relaxed);
        self.sink.notify(self.label, percent);
    }

    fn due(&self, percent: f64) -> bool {
        let since_last = self.elapsed_nanos().saturating_sub(self.last_tick.load(Ordering::Relaxed));
        since_last > self.interval.as_nanos() as u64
            && self.last_percent.load(portable_atomic::Ordering::Relaxed) < percent
    }

    fn elapsed_nanos(&self) -> u64 {
        self.started.elapsed().as_nanos() as u64
    }
}

/// Stateless, order-preserving batch transform from documents to keyword bags.
#[derive(Clone)]
pub struct Preprocessor {
    label: String,
    extractor: Arc<KeywordExtractor>,
    progress_interval: Duration,
    sink: Arc<dyn ProgressSink>,
}

impl Preprocessor {
    pub fn new(
        label: impl Into<String>,
        extractor: Arc<KeywordExtractor>,
        progress_interval: Duration,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            label: label.into(),
            extractor,
            progress_interval,
            sink,
        }
    }

    /// Keyword bag for one document: normalized, YAKE-extracted, split into
    /// words, deduplicated in first-seen order, space-joined.
    pub fn preprocess_document(&self, text: &str) -> String {
        let cleaned = normalize(text);
        let phrases = self.extractor.extract_texts(&cleaned);

        let mut seen = HashSet::new();
        let mut words = Vec::new();
        for word in phrases.iter().flat_map(|phrase| phrase.split_whitespace()) {
            if seen.insert(word) {
                words.push(word);
            }
        }
        words.join(" ")
    }

    /// Preprocess a batch in parallel. Output `i` belongs to input `i`.
    pub fn preprocess_batch<S>(&self, documents: &[S]) -> Result<Vec<String>>
    where
        S: AsRef<str> + Sync,
    {
        self.preprocess_with(documents, |text| Ok(self.preprocess_document(text)))
    }

    /// Run an arbitrary per-document step with the same fan-out, ordering,
    /// progress and all-or-nothing guarantees as [`Self::preprocess_batch`].
    pub fn preprocess_with<S, F>(&self, documents: &[S], step: F) -> Result<Vec<String>>
    where
        S: AsRef<str> + Sync,
        F: Fn(&str) -> Result<String> + Sync,
    {
        let started = Instant::now();
        let ticker = ProgressTicker::new(&self.label, documents.len(), self.progress_interval, self.sink.as_ref());

        let processed = documents
            .par_iter()
            .enumerate()
            .map(|(index, document)| -> Result<String> {
                let output = step(document.as_ref()).map_err(|err| match err {
                    ImpactError::Preprocess { .. } => err,
                    other => ImpactError::Preprocess {
                        index,
                        reason: other.to_string(),
                    },
                })?;
                ticker.tick(index);
                Ok(output)
            })
            .collect::<Result<Vec<String>>>()?;

        debug!(
            label = self.label.as_str(),
            documents = processed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Preprocessing batch complete"
        );

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor(interval: Duration, sink: Arc<dyn ProgressSink>) -> Preprocessor {
        Preprocessor::new("test", Arc::new(KeywordExtractor::new()), interval, sink)
    }

    /// A letters-only token unique to document `i`. YAKE discards tokens
    /// that mix digits and letters.
    fn marker(i: usize) -> String {
        let hi = (b'a' + (i / 26) as u8) as char;
        let lo = (b'a' + (i % 26) as u8) as char;
        format!("zq{hi}{lo}")
    }

    #[test]
    fn test_batch_preserves_length_and_order() {
        let pre = preprocessor(Duration::from_secs(600), Arc::new(LogProgress));
        let documents: Vec<String> = (0..200)
            .map(|i| format!("{} coordinates volunteer programs for watershed restoration.", marker(i)))
            .collect();

        let output = pre.preprocess_batch(&documents).unwrap();

        assert_eq!(output.len(), documents.len());
        for (i, bag) in output.iter().enumerate() {
            let marker = marker(i);
            assert!(
                bag.split_whitespace().any(|w| w == marker),
                "document {i} lost its marker: {bag:?}"
            );
        }
    }

    #[test]
    fn test_document_words_are_deduplicated() {
        let pre = preprocessor(Duration::from_secs(600), Arc::new(LogProgress));
        let bag = pre.preprocess_document(
            "<p>Community health workers</p> support community health clinics. Community health matters!",
        );
        let words: Vec<&str> = bag.split_whitespace().collect();
        let unique: HashSet<&str> = words.iter().copied().collect();
        assert_eq!(words.len(), unique.len(), "duplicate words in {bag:?}");
        assert!(words.contains(&"health"));
        assert!(!bag.contains('<'));
    }

    #[test]
    fn test_empty_batch() {
        let pre = preprocessor(Duration::from_secs(600), Arc::new(LogProgress));
        let output = pre.preprocess_batch::<String>(&[]).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_one_failure_aborts_the_batch() {
        let pre = preprocessor(Duration::from_secs(600), Arc::new(LogProgress));
        let documents: Vec<String> = (0..50).map(|i| format!("doc {i}")).collect();

        let result = pre.preprocess_with(&documents, |text| {
            if text == "doc 17" {
                Err(ImpactError::DataSource("boom".to_string()))
            } else {
                Ok(text.to_uppercase())
            }
        });

        match result {
            Err(ImpactError::Preprocess { index, reason }) => {
                assert_eq!(index, 17);
                assert!(reason.contains("boom"));
            }
            other => panic!("expected a preprocessing failure, got {other:?}"),
        }
    }

    #[test]
    fn test_no_progress_before_interval() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let pre = preprocessor(Duration::from_secs(3600), Arc::new(tx));
        let documents: Vec<String> = (0..20).map(|i| format!("document number {i}")).collect();

        pre.preprocess_with(&documents, |text| Ok(text.to_string())).unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_progress_only_moves_forward() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let pre = preprocessor(Duration::ZERO, Arc::new(tx));
        let documents: Vec<String> = (0..100).map(|i| format!("document number {i}")).collect();

        let output = pre
            .preprocess_with(&documents, |text| {
                std::thread::sleep(Duration::from_micros(50));
                Ok(text.to_string())
            })
            .unwrap();
        assert_eq!(output, documents);

        let events: Vec<ProgressEvent> = rx.try_iter().collect();
        assert!(!events.is_empty());
        assert!(events.len() <= documents.len());
        for pair in events.windows(2) {
            assert!(pair[0].percent < pair[1].percent, "{events:?}");
        }
        for event in &events {
            assert_eq!(event.label, "test");
            assert!(event.percent > 0.0 && event.percent <= 100.0);
        }
    }
}
