// ═══════════════════════════════════════════════════════════════
// METRICS COLLECTOR - Because if you can't measure it, it didn't happen
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters for every stage of the detector. Lock-free, so the rayon
// workers and concurrent predict() callers never queue up behind a counter.
// The runner prints a snapshot as JSON on the way out.
//
// What we count:
// - training runs started, failed, and served from the artifact cache
// - documents that went through the preprocessor
// - predictions served, and how many the fuzzy fallback flipped to "impact"
// - the last held-out accuracy (an AtomicF64, courtesy of portable-atomic)

use portable_atomic::AtomicF64;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// The metrics snapshot - what gets serialized to JSON
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub training_runs: u64,
    pub failed_trainings: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub documents_preprocessed: u64,
    pub predictions_served: u64,
    pub fallback_overrides: u64,
    pub last_accuracy: f64,
    pub uptime_seconds: u64,
}

/// Thread-safe atomic metrics for one detector instance
pub struct DetectorMetrics {
    training_runs: AtomicU64,
    failed_trainings: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    documents_preprocessed: AtomicU64,
    predictions_served: AtomicU64,
    fallback_overrides: AtomicU64,
    last_accuracy: AtomicF64,
    start_time: Instant,
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    pub fn new() -> Self {
        Self {
            training_runs: AtomicU64::new(0),
            failed_trainings: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            documents_preprocessed: AtomicU64::new(0),
            predictions_served: AtomicU64::new(0),
            fallback_overrides: AtomicU64::new(0),
            last_accuracy: AtomicF64::new(0.0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_training_runs(&self) {
        self.training_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed_trainings(&self) {
        self.failed_trainings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_documents_preprocessed(&self, count: usize) {
        self.documents_preprocessed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_predictions_served(&self, count: usize) {
        self.predictions_served.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn increment_fallback_overrides(&self) {
        self.fallback_overrides.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accuracy(&self, accuracy: f64) {
        self.last_accuracy.store(accuracy, portable_atomic::Ordering::Relaxed);
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            training_runs: self.training_runs.load(Ordering::Relaxed),
            failed_trainings: self.failed_trainings.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            documents_preprocessed: self.documents_preprocessed.load(Ordering::Relaxed),
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            fallback_overrides: self.fallback_overrides.load(Ordering::Relaxed),
            last_accuracy: self.last_accuracy.load(portable_atomic::Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}
