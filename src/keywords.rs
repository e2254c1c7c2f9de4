//! Statistical keyword extraction using YAKE.
//!
//! Used twice: to compress documents into keyword bags before
//! vectorization, and to pull candidate phrases out of raw query text for
//! the fuzzy taxonomy fallback.

use std::collections::HashSet;
use yake_rust::{get_n_best, Config, StopWords};

/// Maximum number of keywords kept per document.
pub const MAX_KEYWORDS: usize = 50;
/// Longest phrase, in words.
pub const MAX_NGRAM: usize = 3;
/// Candidates at least this similar to a better-ranked one are dropped.
pub const DEDUP_THRESHOLD: f64 = 0.9;

/// Configuration for keyword extraction.
#[derive(Debug, Clone)]
pub struct KeywordConfig {
    pub max_keywords: usize,
    pub ngrams: usize,
    pub dedup_threshold: f64,
    /// Shortest candidate, in characters.
    pub min_length: usize,
    /// Stopword language.
    pub language: String,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            max_keywords: MAX_KEYWORDS,
            ngrams: MAX_NGRAM,
            dedup_threshold: DEDUP_THRESHOLD,
            min_length: 3,
            language: "en".to_string(),
        }
    }
}

/// A ranked keyword phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// Lowercased phrase of one to three words.
    pub text: String,
    /// YAKE score; lower is more relevant.
    pub score: f64,
}

/// YAKE keyword extractor.
///
/// Built once per pipeline and shared behind an `Arc`; extraction takes
/// `&self` so rayon workers can use it concurrently.
pub struct KeywordExtractor {
    config: KeywordConfig,
    stopwords: StopWords,
    yake: Config,
}

impl KeywordExtractor {
    pub fn new() -> Self {
        Self::with_config(KeywordConfig::default())
    }

    pub fn with_config(config: KeywordConfig) -> Self {
        let stopwords = StopWords::predefined(&config.language)
            .or_else(|| StopWords::predefined("en"))
            .unwrap_or_else(|| StopWords::custom(HashSet::new()));

        let punctuation: HashSet<char> = [
            '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', ':', ';',
            '<', '=', '>', '?', '@', '[', '\\', ']', '^', '_', '`', '{', '|', '}', '~',
        ]
        .into_iter()
        .collect();

        let yake = Config {
            ngrams: config.ngrams,
            punctuation,
            remove_duplicates: true,
            deduplication_threshold: config.dedup_threshold,
            minimum_chars: config.min_length,
            ..Config::default()
        };

        Self { config, stopwords, yake }
    }

    pub fn config(&self) -> &KeywordConfig {
        &self.config
    }

    /// Extract up to `max_keywords` phrases, best first.
    pub fn extract(&self, text: &str) -> Vec<Keyword> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut keywords: Vec<Keyword> = get_n_best(self.config.max_keywords, text, &self.stopwords, &self.yake)
            .into_iter()
            .map(|item| Keyword {
                text: item.keyword.to_lowercase(),
                score: item.score,
            })
            .filter(|k| !k.text.trim().is_empty())
            .collect();

        keywords.sort_by(|a, b| a.score.total_cmp(&b.score));
        keywords.truncate(self.config.max_keywords);
        keywords
    }

    /// Phrases only, best first.
    pub fn extract_texts(&self, text: &str) -> Vec<String> {
        self.extract(text).into_iter().map(|k| k.text).collect()
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}
