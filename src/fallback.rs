// =============================================================================
// fallback.rs — WHEN THE GEOMETRY GETS IT WRONG
// =============================================================================
//
// The ensemble only knows what the training set looked like. A posting that
// literally says "disaster relief" but is phrased unlike anything we trained
// on can still land on the wrong side of the threshold. So at inference time
// we pull keywords out of the raw text and compare each one against a fixed
// taxonomy of impact phrases. Close enough to any of them and the verdict is
// forced to "impact", whatever the ensemble said.
//
// Similarity is the Indel ratio on lowercased strings:
//
//   2 * lcs(a, b) / (len(a) + len(b))
//
// rounded to a whole percent. Unlike plain edit distance it does not punish a
// keyword for being a fragment of a longer phrase, so "health" still clears
// 0.5 against "public health".
// =============================================================================

use std::sync::Arc;

use crate::errors::{ImpactError, Result};
use crate::keywords::KeywordExtractor;

/// Canonical impact phrases. Order is fixed; "social impact" appears twice.
pub static IMPACT_KEYWORDS: &[&str] = &[
    "sustainability",
    "sustainable development",
    "environmental protection",
    "green energy",
    "social impact",
    "community development",
    "social justice",
    "equity and inclusion",
    "human rights",
    "economic development",
    "poverty alleviation",
    "economic empowerment",
    "microfinance",
    "fair trade",
    "health and well-being",
    "public health",
    "mental health support",
    "healthcare access",
    "wellness programs",
    "education and literacy",
    "educational outreach",
    "literacy programs",
    "STEM education",
    "lifelong learning",
    "humanitarian aid",
    "disaster relief",
    "refugee support",
    "crisis intervention",
    "food security",
    "innovation and technology",
    "social innovation",
    "tech for good",
    "digital inclusion",
    "smart cities",
    "governance and policy",
    "advocacy and policy",
    "social impact",
];

/// Keyword-to-taxonomy similarity check.
#[derive(Clone)]
pub struct FuzzyFallback {
    extractor: Arc<KeywordExtractor>,
    taxonomy: Vec<String>,
    threshold: f64,
}

impl FuzzyFallback {
    pub fn new(extractor: Arc<KeywordExtractor>, threshold: f64) -> Self {
        Self {
            extractor,
            taxonomy: IMPACT_KEYWORDS.iter().map(|phrase| phrase.to_lowercase()).collect(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Highest similarity of any keyword in `text` to any taxonomy phrase.
    /// `index` only labels the error when nothing could be extracted.
    pub fn best_ratio(&self, index: usize, text: &str) -> Result<f64> {
        let keywords = self.extractor.extract_texts(text);
        if keywords.is_empty() {
            return Err(ImpactError::EmptyKeywordSet { index });
        }

        Ok(keywords
            .iter()
            .map(|keyword| self.keyword_ratio(&keyword.to_lowercase()))
            .fold(0.0, f64::max))
    }

    /// True when the best ratio strictly exceeds the threshold.
    pub fn matches(&self, index: usize, text: &str) -> Result<bool> {
        Ok(self.best_ratio(index, text)? > self.threshold)
    }

    fn keyword_ratio(&self, keyword: &str) -> f64 {
        self.taxonomy
            .iter()
            .map(|phrase| indel_ratio(keyword, phrase))
            .fold(0.0, f64::max)
    }
}

/// `2 * lcs / (len_a + len_b)` over chars, rounded to two decimals.
/// Two empty strings are identical.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let ratio = 2.0 * longest_common_subsequence(&a, &b) as f64 / total as f64;
    (ratio * 100.0).round_ties_even() / 100.0
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
