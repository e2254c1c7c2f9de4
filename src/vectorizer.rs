// =============================================================================
// vectorizer.rs — WORDS TO NUMBERS, EXACTLY ONCE
// =============================================================================
//
// A TF-IDF vectorizer that is fit once on the training keyword bags and
// then frozen. The only way to get one is fit_transform(); transform() takes
// &self. There is no refit. If you want a new vocabulary, train a new
// pipeline.
//
// Weighting follows the usual smooth-idf recipe:
//   idf(t)  = ln((1 + n) / (1 + df(t))) + 1
//   row     = raw term counts * idf, L2-normalized
// Tokens are runs of alphanumeric/underscore characters, two or more long,
// lowercased. Out-of-vocabulary tokens contribute nothing.
// =============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::sparse::{SparseMatrix, SparseVector};

/// A fitted, frozen TF-IDF vectorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    /// Term -> column, columns assigned in lexical term order.
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdfVectorizer {
    /// Learn vocabulary and idf from `documents` and return their matrix.
    pub fn fit_transform<S>(documents: &[S]) -> (Self, SparseMatrix)
    where
        S: AsRef<str> + Sync,
    {
        let tokenized: Vec<Vec<String>> = documents.par_iter().map(|d| tokenize(d.as_ref())).collect();

        let terms: BTreeSet<&str> = tokenized.iter().flatten().map(String::as_str).collect();
        let vocabulary: BTreeMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(column, term)| (term.to_string(), column))
            .collect();

        let mut document_frequency = vec![0usize; vocabulary.len()];
        for tokens in &tokenized {
            let unique: BTreeSet<usize> = tokens.iter().filter_map(|t| vocabulary.get(t).copied()).collect();
            for column in unique {
                document_frequency[column] += 1;
            }
        }

        let n = documents.len() as f64;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let vectorizer = Self { vocabulary, idf };
        let matrix = vectorizer.matrix_from_tokens(&tokenized);

        debug!(
            documents = documents.len(),
            vocabulary = vectorizer.vocabulary.len(),
            "TF-IDF vectorizer fitted"
        );

        (vectorizer, matrix)
    }

    /// Vectorize `documents` with the frozen vocabulary.
    pub fn transform<S>(&self, documents: &[S]) -> SparseMatrix
    where
        S: AsRef<str> + Sync,
    {
        let tokenized: Vec<Vec<String>> = documents.par_iter().map(|d| tokenize(d.as_ref())).collect();
        self.matrix_from_tokens(&tokenized)
    }

    /// Vocabulary size, i.e. the feature dimension.
    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn vocabulary(&self) -> &BTreeMap<String, usize> {
        &self.vocabulary
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.vocabulary.get(term).map(|&column| self.idf[column])
    }

    fn matrix_from_tokens(&self, tokenized: &[Vec<String>]) -> SparseMatrix {
        let rows = tokenized.par_iter().map(|tokens| self.row(tokens)).collect();
        SparseMatrix::new(self.n_features(), rows)
    }

    fn row(&self, tokens: &[String]) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in tokens {
            if let Some(&column) = self.vocabulary.get(token) {
                *counts.entry(column).or_insert(0.0) += 1.0;
            }
        }
        let pairs = counts
            .into_iter()
            .map(|(column, count)| (column, count * self.idf[column]))
            .collect();
        SparseVector::from_pairs(pairs).l2_normalized()
    }
}

/// Lowercased tokens of at least two alphanumeric/underscore characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_single_chars() {
        assert_eq!(tokenize("a Solar-grid x of 2 b"), vec!["solar", "grid", "of"]);
    }

    #[test]
    fn test_vocabulary_is_lexical() {
        let (vectorizer, matrix) = TfIdfVectorizer::fit_transform(&["water health", "climate water"]);
        let columns: Vec<(&str, usize)> = vectorizer.vocabulary().iter().map(|(t, &c)| (t.as_str(), c)).collect();
        assert_eq!(columns, vec![("climate", 0), ("health", 1), ("water", 2)]);
        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.n_features(), 3);
    }

    #[test]
    fn test_smooth_idf() {
        let (vectorizer, _) = TfIdfVectorizer::fit_transform(&["water health", "climate water"]);
        // n = 2; water df = 2, health df = 1
        assert!((vectorizer.idf("water").unwrap() - 1.0).abs() < 1e-12);
        assert!((vectorizer.idf("health").unwrap() - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rows_are_unit_length() {
        let (_, matrix) = TfIdfVectorizer::fit_transform(&["water water health", "climate", ""]);
        assert!((matrix.row(0).squared_norm() - 1.0).abs() < 1e-12);
        assert!((matrix.row(1).squared_norm() - 1.0).abs() < 1e-12);
        assert!(matrix.row(2).is_empty());
    }

    #[test]
    fn test_transform_ignores_unknown_terms() {
        let (vectorizer, fitted) = TfIdfVectorizer::fit_transform(&["water health", "climate water"]);
        let matrix = vectorizer.transform(&["water health unicorn", "unicorn only"]);
        assert_eq!(matrix.n_features(), vectorizer.n_features());
        assert_eq!(matrix.row(0), fitted.row(0));
        assert!(matrix.row(1).is_empty());
    }
}
