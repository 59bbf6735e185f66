//! TF-IDF vector space over word n-grams.
//!
//! Two-phase: [`TfIdfVectorizer::train`] builds the vocabulary and inverse
//! document frequencies from a corpus, then [`TfIdfVectorizer::score`] compares
//! two texts by cosine similarity. Scoring an untrained model returns 0.0.
//!
//! A trained model can be saved as JSON and loaded again for reuse.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("static regex"));

/// Longest word n-gram in the vocabulary.
const MAX_NGRAM: usize = 3;

/// Terms in more than this share of documents carry no signal.
const MAX_DOCUMENT_FREQUENCY: f64 = 0.9;

type SparseVector = HashMap<usize, f64>;

/// Saved model errors.
#[derive(Error, Debug)]
pub enum VectorizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("inconsistent model: {0}")]
    Inconsistent(String),
}

pub type VectorizerResult<T> = Result<T, VectorizerError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the model from `corpus`, replacing any previous one.
    ///
    /// Training is deterministic, so repeating it on the same corpus is a no-op
    /// in effect. A corpus that leaves no usable terms leaves the model untrained.
    pub fn train<S: AsRef<str>>(&mut self, corpus: &[S]) {
        self.vocabulary.clear();
        self.idf.clear();

        let documents: Vec<Vec<String>> = corpus.iter().map(|doc| ngrams(doc.as_ref())).collect();
        let n_docs = documents.len();
        if n_docs == 0 {
            return;
        }

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for terms in &documents {
            let mut seen: Vec<&str> = terms.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let max_count = MAX_DOCUMENT_FREQUENCY * n_docs as f64;
        let mut kept: Vec<(&str, usize)> = document_frequency
            .into_iter()
            .filter(|(_, df)| (*df as f64) <= max_count)
            .collect();
        kept.sort_unstable_by(|a, b| a.0.cmp(b.0));

        for (index, (term, df)) in kept.into_iter().enumerate() {
            self.vocabulary.insert(term.to_string(), index);
            self.idf
                .push(((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0);
        }
    }

    pub fn is_trained(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn to_json(&self) -> VectorizerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a saved model, rejecting one whose term indices do not line up
    /// with its idf table.
    pub fn from_json(json: &str) -> VectorizerResult<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.check()?;
        Ok(model)
    }

    /// Save the trained model to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> VectorizerResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a model written by [`Self::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> VectorizerResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    fn check(&self) -> VectorizerResult<()> {
        if self.vocabulary.len() != self.idf.len() {
            return Err(VectorizerError::Inconsistent(format!(
                "{} terms but {} idf weights",
                self.vocabulary.len(),
                self.idf.len()
            )));
        }
        if let Some((term, index)) = self
            .vocabulary
            .iter()
            .find(|(_, index)| **index >= self.idf.len())
        {
            return Err(VectorizerError::Inconsistent(format!(
                "term {term:?} has index {index}"
            )));
        }
        Ok(())
    }

    /// Cosine similarity of two texts in [0, 1].
    ///
    /// Untrained models and texts sharing no vocabulary terms score 0.0.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        if !self.is_trained() {
            return 0.0;
        }

        let (left, right) = (self.transform(a), self.transform(b));
        let (small, large) = if left.len() <= right.len() {
            (&left, &right)
        } else {
            (&right, &left)
        };

        let dot: f64 = small
            .iter()
            .filter_map(|(index, weight)| large.get(index).map(|other| weight * other))
            .sum();

        dot.clamp(0.0, 1.0)
    }

    /// L2-normalized TF-IDF vector of `text`.
    fn transform(&self, text: &str) -> SparseVector {
        let mut vector = SparseVector::new();
        for term in ngrams(text) {
            if let Some(&index) = self.vocabulary.get(&term) {
                *vector.entry(index).or_insert(0.0) += self.idf[index];
            }
        }

        let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for weight in vector.values_mut() {
                *weight /= norm;
            }
        }
        vector
    }
}

/// Lowercased word 1- to 3-grams.
fn ngrams(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = TOKEN.find_iter(&lowered).map(|m| m.as_str()).collect();

    let mut grams = Vec::new();
    for n in 1..=MAX_NGRAM {
        for window in tokens.windows(n) {
            grams.push(window.join(" "));
        }
    }
    grams
}
