//! Generic name matching.
//!
//! Blends three signals: ingredient decomposition (semantic), character-level
//! fuzzy ratio, and TF-IDF cosine over ingredient n-grams.

use std::borrow::Cow;
use std::collections::HashMap;

use indexmap::IndexSet;

use crate::models::{GenericMethod, GenericScore};

use super::combination::{ingredient_overlap, CombinationDecomposer};
use super::similarity::fuzzy_ratio;
use super::vectorizer::TfIdfVectorizer;

const SEMANTIC_WEIGHT: f64 = 0.5;
const FUZZY_WEIGHT: f64 = 0.3;
const VECTOR_WEIGHT: f64 = 0.2;

/// A technique "dominates" when it scores above this.
const DOMINANT_SCORE: f64 = 0.8;

/// A generic name decomposed once and reused for every comparison.
#[derive(Debug, Clone)]
struct PreparedName {
    normalized: String,
    ingredients: IndexSet<String>,
}

#[derive(Default)]
pub struct GenericNameMatcher {
    decomposer: CombinationDecomposer,
    vectorizer: TfIdfVectorizer,
    /// Candidate-side names seen in training, keyed by trimmed text
    prepared: HashMap<String, PreparedName>,
}

impl GenericNameMatcher {
    /// Create an untrained matcher. Vector scores are 0.0 until [`Self::train`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Train the vector space on the ingredients of the candidate-side names.
    ///
    /// Each distinct candidate name is normalized and decomposed here, once per
    /// run, instead of on every comparison.
    pub fn train<'a, I>(&mut self, generic_names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.prepared.clear();
        let mut corpus: IndexSet<String> = IndexSet::new();
        for name in generic_names {
            let key = name.trim();
            if key.is_empty() || self.prepared.contains_key(key) {
                continue;
            }
            let prepared = self.prepare(key);
            corpus.extend(prepared.ingredients.iter().cloned());
            self.prepared.insert(key.to_string(), prepared);
        }

        let corpus: Vec<String> = corpus.into_iter().collect();
        self.vectorizer.train(&corpus);
        tracing::debug!(
            names = self.prepared.len(),
            documents = corpus.len(),
            terms = self.vectorizer.vocabulary_len(),
            "trained generic name vector space"
        );
    }

    pub fn is_trained(&self) -> bool {
        self.vectorizer.is_trained()
    }

    pub fn decomposer(&self) -> &CombinationDecomposer {
        &self.decomposer
    }

    /// Distinct candidate names decomposed during training.
    pub fn prepared_len(&self) -> usize {
        self.prepared.len()
    }

    fn prepare(&self, name: &str) -> PreparedName {
        PreparedName {
            normalized: self.decomposer.normalizer().normalize(name),
            ingredients: self.decomposer.extract_ingredients(name),
        }
    }

    fn prepared_candidate(&self, name: &str) -> Cow<'_, PreparedName> {
        match self.prepared.get(name) {
            Some(prepared) => Cow::Borrowed(prepared),
            None => Cow::Owned(self.prepare(name)),
        }
    }

    /// Score a query generic name against a candidate generic name.
    pub fn best_match(&self, query: &str, candidate: &str) -> GenericScore {
        let (query, candidate) = (query.trim(), candidate.trim());
        if query.is_empty() || candidate.is_empty() {
            return GenericScore::default();
        }

        let fuzzy_score = fuzzy_ratio(&query.to_uppercase(), &candidate.to_uppercase());

        let left = self.prepare(query);
        let right = self.prepared_candidate(candidate);
        let vector_score = self.vectorizer.score(&left.normalized, &right.normalized);
        let semantic_score = ingredient_overlap(&left.ingredients, &right.ingredients);

        let final_score = semantic_score * SEMANTIC_WEIGHT
            + fuzzy_score * FUZZY_WEIGHT
            + vector_score * VECTOR_WEIGHT;

        let method = if semantic_score > DOMINANT_SCORE {
            GenericMethod::Combination
        } else if fuzzy_score > DOMINANT_SCORE {
            GenericMethod::Fuzzy
        } else if vector_score > DOMINANT_SCORE {
            GenericMethod::Vector
        } else {
            GenericMethod::Combined
        };

        GenericScore {
            fuzzy_score,
            vector_score,
            semantic_score,
            final_score,
            method,
        }
    }
}
