//! Combination drug decomposition.
//!
//! A generic name such as "Paracetamol + Caffeine" encodes several active
//! ingredients. The decomposer splits it into an ordered, deduplicated set of
//! ingredient tokens and scores two names by greedily pairing their ingredients.

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;

use super::normalizer::TextNormalizer;

static SYMBOL_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[+&/]\s*").expect("static regex"));

static AND_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\bAND\b\s*").expect("static regex"));

static WITH_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\bWITH\b\s*").expect("static regex"));

static COMBINATION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\b(?:COMBINATION|COMPOUND)$").expect("static regex"));

const STRIP_PREFIXES: [&str; 3] = ["THE ", "A ", "AN "];
const STRIP_SUFFIXES: [&str; 4] = [" TABLET", " CAPSULE", " INJECTION", " SYRUP"];

/// Ingredient tokens this short are noise.
const MIN_INGREDIENT_LEN: usize = 3;

/// Splits generic names into ingredients and scores ingredient overlap.
#[derive(Default)]
pub struct CombinationDecomposer {
    normalizer: TextNormalizer,
}

impl CombinationDecomposer {
    /// Create a decomposer with the default normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decomposer around an existing normalizer.
    pub fn with_normalizer(normalizer: TextNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Ordered, deduplicated ingredient tokens of a generic name.
    ///
    /// Separators are tried in order: `+ & /`, the word AND, the word WITH,
    /// then a trailing COMBINATION/COMPOUND marker. A name with none of these
    /// yields its normalized form as the only ingredient.
    pub fn extract_ingredients(&self, generic_name: &str) -> IndexSet<String> {
        let normalized = self.normalizer.normalize(generic_name);
        if normalized.is_empty() {
            return IndexSet::new();
        }

        let parts: Vec<String> = if SYMBOL_SEPARATOR.is_match(&normalized) {
            split_on(&SYMBOL_SEPARATOR, &normalized)
        } else if AND_SEPARATOR.is_match(&normalized) {
            split_on(&AND_SEPARATOR, &normalized)
        } else if WITH_SEPARATOR.is_match(&normalized) {
            split_on(&WITH_SEPARATOR, &normalized)
        } else {
            vec![COMBINATION_SUFFIX.replace(&normalized, "").into_owned()]
        };

        parts
            .iter()
            .filter_map(|part| clean_ingredient(part))
            .collect()
    }

    /// True when the name decomposes into more than one ingredient.
    pub fn is_combination(&self, generic_name: &str) -> bool {
        self.extract_ingredients(generic_name).len() > 1
    }

    /// Ingredient-level similarity of two generic names in [0, 1].
    ///
    /// Each ingredient of the first name takes its best unused partner from the
    /// second; the summed pair scores are divided by the larger ingredient count.
    pub fn combination_similarity(&self, first: &str, second: &str) -> f64 {
        ingredient_overlap(&self.extract_ingredients(first), &self.extract_ingredients(second))
    }
}

/// Greedy ingredient pairing over already extracted sets.
///
/// Same scoring as [`CombinationDecomposer::combination_similarity`].
pub fn ingredient_overlap(left: &IndexSet<String>, right: &IndexSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let mut used = vec![false; right.len()];
    let mut total = 0.0;

    for ingredient in left {
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in right.iter().enumerate() {
            if used[idx] {
                continue;
            }
            let score = ingredient_similarity(ingredient, candidate);
            if score > best.map_or(0.0, |(_, s)| s) {
                best = Some((idx, score));
            }
        }
        if let Some((idx, score)) = best {
            used[idx] = true;
            total += score;
        }
    }

    total / left.len().max(right.len()) as f64
}

fn split_on(separator: &Regex, text: &str) -> Vec<String> {
    separator.split(text).map(str::to_string).collect()
}

/// Strip articles and dosage-form suffixes; drop noise tokens.
fn clean_ingredient(part: &str) -> Option<String> {
    let mut cleaned = part.trim();

    for prefix in STRIP_PREFIXES {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim_start();
        }
    }
    for suffix in STRIP_SUFFIXES {
        if let Some(rest) = cleaned.strip_suffix(suffix) {
            cleaned = rest.trim_end();
        }
    }

    (cleaned.chars().count() >= MIN_INGREDIENT_LEN).then(|| cleaned.to_string())
}

/// Half exact match, half sequence ratio.
fn ingredient_similarity(a: &str, b: &str) -> f64 {
    let exact = if a == b { 1.0 } else { 0.0 };
    0.5 * exact + 0.5 * sequence_ratio(a, b)
}

/// `2·LCS / (|a| + |b|)` over characters. Two empty strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    // Single-row LCS table
    let mut row = vec![0usize; b.len() + 1];
    for ca in &a {
        let mut diagonal = 0;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }

    2.0 * row[b.len()] as f64 / total as f64
}
