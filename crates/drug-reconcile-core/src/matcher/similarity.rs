//! Per-attribute similarity scorers.
//!
//! Every scorer returns a value in [0, 1]. Empty input never errors: it scores
//! 0.0, or 1.0 where both sides being blank counts as agreement (packaging).

use strsim::normalized_levenshtein;

use super::normalizer::{extract_package_size, normalize_strength, TextNormalizer};

/// Dosage-form keywords that count as a near match when shared.
const DOSAGE_KEYWORDS: [&str; 3] = ["TABLET", "CAPSULE", "INJECTION"];

/// Score for two dosage forms sharing a keyword.
const SHARED_KEYWORD_SCORE: f64 = 0.9;

/// Strength ratio at which the sigmoid crosses 0.5.
const STRENGTH_MIDPOINT: f64 = 0.8;
const STRENGTH_STEEPNESS: f64 = 10.0;

/// Package ratio tiers: (ratio must exceed, score).
const PACKAGE_TIERS: [(f64, f64); 3] = [(0.95, 1.0), (0.85, 0.9), (0.7, 0.7)];

/// Multiplier for package amounts in different units.
const PACKAGE_UNIT_MISMATCH: f64 = 0.5;

/// Levenshtein-based ratio in [0, 1]. Two empty strings score 1.0.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

/// Scorers for brand, strength, dosage form and packaging attributes.
#[derive(Default)]
pub struct AttributeScorer {
    normalizer: TextNormalizer,
}

impl AttributeScorer {
    /// Create a scorer with the default normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scorer around an existing normalizer.
    pub fn with_normalizer(normalizer: TextNormalizer) -> Self {
        Self { normalizer }
    }

    /// Brand name similarity: exact after normalization, else fuzzy.
    pub fn brand_similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (self.normalizer.normalize(a), self.normalizer.normalize(b));
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        fuzzy_ratio(&a, &b)
    }

    /// Strength similarity on milligram-equivalent magnitudes.
    ///
    /// Identical magnitudes score 1.0. Otherwise the min/max ratio goes through
    /// a sigmoid centred at 0.8, so strengths within about 20% score at least 0.5.
    pub fn strength_similarity(&self, a: &str, b: &str) -> f64 {
        if a.trim().is_empty() || b.trim().is_empty() {
            return 0.0;
        }

        let (first, second) = (normalize_strength(a), normalize_strength(b));
        if first == 0.0 || second == 0.0 {
            return 0.0;
        }
        if first == second {
            return 1.0;
        }

        let ratio = first.min(second) / first.max(second);
        1.0 / (1.0 + (-STRENGTH_STEEPNESS * (ratio - STRENGTH_MIDPOINT)).exp())
    }

    /// Dosage form similarity with a shared-keyword shortcut.
    pub fn dosage_similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (self.normalizer.normalize(a), self.normalizer.normalize(b));
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }

        let shares_keyword = DOSAGE_KEYWORDS
            .iter()
            .any(|keyword| a.contains(keyword) && b.contains(keyword));
        if shares_keyword {
            return SHARED_KEYWORD_SCORE;
        }

        fuzzy_ratio(&a, &b)
    }

    /// Package size similarity on parsed amounts.
    ///
    /// Falls back to fuzzy matching of the raw text when either side has no
    /// numeric amount.
    pub fn package_size_similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (a.trim(), b.trim());
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            _ => {}
        }

        let (first, second) = (extract_package_size(a), extract_package_size(b));
        let (Some(amount_a), Some(amount_b)) = (first.amount, second.amount) else {
            return fuzzy_ratio(&a.to_uppercase(), &b.to_uppercase());
        };

        if amount_a <= 0.0 || amount_b <= 0.0 {
            return 0.0;
        }
        let ratio = amount_a.min(amount_b) / amount_a.max(amount_b);

        let units_compatible = match (&first.unit, &second.unit) {
            (Some(unit_a), Some(unit_b)) => unit_a == unit_b,
            _ => true,
        };
        if !units_compatible {
            return PACKAGE_UNIT_MISMATCH * ratio;
        }

        PACKAGE_TIERS
            .iter()
            .find(|(floor, _)| ratio > *floor)
            .map(|(_, score)| *score)
            .unwrap_or(ratio)
    }

    /// Unit similarity: blank on both sides agrees, blank on one side does not.
    pub fn unit_similarity(&self, a: &str, b: &str) -> f64 {
        self.categorical_similarity(a, b)
    }

    /// Unit category similarity, same rules as [`Self::unit_similarity`].
    pub fn unit_category_similarity(&self, a: &str, b: &str) -> f64 {
        self.categorical_similarity(a, b)
    }

    fn categorical_similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (self.normalizer.normalize(a), self.normalizer.normalize(b));
        match (a.is_empty(), b.is_empty()) {
            (true, true) => 1.0,
            (true, false) | (false, true) => 0.0,
            _ if a == b => 1.0,
            _ => fuzzy_ratio(&a, &b),
        }
    }
}
