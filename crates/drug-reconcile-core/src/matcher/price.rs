//! Price similarity.
//!
//! A price of zero or below means "unknown", never "free", and scores 0.0.

use serde::{Deserialize, Serialize};

/// Default percentage band that counts as a perfect price match.
pub const DEFAULT_TOLERANCE_PERCENTAGE: f64 = 20.0;

/// Default max/min price ratio beyond which prices score 0.0.
pub const DEFAULT_MAX_PRICE_RATIO: f64 = 5.0;

/// Scores price pairs by percentage difference and ratio decay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceMatcher {
    pub tolerance_percentage: f64,
    pub max_ratio: f64,
}

impl Default for PriceMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_PERCENTAGE, DEFAULT_MAX_PRICE_RATIO)
    }
}

impl PriceMatcher {
    /// Create a matcher with the given tolerance band and maximum ratio.
    pub fn new(tolerance_percentage: f64, max_ratio: f64) -> Self {
        Self {
            tolerance_percentage,
            max_ratio,
        }
    }

    /// Similarity in [0, 1]; symmetric in its arguments.
    pub fn similarity(&self, a: f64, b: f64) -> f64 {
        if !is_known(a) || !is_known(b) {
            return 0.0;
        }

        if percentage_difference(a, b) <= self.tolerance_percentage {
            return 1.0;
        }

        let ratio = a.max(b) / a.min(b);
        if ratio > self.max_ratio || self.max_ratio <= 1.0 {
            return 0.0;
        }

        (1.0 - (ratio - 1.0) / (self.max_ratio - 1.0)).clamp(0.0, 1.0)
    }

    /// Full comparison of two prices, `None` when either is unknown.
    pub fn analyze(&self, a: f64, b: f64) -> Option<PriceAnalysis> {
        if !is_known(a) || !is_known(b) {
            return None;
        }

        let similarity = self.similarity(a, b);
        Some(PriceAnalysis {
            similarity,
            difference: (a - b).abs(),
            percentage_diff: percentage_difference(a, b),
            ratio: a.max(b) / a.min(b),
            verdict: PriceVerdict::from_similarity(similarity),
        })
    }
}

fn is_known(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// `|a - b|` as a percentage of the mean of `a` and `b`.
fn percentage_difference(a: f64, b: f64) -> f64 {
    (a - b).abs() / ((a + b) / 2.0) * 100.0
}

/// Breakdown of a price comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub similarity: f64,
    /// Absolute difference
    pub difference: f64,
    /// Difference relative to the mean price
    pub percentage_diff: f64,
    /// max / min
    pub ratio: f64,
    pub verdict: PriceVerdict,
}

/// Human-facing price agreement bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceVerdict {
    Excellent,
    Good,
    Moderate,
    Significant,
    Large,
}

impl PriceVerdict {
    pub fn from_similarity(similarity: f64) -> Self {
        match similarity {
            s if s >= 0.9 => Self::Excellent,
            s if s >= 0.7 => Self::Good,
            s if s >= 0.5 => Self::Moderate,
            s if s >= 0.3 => Self::Significant,
            _ => Self::Large,
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent price match",
            Self::Good => "Good price match",
            Self::Moderate => "Moderate price difference",
            Self::Significant => "Significant price difference",
            Self::Large => "Large price difference",
        }
    }
}
