//! Match outcomes emitted by the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DrugRecord, SimilarityVector, WeightVector};

/// Discretized confidence bucket for an overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "Very Low")]
    VeryLow,
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Medium")]
    Medium,
    #[serde(rename = "High")]
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl ConfidenceLevel {
    /// Buckets from highest to lowest; the first threshold met wins.
    pub const THRESHOLDS: [(f64, ConfidenceLevel); 4] = [
        (0.95, ConfidenceLevel::VeryHigh),
        (0.85, ConfidenceLevel::High),
        (0.75, ConfidenceLevel::Medium),
        (0.65, ConfidenceLevel::Low),
    ];

    /// All levels, highest first.
    pub const ALL: [ConfidenceLevel; 5] = [
        ConfidenceLevel::VeryHigh,
        ConfidenceLevel::High,
        ConfidenceLevel::Medium,
        ConfidenceLevel::Low,
        ConfidenceLevel::VeryLow,
    ];

    pub fn from_score(score: f64) -> Self {
        Self::THRESHOLDS
            .iter()
            .find(|(threshold, _)| score >= *threshold)
            .map(|(_, level)| *level)
            .unwrap_or(ConfidenceLevel::VeryLow)
    }

    /// Parse a label produced by [`Self::label`].
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.label() == label)
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::VeryHigh => "Very High",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::VeryLow => "Very Low",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which input list a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSide {
    Source,
    Target,
}

impl ListSide {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "source" => Some(Self::Source),
            "target" => Some(Self::Target),
            _ => None,
        }
    }
}

/// A scored source/target pair at or above the threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchCandidate {
    pub source: DrugRecord,
    pub target: DrugRecord,
    pub similarities: SimilarityVector,
    /// Weights actually applied to this pair
    pub weights: WeightVector,
    pub overall_score: f64,
    pub confidence: ConfidenceLevel,
    /// Set on exactly one candidate per source record
    pub is_best_for_source: bool,
    /// Brand matched but strength or dosage looks wrong
    pub manual_review: bool,
    /// RFC 3339 time the source record was resolved
    #[serde(default)]
    pub processed_at: String,
}

impl MatchCandidate {
    /// Absolute price gap, `None` unless both prices are known.
    pub fn price_difference(&self) -> Option<f64> {
        (self.source.has_price() && self.target.has_price())
            .then(|| (self.source.price - self.target.price).abs())
    }
}

/// A record with no candidate at or above the threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmatchedRecord {
    pub record: DrugRecord,
    /// Highest overall score seen against the other list
    pub best_score_seen: f64,
    /// Code of the record that produced `best_score_seen`
    pub best_candidate_code: Option<String>,
    /// Why no match was emitted
    pub reason: String,
    #[serde(default)]
    pub processed_at: String,
}
