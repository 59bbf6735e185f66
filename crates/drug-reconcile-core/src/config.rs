//! Matching configuration.
//!
//! Loaded from JSON or built from defaults, then validated once before any
//! record is scored. Validation failures stop the run up front.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matcher::{PriceMatcher, DEFAULT_MAX_PRICE_RATIO, DEFAULT_TOLERANCE_PERCENTAGE};
use crate::models::{Attribute, WeightVector};

/// Default minimum overall score for a candidate.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Tolerated drift of the base weight total before it is renormalized.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("weight for {attribute} must be a finite non-negative number, got {weight}")]
    InvalidWeight { attribute: Attribute, weight: f64 },

    #[error("base weights are empty or all zero")]
    ZeroWeights,

    #[error("max price ratio must be greater than 1, got {0}")]
    InvalidPriceRatio(f64),

    #[error("price tolerance percentage must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// How many candidates each source record may keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every target at or above the threshold, with one flagged as best
    #[default]
    OneToMany,
    /// Only the highest-scoring target
    SingleBest,
}

/// Attribute set used when resolving weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    /// Injects package size, unit and unit category weights when absent
    #[default]
    Extended,
    /// Deprecated five-attribute scheme: brand, generic, strength, dosage, price
    Legacy,
}

/// Run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    /// Minimum overall score for a candidate
    pub threshold: f64,
    /// Weights before rule-based redistribution
    pub base_weights: WeightVector,
    /// Percentage difference treated as a perfect price match
    pub price_tolerance_percentage: f64,
    /// Price ratio beyond which price similarity is 0
    pub max_price_ratio: f64,
    /// Also surface targets that no source matched
    pub bidirectional: bool,
    pub mode: MatchMode,
    pub weight_scheme: WeightScheme,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            base_weights: default_base_weights(),
            price_tolerance_percentage: DEFAULT_TOLERANCE_PERCENTAGE,
            max_price_ratio: DEFAULT_MAX_PRICE_RATIO,
            bidirectional: false,
            mode: MatchMode::default(),
            weight_scheme: WeightScheme::default(),
        }
    }
}

/// Brand .20, generic .30, strength .20, dosage .15, price .15.
pub fn default_base_weights() -> WeightVector {
    WeightVector::from_pairs([
        (Attribute::Brand, 0.20),
        (Attribute::Generic, 0.30),
        (Attribute::Strength, 0.20),
        (Attribute::Dosage, 0.15),
        (Attribute::Price, 0.15),
    ])
}

impl MatchConfig {
    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let mut config: MatchConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every field, renormalizing base weights that do not sum to 1.0.
    pub fn validate(&mut self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }

        for (attribute, weight) in self.base_weights.iter() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight { attribute, weight });
            }
        }

        let total = self.base_weights.total();
        if total <= 0.0 {
            return Err(ConfigError::ZeroWeights);
        }
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            tracing::warn!(total, "base weights do not sum to 1.0, renormalizing");
            self.base_weights.normalize();
        }

        if !self.max_price_ratio.is_finite() || self.max_price_ratio <= 1.0 {
            return Err(ConfigError::InvalidPriceRatio(self.max_price_ratio));
        }
        if !self.price_tolerance_percentage.is_finite() || self.price_tolerance_percentage < 0.0 {
            return Err(ConfigError::InvalidTolerance(self.price_tolerance_percentage));
        }

        Ok(())
    }

    pub fn price_matcher(&self) -> PriceMatcher {
        PriceMatcher::new(self.price_tolerance_percentage, self.max_price_ratio)
    }
}
