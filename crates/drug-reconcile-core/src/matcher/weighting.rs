//! Rule-based weight redistribution.
//!
//! When the brand already matches, the generic name adds little and the
//! weight moves to strength and dosage form. Packaging attributes are injected
//! under the extended scheme. The result is always renormalized to sum to 1.0.

use serde::{Deserialize, Serialize};

use crate::config::WeightScheme;
use crate::models::{Attribute, SimilarityVector, WeightVector};

/// Brand similarity treated as "same brand".
const STRONG_BRAND: f64 = 0.95;
/// Brand similarity treated as "probably same brand".
const LIKELY_BRAND: f64 = 0.90;
/// Strength and dosage similarity treated as confirming a brand match.
const CONFIRMING: f64 = 0.95;
/// Below this, a strong brand match with odd strength or dosage needs review.
const REVIEW_BELOW: f64 = 0.8;

/// Weight taken from price when packaging attributes are injected.
const PACKAGING_PRICE_SHARE: f64 = 0.10;

/// Weights injected for packaging attributes missing from the base vector.
const PACKAGING_DEFAULTS: [(Attribute, f64); 3] = [
    (Attribute::PackageSize, 0.10),
    (Attribute::Unit, 0.05),
    (Attribute::UnitCategory, 0.05),
];

/// Brand, strength and dosage all confirm each other.
const CONFIRMED_BRAND_PROFILE: [(Attribute, f64); 5] = [
    (Attribute::Brand, 0.20),
    (Attribute::Generic, 0.0),
    (Attribute::Strength, 0.40),
    (Attribute::Dosage, 0.25),
    (Attribute::Price, 0.15),
];

/// Brand matches but strength or dosage does not fully agree.
const STRONG_BRAND_PROFILE: [(Attribute, f64); 5] = [
    (Attribute::Brand, 0.20),
    (Attribute::Generic, 0.0),
    (Attribute::Strength, 0.35),
    (Attribute::Dosage, 0.30),
    (Attribute::Price, 0.15),
];

const LIKELY_BRAND_PROFILE: [(Attribute, f64); 5] = [
    (Attribute::Brand, 0.20),
    (Attribute::Generic, 0.10),
    (Attribute::Strength, 0.30),
    (Attribute::Dosage, 0.25),
    (Attribute::Price, 0.15),
];

/// Which decision-table rule produced the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightRule {
    ConfirmedBrand,
    StrongBrand,
    LikelyBrand,
    Base,
}

/// Weights for one pair plus the review decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWeights {
    pub weights: WeightVector,
    pub rule: WeightRule,
    pub manual_review: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WeightingPolicy {
    scheme: WeightScheme,
}

impl WeightingPolicy {
    pub fn new(scheme: WeightScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> WeightScheme {
        self.scheme
    }

    /// Redistribute `base` for a pair with the given similarities.
    ///
    /// Rules are tried in order and the first match wins:
    /// 1. brand, strength and dosage all ≥ 0.95: generic weight 0
    /// 2. brand ≥ 0.95: generic weight 0, review if strength or dosage < 0.8
    /// 3. brand ≥ 0.90: generic weight 0.10
    /// 4. base weights unchanged
    pub fn resolve(&self, base: &WeightVector, similarities: &SimilarityVector) -> ResolvedWeights {
        let brand = similarities.brand;
        let strength = similarities.strength;
        let dosage = similarities.dosage;

        let (rule, profile, manual_review) = if brand >= STRONG_BRAND
            && strength >= CONFIRMING
            && dosage >= CONFIRMING
        {
            (WeightRule::ConfirmedBrand, Some(&CONFIRMED_BRAND_PROFILE), false)
        } else if brand >= STRONG_BRAND {
            let review = strength < REVIEW_BELOW || dosage < REVIEW_BELOW;
            (WeightRule::StrongBrand, Some(&STRONG_BRAND_PROFILE), review)
        } else if brand >= LIKELY_BRAND {
            (WeightRule::LikelyBrand, Some(&LIKELY_BRAND_PROFILE), false)
        } else {
            (WeightRule::Base, None, false)
        };

        let mut weights = base.clone();
        if let Some(profile) = profile {
            for (attribute, weight) in profile.iter() {
                weights.set(*attribute, *weight);
            }
        }

        if self.scheme == WeightScheme::Extended {
            inject_packaging(&mut weights);
        }
        weights.normalize();

        ResolvedWeights {
            weights,
            rule,
            manual_review,
        }
    }
}

/// Add missing packaging weights and take a single share from price.
fn inject_packaging(weights: &mut WeightVector) {
    let mut injected = false;
    for (attribute, weight) in PACKAGING_DEFAULTS {
        if !weights.contains(attribute) {
            weights.set(attribute, weight);
            injected = true;
        }
    }

    if injected {
        if let Some(price) = weights.get(Attribute::Price) {
            weights.set(Attribute::Price, (price - PACKAGING_PRICE_SHARE).max(0.0));
        }
    }
}
