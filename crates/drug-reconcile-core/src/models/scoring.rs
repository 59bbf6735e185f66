//! Similarity and weight vectors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A comparable drug attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Brand,
    Generic,
    Strength,
    Dosage,
    Price,
    PackageSize,
    Unit,
    UnitCategory,
}

impl Attribute {
    /// All attributes in report order.
    pub const ALL: [Attribute; 8] = [
        Attribute::Brand,
        Attribute::Generic,
        Attribute::Strength,
        Attribute::Dosage,
        Attribute::Price,
        Attribute::PackageSize,
        Attribute::Unit,
        Attribute::UnitCategory,
    ];

    /// Attributes added by the extended weighting scheme.
    pub const PACKAGING: [Attribute; 3] = [
        Attribute::PackageSize,
        Attribute::Unit,
        Attribute::UnitCategory,
    ];

    /// Stable snake_case key.
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Generic => "generic",
            Self::Strength => "strength",
            Self::Dosage => "dosage",
            Self::Price => "price",
            Self::PackageSize => "package_size",
            Self::Unit => "unit",
            Self::UnitCategory => "unit_category",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Which generic-name technique dominated the blended score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenericMethod {
    /// Either name was empty
    #[default]
    None,
    /// Ingredient decomposition scored above 0.8
    Combination,
    /// Character-level ratio scored above 0.8
    Fuzzy,
    /// TF-IDF cosine scored above 0.8
    Vector,
    /// No single technique dominated
    Combined,
}

impl GenericMethod {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Combination => "combination",
            Self::Fuzzy => "fuzzy",
            Self::Vector => "vector",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for GenericMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Generic-name match breakdown.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GenericScore {
    /// Character-level ratio on uppercased names
    pub fuzzy_score: f64,
    /// TF-IDF cosine similarity (0.0 when the vectorizer is untrained)
    pub vector_score: f64,
    /// Ingredient-level combination similarity
    pub semantic_score: f64,
    /// Blended score: semantic 50%, fuzzy 30%, vector 20%
    pub final_score: f64,
    /// Dominant technique
    pub method: GenericMethod,
}

/// Per-pair similarities, one value in [0, 1] per attribute.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SimilarityVector {
    pub brand: f64,
    pub generic: f64,
    pub strength: f64,
    pub dosage: f64,
    pub price: f64,
    pub package_size: f64,
    pub unit: f64,
    pub unit_category: f64,
    /// Generic-name sub-scores and winning method
    pub generic_detail: GenericScore,
}

impl SimilarityVector {
    /// Similarity for one attribute.
    pub fn get(&self, attribute: Attribute) -> f64 {
        match attribute {
            Attribute::Brand => self.brand,
            Attribute::Generic => self.generic,
            Attribute::Strength => self.strength,
            Attribute::Dosage => self.dosage,
            Attribute::Price => self.price,
            Attribute::PackageSize => self.package_size,
            Attribute::Unit => self.unit,
            Attribute::UnitCategory => self.unit_category,
        }
    }
}

/// Attribute weights.
///
/// Weights produced by the weighting policy are non-negative and sum to 1.0.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WeightVector {
    weights: BTreeMap<Attribute, f64>,
}

impl WeightVector {
    /// Empty weight vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(attribute, weight)` pairs.
    pub fn from_pairs<I: IntoIterator<Item = (Attribute, f64)>>(pairs: I) -> Self {
        Self {
            weights: pairs.into_iter().collect(),
        }
    }

    /// Weight for an attribute, `None` if absent.
    pub fn get(&self, attribute: Attribute) -> Option<f64> {
        self.weights.get(&attribute).copied()
    }

    /// Weight for an attribute, 0.0 if absent.
    pub fn weight(&self, attribute: Attribute) -> f64 {
        self.get(attribute).unwrap_or(0.0)
    }

    pub fn set(&mut self, attribute: Attribute, weight: f64) {
        self.weights.insert(attribute, weight);
    }

    pub fn contains(&self, attribute: Attribute) -> bool {
        self.weights.contains_key(&attribute)
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Iterate in attribute order.
    pub fn iter(&self) -> impl Iterator<Item = (Attribute, f64)> + '_ {
        self.weights.iter().map(|(a, w)| (*a, *w))
    }

    /// Scale so the weights sum to 1.0. A zero total is left untouched.
    pub fn normalize(&mut self) {
        let total = self.total();
        if total > 0.0 {
            for weight in self.weights.values_mut() {
                *weight /= total;
            }
        }
    }

    /// Weighted sum of similarities over the attributes present in this vector.
    pub fn apply(&self, similarities: &SimilarityVector) -> f64 {
        self.iter()
            .map(|(attribute, weight)| similarities.get(attribute) * weight)
            .sum()
    }
}
