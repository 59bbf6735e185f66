//! Drug catalog records.

use serde::{Deserialize, Serialize};

use crate::matcher::clean_price;

/// Number of positional columns an input row may carry.
pub const RECORD_COLUMNS: usize = 9;

/// One row from either drug list.
///
/// Records are built once at load time and only ever read by the engine.
/// `code` identifies the row within its own list but is not assumed unique.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DrugRecord {
    /// Catalog code within its own list
    pub code: String,
    /// Brand / trade name
    pub brand_name: String,
    /// Generic name, possibly listing several active ingredients
    pub generic_name: String,
    /// Raw strength text (e.g., "500mg", "1 G")
    pub strength: String,
    /// Dosage form (e.g., "Tablet", "Inj")
    pub dosage_form: String,
    /// Price; 0.0 means unknown
    pub price: f64,
    /// Raw package size text (e.g., "2x15", "BOTTLE OF 100ML")
    pub package_size: String,
    /// Unit of sale
    pub unit: String,
    /// Unit category (e.g., "solid", "liquid")
    pub unit_category: String,
}

impl DrugRecord {
    /// Create a record with the five core attributes.
    pub fn new(
        code: impl Into<String>,
        brand_name: impl Into<String>,
        generic_name: impl Into<String>,
        strength: impl Into<String>,
        dosage_form: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            code: code.into(),
            brand_name: brand_name.into(),
            generic_name: generic_name.into(),
            strength: strength.into(),
            dosage_form: dosage_form.into(),
            price: sanitize_price(price),
            ..Self::default()
        }
    }

    /// Set the package size, unit and unit category.
    pub fn with_packaging(
        mut self,
        package_size: impl Into<String>,
        unit: impl Into<String>,
        unit_category: impl Into<String>,
    ) -> Self {
        self.package_size = package_size.into();
        self.unit = unit.into();
        self.unit_category = unit_category.into();
        self
    }

    /// Build a record from positional cells:
    /// `[code, brand_name, generic_name, strength, dosage_form, price, package_size, unit, unit_category]`.
    ///
    /// Missing trailing cells become `""` (or `0.0` for price). Extra cells are ignored.
    pub fn from_row<S: AsRef<str>>(cells: &[S]) -> Self {
        let text = |idx: usize| -> String {
            cells
                .get(idx)
                .map(|c| clean_cell(c.as_ref()))
                .unwrap_or_default()
        };

        Self {
            code: text(0),
            brand_name: text(1),
            generic_name: text(2),
            strength: text(3),
            dosage_form: text(4),
            price: cells.get(5).map(|c| clean_price(c.as_ref())).unwrap_or(0.0),
            package_size: text(6),
            unit: text(7),
            unit_category: text(8),
        }
    }

    /// Whether the record carries a usable price.
    pub fn has_price(&self) -> bool {
        self.price > 0.0
    }
}

/// Trim a raw cell, mapping spreadsheet null markers to the empty string.
fn clean_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "nan" | "none" | "null" | "n/a" => String::new(),
        _ => trimmed.to_string(),
    }
}

fn sanitize_price(price: f64) -> f64 {
    if price.is_finite() && price > 0.0 {
        price
    } else {
        0.0
    }
}

/// Parsed package size.
///
/// `amount == None` means parsing failed and comparisons fall back to the raw text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageSize {
    /// Total amount (e.g., 30 for "2x15")
    pub amount: Option<f64>,
    /// Unit keyword found alongside the amount
    pub unit: Option<String>,
    /// Trimmed original text
    pub raw: String,
}

impl PackageSize {
    /// A package size that could not be parsed.
    pub fn unparsed(raw: impl Into<String>) -> Self {
        Self {
            amount: None,
            unit: None,
            raw: raw.into(),
        }
    }

    /// Whether a numeric amount was extracted.
    pub fn is_numeric(&self) -> bool {
        self.amount.is_some()
    }
}
