//! Text normalization for catalog fields.
//!
//! Handles:
//! - Case folding and whitespace collapsing
//! - Medical abbreviation expansion (MG→MILLIGRAM, TAB→TABLET, HCL→HYDROCHLORIDE)
//! - Strength extraction to a milligram-equivalent magnitude
//! - Package size parsing ("2x15", "BOTTLE OF 100ML", "100 TABLETS")
//! - Price cleaning ("$1,250.00", "12,50")
//!
//! Nothing here returns an error. Unparseable input degrades to `""`, `0.0`
//! or an unparsed [`PackageSize`].

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::PackageSize;

/// Unit keywords recognised next to a package amount.
const PACKAGE_UNITS: &str = "TABLET|CAPSULE|ML|BOTTLE|BLISTER|DROP|VIAL|AMPOULE|SYRINGE|SACHET|SUPPOSITORY|PATCH|POWDER|GRANULE|LOZENGE|SPRAY|INHALER|DOSE|PIECE|STRIP|TUBE|BAG|PACK|KIT|CARTRIDGE|PEN|DEVICE|SYRUP|SOLUTION|SUSPENSION|EMULSION|CREAM|OINTMENT|GEL|LOTION|DROPPER";

/// Container keywords for "<container> OF <amount>" phrases.
const PACKAGE_CONTAINERS: &str = "BOTTLE|STRIP|PACK|BOX|TUBE|BAG|KIT|CARTRIDGE|PEN|DEVICE|SACHET|BLISTER|VIAL|AMPOULE|SYRINGE|SUPPOSITORY|PATCH|POWDER|GRANULE|LOZENGE|SPRAY|INHALER|DOSE|PIECE|TABLET|CAPSULE|ML|GEL|CREAM|OINTMENT|LOTION|DROPPER";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Strength patterns in priority order with their milligram multiplier.
static STRENGTH_PATTERNS: LazyLock<Vec<(Regex, f64)>> = LazyLock::new(|| {
    [
        (r"(\d+(?:\.\d+)?)\s*MG", 1.0),
        (r"(\d+(?:\.\d+)?)\s*G", 1000.0),
        (r"(\d+(?:\.\d+)?)\s*MCG", 0.001),
        (r"(\d+(?:\.\d+)?)\s*KG", 1_000_000.0),
    ]
    .into_iter()
    .map(|(pattern, multiplier)| (Regex::new(pattern).expect("static regex"), multiplier))
    .collect()
});

static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("static regex"));

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").expect("static regex"));

static MULTIPLIED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*[X*×]\s*(\d+)").expect("static regex"));

static PACKAGE_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("({PACKAGE_UNITS})")).expect("static regex"));

static CONTAINER_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^({PACKAGE_CONTAINERS})[\s\-_]*OF[\s\-_]*(\d+(?:\.\d+)?)([A-Z]*)"
    ))
    .expect("static regex")
});

static NUMBER_WITH_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(\d+(?:\.\d+)?)\s*({PACKAGE_UNITS})")).expect("static regex")
});

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)").expect("static regex"));

/// Normalizer for free-text drug fields.
pub struct TextNormalizer {
    /// Abbreviation → expansion, keys uppercase
    abbreviations: HashMap<String, String>,
    /// Whole-word alternation over all abbreviation keys
    pattern: Regex,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    /// Create a normalizer with the default abbreviation dictionary.
    pub fn new() -> Self {
        let abbreviations = Self::default_abbreviations();
        let pattern = build_pattern(&abbreviations);
        Self {
            abbreviations,
            pattern,
        }
    }

    /// Uppercase, trim, expand abbreviations on whole words, collapse whitespace.
    ///
    /// Empty or null-ish input yields `""`.
    pub fn normalize(&self, text: &str) -> String {
        let upper = text.trim().to_uppercase();
        if upper.is_empty() || upper == "NAN" {
            return String::new();
        }

        let expanded = self.pattern.replace_all(&upper, |caps: &regex::Captures<'_>| {
            let word = &caps[0];
            self.abbreviations
                .get(word)
                .cloned()
                .unwrap_or_else(|| word.to_string())
        });

        WHITESPACE.replace_all(&expanded, " ").trim().to_string()
    }

    /// Expansion for a single abbreviation, if known.
    pub fn expand_abbreviation(&self, abbreviation: &str) -> Option<&str> {
        self.abbreviations
            .get(&abbreviation.to_uppercase())
            .map(String::as_str)
    }

    /// Add a custom abbreviation mapping.
    pub fn add_abbreviation(&mut self, abbreviation: &str, expansion: &str) {
        self.abbreviations
            .insert(abbreviation.to_uppercase(), expansion.to_uppercase());
        self.pattern = build_pattern(&self.abbreviations);
    }

    /// Default medical abbreviation dictionary.
    fn default_abbreviations() -> HashMap<String, String> {
        let mut map = HashMap::new();

        // Units
        map.insert("MG".into(), "MILLIGRAM".into());
        map.insert("MCG".into(), "MICROGRAM".into());
        map.insert("G".into(), "GRAM".into());
        map.insert("ML".into(), "MILLILITER".into());
        map.insert("L".into(), "LITER".into());
        map.insert("IU".into(), "INTERNATIONAL_UNIT".into());

        // Dosage forms
        map.insert("TAB".into(), "TABLET".into());
        map.insert("TABS".into(), "TABLETS".into());
        map.insert("CAP".into(), "CAPSULE".into());
        map.insert("CAPS".into(), "CAPSULES".into());
        map.insert("INJ".into(), "INJECTION".into());
        map.insert("SYR".into(), "SYRUP".into());
        map.insert("SUSP".into(), "SUSPENSION".into());
        map.insert("SOL".into(), "SOLUTION".into());
        map.insert("OINT".into(), "OINTMENT".into());

        // Combination indicators
        map.insert("COMB".into(), "COMBINATION".into());
        map.insert("COMP".into(), "COMPOUND".into());

        // Salts and ingredient stems
        map.insert("SOD".into(), "SODIUM".into());
        map.insert("POT".into(), "POTASSIUM".into());
        map.insert("CAL".into(), "CALCIUM".into());
        map.insert("MAG".into(), "MAGNESIUM".into());
        map.insert("VIT".into(), "VITAMIN".into());
        map.insert("HCL".into(), "HYDROCHLORIDE".into());
        map.insert("SULF".into(), "SULFATE".into());
        map.insert("PHOS".into(), "PHOSPHATE".into());
        map.insert("CIT".into(), "CITRATE".into());
        map.insert("ACET".into(), "ACETATE".into());
        map.insert("GLUC".into(), "GLUCONATE".into());
        map.insert("LACT".into(), "LACTATE".into());
        map.insert("MAL".into(), "MALEATE".into());
        map.insert("FUM".into(), "FUMARATE".into());
        map.insert("TAR".into(), "TARTRATE".into());

        // Release profiles
        map.insert("SR".into(), "SUSTAINED_RELEASE".into());
        map.insert("ER".into(), "EXTENDED_RELEASE".into());
        map.insert("XR".into(), "EXTENDED_RELEASE".into());
        map.insert("CR".into(), "CONTROLLED_RELEASE".into());
        map.insert("IR".into(), "IMMEDIATE_RELEASE".into());
        map.insert("LA".into(), "LONG_ACTING".into());
        map.insert("SA".into(), "SHORT_ACTING".into());
        map.insert("PR".into(), "PROLONGED_RELEASE".into());

        map
    }
}

/// Longest keys first so the alternation never prefers a shorter overlapping key.
fn build_pattern(abbreviations: &HashMap<String, String>) -> Regex {
    let mut keys: Vec<&String> = abbreviations.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).expect("escaped abbreviation alternation")
}

/// Milligram-equivalent magnitude of a strength string.
///
/// Tries milligram, gram, microgram and kilogram tokens in that order, then the
/// first bare number. Returns `0.0` when nothing numeric is present.
pub fn normalize_strength(strength: &str) -> f64 {
    let upper = strength.trim().to_uppercase();
    if upper.is_empty() {
        return 0.0;
    }

    for (pattern, multiplier) in STRENGTH_PATTERNS.iter() {
        if let Some(value) = pattern
            .captures(&upper)
            .and_then(|caps| caps[1].parse::<f64>().ok())
        {
            return value * multiplier;
        }
    }

    BARE_NUMBER
        .captures(&upper)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse a package size description.
pub fn extract_package_size(text: &str) -> PackageSize {
    let raw = text.trim();
    if raw.is_empty() {
        return PackageSize::unparsed("");
    }

    let normalized = raw.to_uppercase().replace("'S", "");
    let main = PARENTHESIZED.replace_all(&normalized, "");
    let main = main.trim();

    if let Some(parsed) = multiplied_amount(main, raw) {
        return parsed;
    }

    if let Some(caps) = CONTAINER_OF.captures(main) {
        if let Ok(amount) = caps[2].parse::<f64>() {
            let unit = match &caps[3] {
                "" => caps[1].to_string(),
                subunit => format!("{} {}", &caps[1], subunit),
            };
            return PackageSize {
                amount: Some(amount),
                unit: Some(unit),
                raw: raw.to_string(),
            };
        }
    }

    if let Some(caps) = NUMBER_WITH_UNIT.captures(main) {
        if let Ok(amount) = caps[1].parse::<f64>() {
            return PackageSize {
                amount: Some(amount),
                unit: Some(caps[2].to_string()),
                raw: raw.to_string(),
            };
        }
    }

    if let Some(amount) = LEADING_NUMBER
        .captures(main)
        .and_then(|caps| caps[1].parse::<f64>().ok())
    {
        return PackageSize {
            amount: Some(amount),
            unit: None,
            raw: raw.to_string(),
        };
    }

    // Parenthesized content is only a fallback for the multiplicative form
    if let Some(caps) = PARENTHESIZED.captures(&normalized) {
        if let Some(parsed) = multiplied_amount(&caps[1], raw) {
            return parsed;
        }
    }

    PackageSize::unparsed(raw)
}

/// "N x M" / "N*M" → N×M with the first unit keyword found in `text`.
fn multiplied_amount(text: &str, raw: &str) -> Option<PackageSize> {
    let caps = MULTIPLIED.captures(text)?;
    let left = caps[1].parse::<f64>().ok()?;
    let right = caps[2].parse::<f64>().ok()?;
    let unit = PACKAGE_UNIT
        .captures(text)
        .map(|unit_caps| unit_caps[1].to_string());

    Some(PackageSize {
        amount: Some(left * right),
        unit,
        raw: raw.to_string(),
    })
}

/// Parse a price cell.
///
/// Currency symbols and thousands separators are dropped. A single comma is read
/// as the decimal separator when no `.` is present. Unparseable, negative or
/// missing prices become `0.0`.
pub fn clean_price(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return 0.0;
    }

    let kept: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let comma_count = kept.matches(',').count();
    let numeric = if kept.contains('.') || comma_count > 1 {
        kept.replace(',', "")
    } else {
        kept.replace(',', ".")
    };

    match numeric.parse::<f64>() {
        Ok(price) if price.is_finite() && price > 0.0 => price,
        _ => 0.0,
    }
}
