//! Golden tests for text normalization and ingredient decomposition.
//!
//! These tables pin the behavior of the catalog-field parsers against
//! spellings seen in real drug lists.

use drug_reconcile_core::matcher::{
    clean_price, extract_package_size, normalize_strength, CombinationDecomposer, TextNormalizer,
};

/// Normalization case.
struct GoldenCase {
    id: &'static str,
    input: &'static str,
    expected: &'static str,
}

fn get_normalize_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            id: "unit-abbreviation",
            input: "500 mg",
            expected: "500 MILLIGRAM",
        },
        GoldenCase {
            id: "salt-and-form",
            input: "Metformin HCl tab",
            expected: "METFORMIN HYDROCHLORIDE TABLET",
        },
        GoldenCase {
            id: "whitespace-collapse",
            input: "  amoxicillin   caps ",
            expected: "AMOXICILLIN CAPSULES",
        },
        GoldenCase {
            id: "release-profile",
            input: "Nifedipine SR",
            expected: "NIFEDIPINE SUSTAINED_RELEASE",
        },
        GoldenCase {
            id: "partial-token-untouched",
            input: "MGX Tablet",
            expected: "MGX TABLET",
        },
        GoldenCase {
            id: "vitamin-gram",
            input: "Vit C 1 g",
            expected: "VITAMIN C 1 GRAM",
        },
        GoldenCase {
            id: "null-marker",
            input: "NaN",
            expected: "",
        },
        GoldenCase {
            id: "blank",
            input: "   ",
            expected: "",
        },
    ]
}

#[test]
fn test_normalize_golden_cases() {
    let normalizer = TextNormalizer::new();

    for case in get_normalize_cases() {
        assert_eq!(
            normalizer.normalize(case.input),
            case.expected,
            "Case {}: normalize({:?})",
            case.id,
            case.input
        );
    }
}

#[test]
fn test_all_strength_units() {
    let cases: [(&str, f64); 9] = [
        ("500mg", 500.0),
        ("500 MG", 500.0),
        ("0.5mg", 0.5),
        ("1 G", 1000.0),
        ("250 mcg", 0.25),
        ("2kg", 2_000_000.0),
        ("500mg/5ml", 500.0),
        ("5", 5.0),
        ("abc", 0.0),
    ];

    for (input, expected) in cases {
        let actual = normalize_strength(input);
        assert!(
            (actual - expected).abs() < 1e-9,
            "normalize_strength({:?}) = {}, expected {}",
            input,
            actual,
            expected
        );
    }
}

#[test]
fn test_all_package_size_shapes() {
    let cases: [(&str, Option<f64>, Option<&str>); 9] = [
        ("2x15", Some(30.0), None),
        ("2 x 15 Tablets", Some(30.0), Some("TABLET")),
        ("3*10 capsules", Some(30.0), Some("CAPSULE")),
        ("BOTTLE OF 100ML", Some(100.0), Some("BOTTLE ML")),
        ("100 Tablets", Some(100.0), Some("TABLET")),
        ("30", Some(30.0), None),
        ("10's", Some(10.0), None),
        ("Pack (3x10)", Some(30.0), None),
        ("assorted", None, None),
    ];

    for (input, amount, unit) in cases {
        let parsed = extract_package_size(input);
        assert_eq!(parsed.amount, amount, "amount for {:?}", input);
        assert_eq!(parsed.unit.as_deref(), unit, "unit for {:?}", input);
        assert_eq!(parsed.raw, input.trim(), "raw for {:?}", input);
    }
}

#[test]
fn test_all_price_formats() {
    let cases: [(&str, f64); 8] = [
        ("12.50", 12.5),
        ("$1,250.00", 1250.0),
        ("AED 45", 45.0),
        ("12,50", 12.5),
        ("1,250,000", 1_250_000.0),
        ("", 0.0),
        ("free", 0.0),
        ("-3", 0.0),
    ];

    for (input, expected) in cases {
        let actual = clean_price(input);
        assert!(
            (actual - expected).abs() < 1e-9,
            "clean_price({:?}) = {}, expected {}",
            input,
            actual,
            expected
        );
    }
}

/// Decomposition case.
struct IngredientCase {
    id: &'static str,
    generic_name: &'static str,
    expected: &'static [&'static str],
}

fn get_ingredient_cases() -> Vec<IngredientCase> {
    vec![
        IngredientCase {
            id: "plus",
            generic_name: "Paracetamol + Caffeine",
            expected: &["PARACETAMOL", "CAFFEINE"],
        },
        IngredientCase {
            id: "single",
            generic_name: "Paracetamol",
            expected: &["PARACETAMOL"],
        },
        IngredientCase {
            id: "ampersand",
            generic_name: "Amoxicillin & Clavulanic Acid",
            expected: &["AMOXICILLIN", "CLAVULANIC ACID"],
        },
        IngredientCase {
            id: "slash",
            generic_name: "Sulfamethoxazole/Trimethoprim",
            expected: &["SULFAMETHOXAZOLE", "TRIMETHOPRIM"],
        },
        IngredientCase {
            id: "and-word",
            generic_name: "Hydrochlorothiazide and Losartan",
            expected: &["HYDROCHLOROTHIAZIDE", "LOSARTAN"],
        },
        IngredientCase {
            id: "with-word",
            generic_name: "Codeine with Paracetamol",
            expected: &["CODEINE", "PARACETAMOL"],
        },
        IngredientCase {
            id: "compound-marker",
            generic_name: "Aspirin Compound",
            expected: &["ASPIRIN"],
        },
        IngredientCase {
            id: "short-token-dropped",
            generic_name: "Vit B + C",
            expected: &["VITAMIN B"],
        },
        IngredientCase {
            id: "form-suffix-stripped",
            generic_name: "The Ibuprofen tablet",
            expected: &["IBUPROFEN"],
        },
        IngredientCase {
            id: "salt-expanded",
            generic_name: "Metformin HCl tab",
            expected: &["METFORMIN HYDROCHLORIDE"],
        },
        IngredientCase {
            id: "duplicates-merged",
            generic_name: "Paracetamol + paracetamol",
            expected: &["PARACETAMOL"],
        },
        IngredientCase {
            id: "empty",
            generic_name: "",
            expected: &[],
        },
    ]
}

#[test]
fn test_ingredient_golden_cases() {
    let decomposer = CombinationDecomposer::new();

    for case in get_ingredient_cases() {
        let ingredients: Vec<String> = decomposer
            .extract_ingredients(case.generic_name)
            .into_iter()
            .collect();
        assert_eq!(
            ingredients, case.expected,
            "Case {}: extract_ingredients({:?})",
            case.id, case.generic_name
        );
    }
}

#[test]
fn test_combination_similarity_penalizes_missing_ingredient() {
    let decomposer = CombinationDecomposer::new();

    let full = decomposer.combination_similarity("Paracetamol + Caffeine", "Caffeine + Paracetamol");
    assert!((full - 1.0).abs() < 1e-9);

    // One of two ingredients matched exactly, the other has no counterpart
    let partial = decomposer.combination_similarity("Paracetamol + Caffeine", "Paracetamol");
    assert!((partial - 0.5).abs() < 1e-9, "got {}", partial);

    assert_eq!(decomposer.combination_similarity("Paracetamol", ""), 0.0);
}
