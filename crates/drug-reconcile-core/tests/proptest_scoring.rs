//! Property-based tests for scoring and the run loop.
//!
//! Scorers must never panic on arbitrary cell text, and the key invariants
//! (weights sum to one, symmetric scores, one bucket per source) must hold
//! across random inputs.

use drug_reconcile_core::config::default_base_weights;
use drug_reconcile_core::matcher::{
    clean_price, extract_package_size, AttributeScorer, PriceMatcher, WeightingPolicy,
};
use drug_reconcile_core::{
    Attribute, ConfidenceLevel, DrugRecord, MatchConfig, MatchingEngine, RunControl,
    SimilarityVector, WeightScheme, WeightVector,
};
use proptest::prelude::*;

fn similarities(values: [f64; 8]) -> SimilarityVector {
    SimilarityVector {
        brand: values[0],
        generic: values[1],
        strength: values[2],
        dosage: values[3],
        price: values[4],
        package_size: values[5],
        unit: values[6],
        unit_category: values[7],
        ..SimilarityVector::default()
    }
}

fn scheme() -> impl Strategy<Value = WeightScheme> {
    prop_oneof![Just(WeightScheme::Extended), Just(WeightScheme::Legacy)]
}

/// Records drawn from a small vocabulary so that matches actually happen.
fn drug_record() -> impl Strategy<Value = DrugRecord> {
    (
        prop::sample::select(vec!["Panadol", "Brufen", "Zyrtec", "Augmentin", ""]),
        prop::sample::select(vec![
            "Paracetamol",
            "Ibuprofen",
            "Cetirizine",
            "Amoxicillin + Clavulanic Acid",
            "",
        ]),
        prop::sample::select(vec!["500mg", "400 MG", "10mg", "1 g", ""]),
        prop::sample::select(vec!["Tablet", "Tab", "Syrup", "Capsule", ""]),
        prop::sample::select(vec![0.0, 8.0, 10.0, 12.0, 80.0]),
    )
        .prop_map(|(brand, generic, strength, dosage, price)| {
            DrugRecord::new("", brand, generic, strength, dosage, price)
        })
}

fn with_codes(mut records: Vec<DrugRecord>, prefix: &str) -> Vec<DrugRecord> {
    for (index, record) in records.iter_mut().enumerate() {
        record.code = format!("{prefix}{index}");
    }
    records
}

proptest! {
    #[test]
    fn resolved_weights_sum_to_one(
        values in prop::array::uniform8(0.0f64..=1.0),
        scheme in scheme(),
    ) {
        let resolved = WeightingPolicy::new(scheme)
            .resolve(&default_base_weights(), &similarities(values));
        prop_assert!((resolved.weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resolved_weights_sum_to_one_for_any_base(
        base in prop::array::uniform5(0.01f64..=1.0),
        values in prop::array::uniform8(0.0f64..=1.0),
        scheme in scheme(),
    ) {
        let base = WeightVector::from_pairs([
            (Attribute::Brand, base[0]),
            (Attribute::Generic, base[1]),
            (Attribute::Strength, base[2]),
            (Attribute::Dosage, base[3]),
            (Attribute::Price, base[4]),
        ]);
        let resolved = WeightingPolicy::new(scheme).resolve(&base, &similarities(values));
        prop_assert!((resolved.weights.total() - 1.0).abs() < 1e-9);
        for (_, weight) in resolved.weights.iter() {
            prop_assert!(weight >= 0.0);
        }
    }

    #[test]
    fn categorical_self_similarity(text in "[A-Za-z][A-Za-z ]{0,19}") {
        prop_assume!(!text.trim().eq_ignore_ascii_case("nan"));
        let scorer = AttributeScorer::new();

        prop_assert_eq!(scorer.brand_similarity(&text, &text), 1.0);
        prop_assert_eq!(scorer.dosage_similarity(&text, &text), 1.0);
        prop_assert_eq!(scorer.unit_similarity(&text, &text), 1.0);
        prop_assert_eq!(scorer.unit_category_similarity(&text, &text), 1.0);

        prop_assert_eq!(scorer.brand_similarity(&text, ""), 0.0);
        prop_assert_eq!(scorer.dosage_similarity(&text, ""), 0.0);
        prop_assert_eq!(scorer.unit_similarity(&text, ""), 0.0);
        prop_assert_eq!(scorer.unit_category_similarity("", &text), 0.0);
    }

    #[test]
    fn price_similarity_is_symmetric(a in -100.0f64..10_000.0, b in -100.0f64..10_000.0) {
        let prices = PriceMatcher::default();
        let forward = prices.similarity(a, b);
        prop_assert_eq!(forward, prices.similarity(b, a));
        prop_assert!((0.0..=1.0).contains(&forward));
    }

    #[test]
    fn strength_similarity_is_symmetric(a in 1u32..5000, b in 1u32..5000) {
        let scorer = AttributeScorer::new();
        let (a, b) = (format!("{a}mg"), format!("{b} MG"));

        let forward = scorer.strength_similarity(&a, &b);
        prop_assert_eq!(forward, scorer.strength_similarity(&b, &a));
        prop_assert!((0.0..=1.0).contains(&forward));
        prop_assert_eq!(scorer.strength_similarity(&a, &a), 1.0);
    }

    #[test]
    fn confidence_follows_thresholds(score in 0.0f64..=1.0) {
        let expected = if score >= 0.95 {
            ConfidenceLevel::VeryHigh
        } else if score >= 0.85 {
            ConfidenceLevel::High
        } else if score >= 0.75 {
            ConfidenceLevel::Medium
        } else if score >= 0.65 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        };
        prop_assert_eq!(ConfidenceLevel::from_score(score), expected);
    }

    #[test]
    fn cell_parsers_never_panic(text in "\\PC{0,60}") {
        let price = clean_price(&text);
        prop_assert!(price.is_finite() && price >= 0.0);

        let parsed = extract_package_size(&text);
        prop_assert_eq!(parsed.raw.as_str(), text.trim());

        let scorer = AttributeScorer::new();
        let similarity = scorer.package_size_similarity(&text, "2x15 tablets");
        prop_assert!((0.0..=1.0).contains(&similarity));
    }
}

proptest! {
    // Each case runs a full |sources| x |targets| match
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_source_lands_in_one_bucket(
        sources in prop::collection::vec(drug_record(), 0..6),
        targets in prop::collection::vec(drug_record(), 0..6),
        bidirectional in any::<bool>(),
    ) {
        let sources = with_codes(sources, "D");
        let targets = with_codes(targets, "T");
        let mut config = MatchConfig::default();
        config.bidirectional = bidirectional;
        let engine = MatchingEngine::new(config).unwrap();

        let run = engine.run(&sources, &targets, RunControl::new()).unwrap();

        prop_assert_eq!(run.processed_count(), sources.len());
        for source in &sources {
            let candidates: Vec<_> = run
                .candidates
                .iter()
                .filter(|c| c.source.code == source.code)
                .collect();
            let unmatched = run
                .unmatched_sources
                .iter()
                .filter(|u| u.record.code == source.code)
                .count();

            if candidates.is_empty() {
                prop_assert_eq!(unmatched, 1);
                continue;
            }
            prop_assert_eq!(unmatched, 0);

            let best: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_best_for_source)
                .map(|(position, _)| position)
                .collect();
            prop_assert_eq!(best.len(), 1);

            let top = candidates
                .iter()
                .map(|c| c.overall_score)
                .fold(f64::MIN, f64::max);
            let first_top = candidates
                .iter()
                .position(|c| c.overall_score == top)
                .unwrap();
            prop_assert_eq!(best[0], first_top);
        }

        for target in &run.unmatched_targets {
            prop_assert!(!run.candidates.iter().any(|c| c.target.code == target.record.code));
        }
    }
}
