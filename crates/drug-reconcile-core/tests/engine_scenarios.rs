//! End-to-end matching runs.

use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drug_reconcile_core::matcher::{MemorySink, SinkResult};
use drug_reconcile_core::{
    input_fingerprint, new_batch_id, reconcile_files, Attribute, ConfidenceLevel, Database,
    DbError, DrugRecord, ListSide, MatchCandidate,
    MatchConfig, MatchMode, MatchRun, MatchingEngine, ReconcileError, ResultSink, RunControl,
    RunError, SinkError, UnmatchedRecord,
};

fn record(code: &str, brand: &str, generic: &str, strength: &str, dosage: &str, price: f64) -> DrugRecord {
    DrugRecord::new(code, brand, generic, strength, dosage, price)
}

fn panadol(code: &str) -> DrugRecord {
    record(code, "Panadol", "Paracetamol", "500mg", "Tablet", 10.0)
}

fn zyrtec(code: &str) -> DrugRecord {
    record(code, "Zyrtec", "Cetirizine", "10mg", "Syrup", 80.0)
}

fn engine_with(configure: impl FnOnce(&mut MatchConfig)) -> MatchingEngine {
    let mut config = MatchConfig::default();
    configure(&mut config);
    MatchingEngine::new(config).unwrap()
}

/// Each source code lands in exactly one bucket.
fn assert_one_bucket_per_source(run: &MatchRun, sources: &[DrugRecord]) {
    for source in sources {
        let best = run
            .best_candidates()
            .filter(|c| c.source.code == source.code)
            .count();
        let unmatched = run
            .unmatched_sources
            .iter()
            .filter(|u| u.record.code == source.code)
            .count();
        assert_eq!(best + unmatched, 1, "source {} is in {} buckets", source.code, best + unmatched);
    }
}

#[test]
fn test_identical_records_match_with_very_high_confidence() {
    let sources = vec![record("D1", "BrandX", "Paracetamol", "500mg", "Tablet", 10.0)];
    let targets = vec![record("T1", "BrandX", "Paracetamol", "500mg", "Tablet", 10.0)];

    let run = engine_with(|_| {}).run(&sources, &targets, RunControl::new()).unwrap();

    assert_eq!(run.candidates.len(), 1);
    let candidate = &run.candidates[0];
    assert!((candidate.overall_score - 1.0).abs() < 1e-9);
    assert_eq!(candidate.confidence, ConfidenceLevel::VeryHigh);
    assert!(candidate.is_best_for_source);
    assert!(run.unmatched_sources.is_empty());
}

#[test]
fn test_empty_target_list_leaves_sources_unmatched() {
    let sources = vec![panadol("D1"), zyrtec("D2")];

    let run = engine_with(|_| {}).run(&sources, &[], RunControl::new()).unwrap();

    assert!(run.candidates.is_empty());
    assert_eq!(run.unmatched_sources.len(), 2);
    for unmatched in &run.unmatched_sources {
        assert_eq!(unmatched.best_score_seen, 0.0);
        assert_eq!(unmatched.best_candidate_code, None);
        assert!(unmatched.reason.contains("no targets"), "reason: {}", unmatched.reason);
    }
}

#[test]
fn test_strong_brand_with_different_strength_needs_review() {
    let sources = vec![record("D1", "BrandX", "Paracetamol", "500mg", "Tablet", 10.0)];
    let targets = vec![record("T1", "BrandX", "Paracetamol", "1000mg", "Tablet", 10.0)];

    let engine = engine_with(|config| config.threshold = 0.5);
    let run = engine.run(&sources, &targets, RunControl::new()).unwrap();

    assert_eq!(run.candidates.len(), 1);
    let candidate = &run.candidates[0];
    assert!(candidate.similarities.brand >= 0.95);
    assert!(candidate.similarities.strength < 0.8);
    assert!(candidate.manual_review);
    assert_eq!(candidate.weights.weight(Attribute::Generic), 0.0);
    assert_eq!(run.manual_review_count(), 1);
}

#[test]
fn test_ties_go_to_first_target() {
    let sources = vec![panadol("D1")];
    let targets = vec![panadol("T1"), panadol("T2"), zyrtec("T3")];

    let run = engine_with(|_| {}).run(&sources, &targets, RunControl::new()).unwrap();

    let codes: Vec<&str> = run.candidates.iter().map(|c| c.target.code.as_str()).collect();
    assert_eq!(codes, vec!["T1", "T2"]);
    assert!(run.candidates[0].is_best_for_source);
    assert!(!run.candidates[1].is_best_for_source);
}

#[test]
fn test_mixed_lists_keep_one_bucket_per_source() {
    let sources = vec![
        panadol("D1"),
        zyrtec("D2"),
        record("D3", "Brufen", "Ibuprofen", "400mg", "Tablet", 8.0),
        record("D4", "", "", "", "", 0.0),
    ];
    let targets = vec![
        panadol("T1"),
        record("T2", "Brufen", "Ibuprofen", "400mg", "Tablet", 9.0),
        record("T3", "Brufen", "Ibuprofen", "400 mg", "Tab", 8.5),
    ];

    let run = engine_with(|_| {}).run(&sources, &targets, RunControl::new()).unwrap();

    assert_one_bucket_per_source(&run, &sources);
    assert_eq!(run.processed_count(), sources.len());
    for candidate in &run.candidates {
        assert!(candidate.overall_score >= 0.7);
    }
}

#[test]
fn test_bidirectional_reports_unreferenced_targets() {
    let sources = vec![panadol("D1")];
    let targets = vec![panadol("T1"), zyrtec("T2")];

    let engine = engine_with(|config| config.bidirectional = true);
    let mut sink = MemorySink::new();
    let run = engine
        .run(&sources, &targets, RunControl::new().with_sink(&mut sink))
        .unwrap();

    assert_eq!(run.matched_source_count(), 1);
    assert_eq!(run.unmatched_targets.len(), 1);
    let unmatched = &run.unmatched_targets[0];
    assert_eq!(unmatched.record.code, "T2");
    assert_eq!(unmatched.best_candidate_code.as_deref(), Some("D1"));
    assert_eq!(unmatched.reason, "no matches above threshold 0.7");

    assert_eq!(sink.unmatched.len(), 1);
    assert_eq!(sink.unmatched[0].1, ListSide::Target);
    assert_eq!(run.saved, 2);
}

#[test]
fn test_bidirectional_with_no_sources() {
    let targets = vec![panadol("T1")];

    let engine = engine_with(|config| config.bidirectional = true);
    let run = engine.run(&[], &targets, RunControl::new()).unwrap();

    assert_eq!(run.unmatched_targets.len(), 1);
    assert!(run.unmatched_targets[0].reason.contains("no sources"));
}

#[test]
fn test_single_best_losers_are_not_reported_unmatched() {
    let sources = vec![panadol("D1")];
    let targets = vec![panadol("T1"), panadol("T2")];

    let engine = engine_with(|config| {
        config.mode = MatchMode::SingleBest;
        config.bidirectional = true;
    });
    let run = engine.run(&sources, &targets, RunControl::new()).unwrap();

    assert_eq!(run.candidates.len(), 1);
    assert_eq!(run.candidates[0].target.code, "T1");
    // T2 still reaches the threshold when scored in reverse
    assert!(run.unmatched_targets.is_empty());
}

#[test]
fn test_cancel_flag_stops_between_records() {
    let sources = vec![panadol("D1"), panadol("D2"), zyrtec("D3")];
    let targets = vec![panadol("T1")];

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let mut observer = move |processed: usize, _total: usize| {
        if processed == 1 {
            flag.store(true, Ordering::Relaxed);
        }
    };

    let engine = engine_with(|config| config.bidirectional = true);
    let run = engine
        .run(
            &sources,
            &targets,
            RunControl::new()
                .with_progress(&mut observer)
                .with_cancel_flag(cancel),
        )
        .unwrap();

    assert!(run.cancelled);
    assert_eq!(run.processed_count(), 1);
    assert_eq!(run.candidates[0].source.code, "D1");
    // No reverse pass after a stop
    assert!(run.unmatched_targets.is_empty());
}

#[test]
fn test_exhausted_time_budget_processes_nothing() {
    let sources = vec![panadol("D1"), zyrtec("D2")];
    let targets = vec![panadol("T1")];

    let run = engine_with(|_| {})
        .run(
            &sources,
            &targets,
            RunControl::new().with_time_budget(Duration::ZERO),
        )
        .unwrap();

    assert!(run.cancelled);
    assert_eq!(run.processed_count(), 0);
}

#[test]
fn test_resume_skips_persisted_sources() {
    let sources = vec![panadol("D1"), panadol("D2"), zyrtec("D3")];
    let targets = vec![panadol("T1")];
    let engine = engine_with(|_| {});
    let mut db = Database::open_in_memory().unwrap();

    // First run stops after one source record
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let mut observer = move |_: usize, _: usize| flag.store(true, Ordering::Relaxed);
    let first = engine
        .run(
            &sources,
            &targets,
            RunControl::new()
                .with_sink(&mut db)
                .with_progress(&mut observer)
                .with_cancel_flag(cancel),
        )
        .unwrap();
    assert!(first.cancelled);
    assert_eq!(first.saved, 1);
    db.record_run(&first, "fingerprint").unwrap();

    let processed = db.processed_source_codes(&first.batch_id).unwrap();
    assert_eq!(processed.len(), 1);
    assert!(processed.contains("D1"));

    let second = engine
        .run(
            &sources,
            &targets,
            RunControl::new()
                .with_batch_id(first.batch_id.clone())
                .resume_from(processed)
                .with_sink(&mut db),
        )
        .unwrap();
    assert!(!second.cancelled);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.saved, 2);
    assert_eq!(second.matched_source_count(), 1);
    assert_eq!(second.unmatched_sources.len(), 1);
    db.record_run(&second, "fingerprint").unwrap();

    let counts = db.count_by_status(Some(&first.batch_id)).unwrap();
    assert_eq!(counts.matched, 2);
    assert_eq!(counts.unmatched_sources, 1);

    let stored = db.get_run(&first.batch_id).unwrap().unwrap();
    assert_eq!(stored.matched_count, 2);
    assert_eq!(stored.unmatched_source_count, 1);
    assert_eq!(stored.saved, 3);
    assert!(!stored.cancelled);
}

#[test]
fn test_resume_batch_interrupted_before_bookkeeping() {
    let sources = vec![panadol("D1"), panadol("D2"), zyrtec("D3")];
    let targets = vec![panadol("T1")];
    let engine = engine_with(|_| {});
    let mut db = Database::open_in_memory().unwrap();
    let fingerprint = input_fingerprint(&sources, &targets).unwrap();
    let batch_id = new_batch_id();

    assert!(db
        .begin_run(&batch_id, engine.config(), &fingerprint, sources.len(), targets.len())
        .unwrap());

    // The process dies after one source record: results are stored but the
    // run is never recorded
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let mut observer = move |_: usize, _: usize| flag.store(true, Ordering::Relaxed);
    engine
        .run(
            &sources,
            &targets,
            RunControl::new()
                .with_batch_id(batch_id.clone())
                .with_sink(&mut db)
                .with_progress(&mut observer)
                .with_cancel_flag(cancel),
        )
        .unwrap();

    let unfinished = db.get_run(&batch_id).unwrap().unwrap();
    assert!(unfinished.cancelled);
    assert_eq!(unfinished.matched_count, 0);

    let other_inputs = input_fingerprint(&sources[..1], &targets).unwrap();
    assert!(matches!(
        db.resume_point(&batch_id, &other_inputs),
        Err(DbError::FingerprintMismatch { .. })
    ));

    let point = db.resume_point(&batch_id, &fingerprint).unwrap();
    assert_eq!(point.source_codes, HashSet::from(["D1".to_string()]));

    let resumed = engine
        .run(
            &sources,
            &targets,
            RunControl::new()
                .with_batch_id(batch_id.clone())
                .resume_from(point.source_codes)
                .resume_targets_from(point.target_codes)
                .with_sink(&mut db),
        )
        .unwrap();
    assert_eq!(resumed.skipped, 1);
    db.record_run(&resumed, &fingerprint).unwrap();

    let stored = db.get_run(&batch_id).unwrap().unwrap();
    assert!(!stored.cancelled);
    assert_eq!(stored.matched_count, 2);
    assert_eq!(stored.unmatched_source_count, 1);
    assert_eq!(db.count_by_status(Some(&batch_id)).unwrap().total(), 3);
}

#[test]
fn test_resuming_finished_bidirectional_batch_adds_nothing() {
    let sources = vec![panadol("D1"), zyrtec("D2")];
    let targets = vec![
        panadol("T1"),
        record("T2", "Lipitor", "Atorvastatin", "20mg", "Tablet", 90.0),
        record("T3", "Ventolin", "Salbutamol", "100mcg", "Inhaler", 25.0),
    ];
    let engine = engine_with(|config| config.bidirectional = true);
    let mut db = Database::open_in_memory().unwrap();
    let fingerprint = input_fingerprint(&sources, &targets).unwrap();

    let first = engine
        .run(&sources, &targets, RunControl::new().with_sink(&mut db))
        .unwrap();
    assert_eq!(first.unmatched_targets.len(), 2);
    db.record_run(&first, &fingerprint).unwrap();
    let before = db.count_by_status(Some(&first.batch_id)).unwrap();

    let point = db.resume_point(&first.batch_id, &fingerprint).unwrap();
    assert_eq!(point.target_codes.len(), 3);
    let again = engine
        .run(
            &sources,
            &targets,
            RunControl::new()
                .with_batch_id(first.batch_id.clone())
                .resume_from(point.source_codes)
                .resume_targets_from(point.target_codes)
                .with_sink(&mut db),
        )
        .unwrap();
    assert_eq!(again.skipped, 2);
    assert!(again.unmatched_targets.is_empty());
    db.record_run(&again, &fingerprint).unwrap();

    assert_eq!(db.count_by_status(Some(&first.batch_id)).unwrap(), before);
    let stored = db.get_run(&first.batch_id).unwrap().unwrap();
    assert_eq!(stored.unmatched_target_count, 2);
    assert_eq!(stored.matched_count, 1);
}

struct BrokenSink;

impl ResultSink for BrokenSink {
    fn save_matches(&mut self, _: &str, _: &[MatchCandidate], _: &str) -> SinkResult<()> {
        Err(SinkError::Unavailable("connection refused".into()))
    }

    fn save_unmatched(&mut self, _: &str, _: ListSide, _: &UnmatchedRecord, _: &str) -> SinkResult<()> {
        Err(SinkError::Unavailable("connection refused".into()))
    }
}

#[test]
fn test_unavailable_storage_still_returns_results() {
    let sources = vec![panadol("D1"), zyrtec("D2")];
    let targets = vec![panadol("T1")];

    let mut sink = BrokenSink;
    let err = engine_with(|_| {})
        .run(&sources, &targets, RunControl::new().with_sink(&mut sink))
        .unwrap_err();

    assert!(matches!(err, RunError::StorageUnavailable { attempted: 2, .. }));
    let run = err.into_run();
    assert_eq!(run.not_saved, 2);
    assert_eq!(run.saved, 0);
    assert_one_bucket_per_source(&run, &sources);
    assert!(!run.candidates_csv().unwrap().is_empty());
}

fn write_csv(dir: &tempfile::TempDir, name: &str, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "code,brand,generic,strength,dosage,price,package,unit,category").unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    path
}

#[test]
fn test_reconcile_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_csv(
        &dir,
        "source.csv",
        &[
            "D1,Panadol,Paracetamol,500mg,Tablet,10.00,2x10,tablet,solid",
            "D2,Zyrtec,Cetirizine,10mg,Syrup,\"$80\"",
        ],
    );
    let target = write_csv(
        &dir,
        "target.csv",
        &["T1,PANADOL,Paracetamol,500 MG,Tab,10,20 tablets,Tablet,Solid"],
    );

    let run = reconcile_files(&source, &target, MatchConfig::default()).unwrap();

    assert_eq!(run.source_count, 2);
    assert_eq!(run.matched_source_count(), 1);
    assert_eq!(run.candidates[0].target.code, "T1");
    assert_eq!(run.unmatched_sources[0].record.code, "D2");
}

#[test]
fn test_reconcile_files_errors() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_csv(&dir, "target.csv", &["T1,Panadol,Paracetamol,500mg,Tablet,10"]);

    let missing = dir.path().join("missing.csv");
    let err = reconcile_files(&missing, &target, MatchConfig::default()).unwrap_err();
    assert!(matches!(err, ReconcileError::Load(_)));

    let mut config = MatchConfig::default();
    config.threshold = 1.5;
    let err = reconcile_files(&target, &target, config).unwrap_err();
    assert!(matches!(err, ReconcileError::Config(_)));
}
