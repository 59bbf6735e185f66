//! SQLite schema definition.

/// Complete database schema for reconciliation results.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Drug Results
-- ============================================================================
-- One row per emitted candidate (MATCHED) or unmatched record (UNMATCHED).
-- The record_* columns hold the record being resolved; for target-side
-- UNMATCHED rows that is the target record.

CREATE TABLE IF NOT EXISTS drug_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('MATCHED', 'UNMATCHED')),
    list_side TEXT NOT NULL DEFAULT 'source' CHECK (list_side IN ('source', 'target')),

    record_code TEXT NOT NULL,
    record_brand_name TEXT NOT NULL DEFAULT '',
    record_generic_name TEXT NOT NULL DEFAULT '',
    record_strength TEXT NOT NULL DEFAULT '',
    record_dosage_form TEXT NOT NULL DEFAULT '',
    record_price REAL NOT NULL DEFAULT 0.0,
    record_package_size TEXT NOT NULL DEFAULT '',
    record_unit TEXT NOT NULL DEFAULT '',
    record_unit_category TEXT NOT NULL DEFAULT '',

    match_code TEXT,
    match_brand_name TEXT,
    match_generic_name TEXT,
    match_strength TEXT,
    match_dosage_form TEXT,
    match_price REAL,
    match_package_size TEXT,
    match_unit TEXT,
    match_unit_category TEXT,

    brand_similarity REAL,
    generic_similarity REAL,
    strength_similarity REAL,
    dosage_similarity REAL,
    price_similarity REAL,
    package_size_similarity REAL,
    unit_similarity REAL,
    unit_category_similarity REAL,
    overall_score REAL,
    confidence_level TEXT,
    fuzzy_score REAL,
    vector_score REAL,
    semantic_score REAL,
    matching_method TEXT,
    applied_weights TEXT,                        -- JSON object {attribute: weight}
    is_best_for_source INTEGER NOT NULL DEFAULT 0,
    manual_review INTEGER NOT NULL DEFAULT 0,

    best_match_score REAL NOT NULL DEFAULT 0.0,
    best_match_code TEXT,
    search_reason TEXT,

    processed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_batch ON drug_results(batch_id);
CREATE INDEX IF NOT EXISTS idx_results_batch_code ON drug_results(batch_id, list_side, record_code);
CREATE INDEX IF NOT EXISTS idx_results_status ON drug_results(status);

-- ============================================================================
-- Match Runs
-- ============================================================================

CREATE TABLE IF NOT EXISTS match_runs (
    batch_id TEXT PRIMARY KEY,
    config TEXT NOT NULL,                        -- JSON MatchConfig
    input_fingerprint TEXT NOT NULL,             -- SHA-256 hex of both input lists
    source_count INTEGER NOT NULL DEFAULT 0,
    target_count INTEGER NOT NULL DEFAULT 0,
    candidate_count INTEGER NOT NULL DEFAULT 0,
    matched_count INTEGER NOT NULL DEFAULT 0,
    unmatched_source_count INTEGER NOT NULL DEFAULT 0,
    unmatched_target_count INTEGER NOT NULL DEFAULT 0,
    saved INTEGER NOT NULL DEFAULT 0,
    not_saved INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    cancelled INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    processing_time_ms INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
