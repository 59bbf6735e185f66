//! Drug Reconcile Core Library
//!
//! Matching engine for reconciling two pharmaceutical drug catalogs.
//!
//! # Architecture
//!
//! ```text
//! source.csv ─┐                        ┌─ MatchCandidate (≥ threshold, one flagged best)
//!             ├─ Loader ─ MatchingEngine┤
//! target.csv ─┘      │                 └─ UnmatchedRecord (best score seen + reason)
//!                    │
//!     per pair: TextNormalizer → attribute scorers → GenericNameMatcher
//!                    → WeightingPolicy → Σ similarity × weight
//!                                       │
//!                         ┌─────────────┼─────────────┐
//!                         ▼             ▼             ▼
//!                    ResultSink     RunSummary    CSV / JSON
//!                    (SQLite)
//! ```
//!
//! # Core Principle
//!
//! **Every source record lands in exactly one bucket.** It either has one or
//! more candidates at or above the threshold, or exactly one unmatched record.
//! Persistence failures never drop a record from the in-memory result.
//!
//! # Modules
//!
//! - [`matcher`]: normalization, attribute scorers, weighting and the engine
//! - [`models`]: domain types (DrugRecord, MatchCandidate, WeightVector, etc.)
//! - [`config`]: matching configuration and validation
//! - [`loader`]: positional CSV input
//! - [`db`]: SQLite result store
//! - [`export`]: run summary, CSV and JSON export

pub mod config;
pub mod db;
pub mod export;
pub mod loader;
pub mod matcher;
pub mod models;

// Re-export commonly used types
pub use config::{ConfigError, MatchConfig, MatchMode, WeightScheme};
pub use db::{input_fingerprint, Database, DbError, ResumePoint};
pub use export::{ExportError, RunSummary};
pub use loader::{load_csv, LoadError};
pub use matcher::{
    new_batch_id, MatchRun, MatchingEngine, ProgressObserver, ResultSink, RunControl, RunError,
    SinkError,
};
pub use models::{
    Attribute, ConfidenceLevel, DrugRecord, ListSide, MatchCandidate, SimilarityVector,
    UnmatchedRecord, WeightVector,
};

use std::path::Path;

use thiserror::Error;

/// Any error the library can surface.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Load(#[from] LoadError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Persistence error: {0}")]
    Sink(#[from] SinkError),

    #[error("Run failed: {0}")]
    Run(#[from] RunError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Load two CSV catalogs and reconcile them in memory.
///
/// Nothing is persisted. Use [`MatchingEngine::run`] with a [`RunControl`]
/// for sinks, progress, cancellation or resuming.
pub fn reconcile_files<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    target: Q,
    config: MatchConfig,
) -> ReconcileResult<MatchRun> {
    let engine = MatchingEngine::new(config)?;
    let sources = load_csv(source)?;
    let targets = load_csv(target)?;
    Ok(engine.run(&sources, &targets, RunControl::new())?)
}
