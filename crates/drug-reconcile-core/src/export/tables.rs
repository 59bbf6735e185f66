//! JSON and CSV export of a run.

use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::matcher::MatchRun;
use crate::models::{
    ConfidenceLevel, DrugRecord, GenericMethod, ListSide, MatchCandidate, UnmatchedRecord,
};

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// One candidate per line, same fields as the JSON export.
#[derive(Serialize)]
struct CandidateRow<'a> {
    batch_id: &'a str,
    source_code: &'a str,
    source_brand_name: &'a str,
    source_generic_name: &'a str,
    source_strength: &'a str,
    source_dosage_form: &'a str,
    source_price: f64,
    source_package_size: &'a str,
    source_unit: &'a str,
    source_unit_category: &'a str,
    target_code: &'a str,
    target_brand_name: &'a str,
    target_generic_name: &'a str,
    target_strength: &'a str,
    target_dosage_form: &'a str,
    target_price: f64,
    target_package_size: &'a str,
    target_unit: &'a str,
    target_unit_category: &'a str,
    brand_similarity: f64,
    generic_similarity: f64,
    strength_similarity: f64,
    dosage_similarity: f64,
    price_similarity: f64,
    package_size_similarity: f64,
    unit_similarity: f64,
    unit_category_similarity: f64,
    fuzzy_score: f64,
    vector_score: f64,
    semantic_score: f64,
    overall_score: f64,
    confidence_level: ConfidenceLevel,
    matching_method: GenericMethod,
    /// JSON object {attribute: weight}
    applied_weights: String,
    is_best_for_source: bool,
    manual_review: bool,
    processed_at: &'a str,
}

impl<'a> CandidateRow<'a> {
    fn new(batch_id: &'a str, candidate: &'a MatchCandidate) -> ExportResult<Self> {
        let (source, target) = (&candidate.source, &candidate.target);
        let sims = &candidate.similarities;
        let generic = &sims.generic_detail;

        Ok(Self {
            batch_id,
            source_code: &source.code,
            source_brand_name: &source.brand_name,
            source_generic_name: &source.generic_name,
            source_strength: &source.strength,
            source_dosage_form: &source.dosage_form,
            source_price: source.price,
            source_package_size: &source.package_size,
            source_unit: &source.unit,
            source_unit_category: &source.unit_category,
            target_code: &target.code,
            target_brand_name: &target.brand_name,
            target_generic_name: &target.generic_name,
            target_strength: &target.strength,
            target_dosage_form: &target.dosage_form,
            target_price: target.price,
            target_package_size: &target.package_size,
            target_unit: &target.unit,
            target_unit_category: &target.unit_category,
            brand_similarity: sims.brand,
            generic_similarity: sims.generic,
            strength_similarity: sims.strength,
            dosage_similarity: sims.dosage,
            price_similarity: sims.price,
            package_size_similarity: sims.package_size,
            unit_similarity: sims.unit,
            unit_category_similarity: sims.unit_category,
            fuzzy_score: generic.fuzzy_score,
            vector_score: generic.vector_score,
            semantic_score: generic.semantic_score,
            overall_score: candidate.overall_score,
            confidence_level: candidate.confidence,
            matching_method: generic.method,
            applied_weights: serde_json::to_string(&candidate.weights)?,
            is_best_for_source: candidate.is_best_for_source,
            manual_review: candidate.manual_review,
            processed_at: &candidate.processed_at,
        })
    }
}

#[derive(Serialize)]
struct UnmatchedRow<'a> {
    batch_id: &'a str,
    list_side: ListSide,
    code: &'a str,
    brand_name: &'a str,
    generic_name: &'a str,
    strength: &'a str,
    dosage_form: &'a str,
    price: f64,
    package_size: &'a str,
    unit: &'a str,
    unit_category: &'a str,
    best_score_seen: f64,
    best_candidate_code: Option<&'a str>,
    reason: &'a str,
    processed_at: &'a str,
}

impl<'a> UnmatchedRow<'a> {
    fn new(batch_id: &'a str, side: ListSide, unmatched: &'a UnmatchedRecord) -> Self {
        let DrugRecord {
            code,
            brand_name,
            generic_name,
            strength,
            dosage_form,
            price,
            package_size,
            unit,
            unit_category,
        } = &unmatched.record;

        Self {
            batch_id,
            list_side: side,
            code,
            brand_name,
            generic_name,
            strength,
            dosage_form,
            price: *price,
            package_size,
            unit,
            unit_category,
            best_score_seen: unmatched.best_score_seen,
            best_candidate_code: unmatched.best_candidate_code.as_deref(),
            reason: &unmatched.reason,
            processed_at: &unmatched.processed_at,
        }
    }
}

impl MatchRun {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write one row per candidate, with a header.
    pub fn write_candidates_csv<W: io::Write>(&self, writer: W) -> ExportResult<()> {
        let mut csv = csv::WriterBuilder::new().from_writer(writer);
        for candidate in &self.candidates {
            csv.serialize(CandidateRow::new(&self.batch_id, candidate)?)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write one row per unmatched record, sources first.
    ///
    /// Source and target rows share a header; `list_side` tells them apart.
    pub fn write_unmatched_csv<W: io::Write>(&self, writer: W) -> ExportResult<()> {
        let mut csv = csv::WriterBuilder::new().from_writer(writer);
        let rows = self
            .unmatched_sources
            .iter()
            .map(|u| (ListSide::Source, u))
            .chain(self.unmatched_targets.iter().map(|u| (ListSide::Target, u)));
        for (side, unmatched) in rows {
            csv.serialize(UnmatchedRow::new(&self.batch_id, side, unmatched))?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Candidates as CSV text.
    pub fn candidates_csv(&self) -> ExportResult<String> {
        let mut buffer = Vec::new();
        self.write_candidates_csv(&mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Unmatched records as CSV text.
    pub fn unmatched_csv(&self) -> ExportResult<String> {
        let mut buffer = Vec::new();
        self.write_unmatched_csv(&mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
