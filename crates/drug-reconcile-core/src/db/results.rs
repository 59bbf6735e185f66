//! Result persistence: one row per candidate or unmatched record.

use std::collections::HashSet;

use rusqlite::{params, Connection};

use super::{Database, DbError, DbResult};
use crate::matcher::{ResultSink, SinkResult};
use crate::models::{ConfidenceLevel, DrugRecord, ListSide, MatchCandidate, UnmatchedRecord};

/// Row status in `drug_results`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    Matched,
    Unmatched,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Matched => "MATCHED",
            ResultStatus::Unmatched => "UNMATCHED",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "MATCHED" => Some(ResultStatus::Matched),
            "UNMATCHED" => Some(ResultStatus::Unmatched),
            _ => None,
        }
    }
}

/// A persisted result row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub id: i64,
    pub batch_id: String,
    pub status: ResultStatus,
    pub side: ListSide,
    /// The record that was resolved
    pub record: DrugRecord,
    /// The matched counterpart (MATCHED rows only)
    pub matched: Option<DrugRecord>,
    pub overall_score: Option<f64>,
    pub confidence: Option<ConfidenceLevel>,
    pub matching_method: Option<String>,
    pub is_best_for_source: bool,
    pub manual_review: bool,
    pub best_match_score: f64,
    pub best_match_code: Option<String>,
    pub search_reason: Option<String>,
    pub processed_at: String,
}

/// Row counts per status and side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Candidate rows
    pub matched: usize,
    pub unmatched_sources: usize,
    pub unmatched_targets: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.matched + self.unmatched_sources + self.unmatched_targets
    }
}

const SELECT_COLUMNS: &str = r#"
    id, batch_id, status, list_side,
    record_code, record_brand_name, record_generic_name, record_strength, record_dosage_form,
    record_price, record_package_size, record_unit, record_unit_category,
    match_code, match_brand_name, match_generic_name, match_strength, match_dosage_form,
    match_price, match_package_size, match_unit, match_unit_category,
    overall_score, confidence_level, matching_method, is_best_for_source, manual_review,
    best_match_score, best_match_code, search_reason, processed_at
"#;

impl Database {
    /// Insert one candidate row.
    pub fn insert_candidate(
        &self,
        batch_id: &str,
        candidate: &MatchCandidate,
        processed_at: &str,
    ) -> DbResult<i64> {
        insert_candidate_row(&self.conn, batch_id, candidate, processed_at)
    }

    /// Insert one unmatched row.
    pub fn insert_unmatched(
        &self,
        batch_id: &str,
        side: ListSide,
        unmatched: &UnmatchedRecord,
        processed_at: &str,
    ) -> DbResult<i64> {
        insert_unmatched_row(&self.conn, batch_id, side, unmatched, processed_at)
    }

    /// Source codes already resolved in a batch, for resuming it.
    pub fn processed_source_codes(&self, batch_id: &str) -> DbResult<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT record_code FROM drug_results WHERE batch_id = ? AND list_side = 'source'",
        )?;

        let codes = stmt
            .query_map([batch_id], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(codes)
    }

    /// Target codes a batch already accounts for: matched by a source or
    /// reported unmatched by a reverse pass.
    pub fn stored_target_codes(&self, batch_id: &str) -> DbResult<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT match_code FROM drug_results
             WHERE batch_id = ?1 AND status = 'MATCHED' AND match_code IS NOT NULL
             UNION
             SELECT record_code FROM drug_results
             WHERE batch_id = ?1 AND list_side = 'target'",
        )?;

        let codes = stmt
            .query_map([batch_id], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(codes)
    }

    /// Delete results for one batch, or all results when `batch_id` is `None`.
    pub fn clear_results(&self, batch_id: Option<&str>) -> DbResult<usize> {
        let deleted = match batch_id {
            Some(batch_id) => self
                .conn
                .execute("DELETE FROM drug_results WHERE batch_id = ?", [batch_id])?,
            None => self.conn.execute("DELETE FROM drug_results", [])?,
        };
        Ok(deleted)
    }

    /// Stored results in insertion order, optionally filtered.
    pub fn list_results(
        &self,
        batch_id: Option<&str>,
        status: Option<ResultStatus>,
    ) -> DbResult<Vec<StoredResult>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM drug_results
             WHERE (?1 IS NULL OR batch_id = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt.query_map(params![batch_id, status.map(|s| s.as_str())], |row| {
            Ok(ResultRow {
                id: row.get(0)?,
                batch_id: row.get(1)?,
                status: row.get(2)?,
                list_side: row.get(3)?,
                record: [
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ],
                record_price: row.get(9)?,
                record_packaging: [row.get(10)?, row.get(11)?, row.get(12)?],
                match_code: row.get(13)?,
                matched: [
                    row.get(14)?,
                    row.get(15)?,
                    row.get(16)?,
                    row.get(17)?,
                ],
                match_price: row.get(18)?,
                match_packaging: [row.get(19)?, row.get(20)?, row.get(21)?],
                overall_score: row.get(22)?,
                confidence_level: row.get(23)?,
                matching_method: row.get(24)?,
                is_best_for_source: row.get(25)?,
                manual_review: row.get(26)?,
                best_match_score: row.get(27)?,
                best_match_code: row.get(28)?,
                search_reason: row.get(29)?,
                processed_at: row.get(30)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.try_into()?);
        }
        Ok(results)
    }

    /// Count rows by status and side.
    pub fn count_by_status(&self, batch_id: Option<&str>) -> DbResult<StatusCounts> {
        let mut stmt = self.conn.prepare(
            "SELECT status, list_side, COUNT(*) FROM drug_results
             WHERE (?1 IS NULL OR batch_id = ?1)
             GROUP BY status, list_side",
        )?;

        let rows = stmt.query_map([batch_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, side, count) = row?;
            let count = count as usize;
            match (ResultStatus::from_str(&status), ListSide::from_str(&side)) {
                (Some(ResultStatus::Matched), _) => counts.matched += count,
                (Some(ResultStatus::Unmatched), Some(ListSide::Source)) => {
                    counts.unmatched_sources += count
                }
                (Some(ResultStatus::Unmatched), Some(ListSide::Target)) => {
                    counts.unmatched_targets += count
                }
                _ => return Err(DbError::Constraint(format!("unexpected row {status}/{side}"))),
            }
        }
        Ok(counts)
    }
}

impl ResultSink for Database {
    /// All candidates of one source record land in a single transaction.
    fn save_matches(
        &mut self,
        batch_id: &str,
        candidates: &[MatchCandidate],
        processed_at: &str,
    ) -> SinkResult<()> {
        let tx = self.transaction()?;
        for candidate in candidates {
            insert_candidate_row(&tx, batch_id, candidate, processed_at)?;
        }
        tx.commit().map_err(DbError::from)?;
        Ok(())
    }

    fn save_unmatched(
        &mut self,
        batch_id: &str,
        side: ListSide,
        unmatched: &UnmatchedRecord,
        processed_at: &str,
    ) -> SinkResult<()> {
        self.insert_unmatched(batch_id, side, unmatched, processed_at)?;
        Ok(())
    }
}

fn insert_candidate_row(
    conn: &Connection,
    batch_id: &str,
    candidate: &MatchCandidate,
    processed_at: &str,
) -> DbResult<i64> {
    let weights_json = serde_json::to_string(&candidate.weights)?;
    let source = &candidate.source;
    let target = &candidate.target;
    let sims = &candidate.similarities;

    conn.execute(
        r#"
        INSERT INTO drug_results (
            batch_id, status, list_side,
            record_code, record_brand_name, record_generic_name, record_strength, record_dosage_form,
            record_price, record_package_size, record_unit, record_unit_category,
            match_code, match_brand_name, match_generic_name, match_strength, match_dosage_form,
            match_price, match_package_size, match_unit, match_unit_category,
            brand_similarity, generic_similarity, strength_similarity, dosage_similarity,
            price_similarity, package_size_similarity, unit_similarity, unit_category_similarity,
            overall_score, confidence_level, fuzzy_score, vector_score, semantic_score,
            matching_method, applied_weights, is_best_for_source, manual_review, processed_at
        ) VALUES (
            ?1, 'MATCHED', 'source',
            ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
            ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27,
            ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37
        )
        "#,
        params![
            batch_id,
            source.code,
            source.brand_name,
            source.generic_name,
            source.strength,
            source.dosage_form,
            source.price,
            source.package_size,
            source.unit,
            source.unit_category,
            target.code,
            target.brand_name,
            target.generic_name,
            target.strength,
            target.dosage_form,
            target.price,
            target.package_size,
            target.unit,
            target.unit_category,
            sims.brand,
            sims.generic,
            sims.strength,
            sims.dosage,
            sims.price,
            sims.package_size,
            sims.unit,
            sims.unit_category,
            candidate.overall_score,
            candidate.confidence.label(),
            sims.generic_detail.fuzzy_score,
            sims.generic_detail.vector_score,
            sims.generic_detail.semantic_score,
            sims.generic_detail.method.label(),
            weights_json,
            candidate.is_best_for_source,
            candidate.manual_review,
            processed_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_unmatched_row(
    conn: &Connection,
    batch_id: &str,
    side: ListSide,
    unmatched: &UnmatchedRecord,
    processed_at: &str,
) -> DbResult<i64> {
    let record = &unmatched.record;

    conn.execute(
        r#"
        INSERT INTO drug_results (
            batch_id, status, list_side,
            record_code, record_brand_name, record_generic_name, record_strength, record_dosage_form,
            record_price, record_package_size, record_unit, record_unit_category,
            best_match_score, best_match_code, search_reason, processed_at
        ) VALUES (?1, 'UNMATCHED', ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            batch_id,
            side.as_str(),
            record.code,
            record.brand_name,
            record.generic_name,
            record.strength,
            record.dosage_form,
            record.price,
            record.package_size,
            record.unit,
            record.unit_category,
            unmatched.best_score_seen,
            unmatched.best_candidate_code,
            unmatched.reason,
            processed_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Intermediate row struct for database mapping.
struct ResultRow {
    id: i64,
    batch_id: String,
    status: String,
    list_side: String,
    /// code, brand, generic, strength, dosage form
    record: [String; 5],
    record_price: f64,
    /// package size, unit, unit category
    record_packaging: [String; 3],
    match_code: Option<String>,
    /// brand, generic, strength, dosage form
    matched: [Option<String>; 4],
    match_price: Option<f64>,
    match_packaging: [Option<String>; 3],
    overall_score: Option<f64>,
    confidence_level: Option<String>,
    matching_method: Option<String>,
    is_best_for_source: bool,
    manual_review: bool,
    best_match_score: f64,
    best_match_code: Option<String>,
    search_reason: Option<String>,
    processed_at: String,
}

impl TryFrom<ResultRow> for StoredResult {
    type Error = DbError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let status = ResultStatus::from_str(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("unknown status: {}", row.status)))?;
        let side = ListSide::from_str(&row.list_side)
            .ok_or_else(|| DbError::Constraint(format!("unknown list side: {}", row.list_side)))?;
        let confidence = row
            .confidence_level
            .as_deref()
            .map(|label| {
                ConfidenceLevel::from_label(label)
                    .ok_or_else(|| DbError::Constraint(format!("unknown confidence: {label}")))
            })
            .transpose()?;

        let [code, brand_name, generic_name, strength, dosage_form] = row.record;
        let [package_size, unit, unit_category] = row.record_packaging;
        let record = DrugRecord {
            code,
            brand_name,
            generic_name,
            strength,
            dosage_form,
            price: row.record_price,
            package_size,
            unit,
            unit_category,
        };

        let matched = row.match_code.map(|code| {
            let [brand_name, generic_name, strength, dosage_form] = row.matched;
            let [package_size, unit, unit_category] = row.match_packaging;
            DrugRecord {
                code,
                brand_name: brand_name.unwrap_or_default(),
                generic_name: generic_name.unwrap_or_default(),
                strength: strength.unwrap_or_default(),
                dosage_form: dosage_form.unwrap_or_default(),
                price: row.match_price.unwrap_or_default(),
                package_size: package_size.unwrap_or_default(),
                unit: unit.unwrap_or_default(),
                unit_category: unit_category.unwrap_or_default(),
            }
        });

        Ok(StoredResult {
            id: row.id,
            batch_id: row.batch_id,
            status,
            side,
            record,
            matched,
            overall_score: row.overall_score,
            confidence,
            matching_method: row.matching_method,
            is_best_for_source: row.is_best_for_source,
            manual_review: row.manual_review,
            best_match_score: row.best_match_score,
            best_match_code: row.best_match_code,
            search_reason: row.search_reason,
            processed_at: row.processed_at,
        })
    }
}
