//! Run bookkeeping and input fingerprints.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use super::{Database, DbError, DbResult};
use crate::config::MatchConfig;
use crate::matcher::MatchRun;
use crate::models::DrugRecord;

/// A row of `match_runs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub batch_id: String,
    pub config_json: String,
    pub input_fingerprint: String,
    pub source_count: usize,
    pub target_count: usize,
    pub candidate_count: usize,
    pub matched_count: usize,
    pub unmatched_source_count: usize,
    pub unmatched_target_count: usize,
    pub saved: usize,
    pub not_saved: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub started_at: String,
    pub processing_time_ms: u64,
}

/// What a stored batch has already resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumePoint {
    /// Source codes with a stored row
    pub source_codes: HashSet<String>,
    /// Target codes matched or reported unmatched
    pub target_codes: HashSet<String>,
}

/// SHA-256 (hex) over both input lists.
///
/// Resuming a batch against inputs with a different fingerprint is refused.
pub fn input_fingerprint(sources: &[DrugRecord], targets: &[DrugRecord]) -> DbResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(sources)?);
    hasher.update(b"\x1e");
    hasher.update(serde_json::to_vec(targets)?);
    Ok(hex::encode(hasher.finalize()))
}

impl Database {
    /// Write the bookkeeping row for a batch before any result lands.
    ///
    /// The row has zero counts and reads as cancelled until
    /// [`Self::record_run`] completes it, so a batch killed mid-run can still be
    /// resumed. Returns `false` when the batch already has a row.
    pub fn begin_run(
        &self,
        batch_id: &str,
        config: &MatchConfig,
        fingerprint: &str,
        source_count: usize,
        target_count: usize,
    ) -> DbResult<bool> {
        let config_json = serde_json::to_string(config)?;
        let inserted = self.conn.execute(
            r#"
            INSERT INTO match_runs (
                batch_id, config, input_fingerprint, source_count, target_count,
                cancelled, started_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
            ON CONFLICT(batch_id) DO NOTHING
            "#,
            params![
                batch_id,
                config_json,
                fingerprint,
                source_count as i64,
                target_count as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Insert or update the bookkeeping row for a run.
    ///
    /// A resumed run accumulates onto the existing row: write counters and
    /// processing time are added, and the configuration, fingerprint and start
    /// time are left as first recorded. When the batch has stored results the
    /// result counts are taken from `drug_results` instead, which also covers
    /// segments that died before being recorded.
    pub fn record_run(&self, run: &MatchRun, fingerprint: &str) -> DbResult<()> {
        let config_json = serde_json::to_string(&run.config)?;
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO match_runs (
                batch_id, config, input_fingerprint, source_count, target_count,
                candidate_count, matched_count, unmatched_source_count, unmatched_target_count,
                saved, not_saved, skipped, cancelled, started_at, processing_time_ms, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, datetime('now'))
            ON CONFLICT(batch_id) DO UPDATE SET
                source_count = excluded.source_count,
                target_count = excluded.target_count,
                candidate_count = candidate_count + excluded.candidate_count,
                matched_count = matched_count + excluded.matched_count,
                unmatched_source_count = unmatched_source_count + excluded.unmatched_source_count,
                unmatched_target_count = unmatched_target_count + excluded.unmatched_target_count,
                saved = saved + excluded.saved,
                not_saved = not_saved + excluded.not_saved,
                skipped = excluded.skipped,
                cancelled = excluded.cancelled,
                processing_time_ms = processing_time_ms + excluded.processing_time_ms,
                updated_at = datetime('now')
            "#,
            params![
                run.batch_id,
                config_json,
                fingerprint,
                run.source_count as i64,
                run.target_count as i64,
                run.candidates.len() as i64,
                run.matched_source_count() as i64,
                run.unmatched_sources.len() as i64,
                run.unmatched_targets.len() as i64,
                run.saved as i64,
                run.not_saved as i64,
                run.skipped as i64,
                run.cancelled,
                run.started_at,
                run.processing_time_ms as i64,
            ],
        )?;

        tx.execute(
            r#"
            UPDATE match_runs SET
                candidate_count = (SELECT COUNT(*) FROM drug_results
                    WHERE batch_id = ?1 AND status = 'MATCHED'),
                matched_count = (SELECT COUNT(*) FROM drug_results
                    WHERE batch_id = ?1 AND status = 'MATCHED' AND is_best_for_source = 1),
                unmatched_source_count = (SELECT COUNT(*) FROM drug_results
                    WHERE batch_id = ?1 AND status = 'UNMATCHED' AND list_side = 'source'),
                unmatched_target_count = (SELECT COUNT(*) FROM drug_results
                    WHERE batch_id = ?1 AND status = 'UNMATCHED' AND list_side = 'target')
            WHERE batch_id = ?1
              AND EXISTS (SELECT 1 FROM drug_results WHERE batch_id = ?1)
            "#,
            [&run.batch_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Check that `batch_id` can be resumed against inputs with `fingerprint`
    /// and return what it already stored.
    pub fn resume_point(&self, batch_id: &str, fingerprint: &str) -> DbResult<ResumePoint> {
        match self.run_fingerprint(batch_id)? {
            None => Err(DbError::UnknownBatch(batch_id.to_string())),
            Some(recorded) if recorded != fingerprint => Err(DbError::FingerprintMismatch {
                batch_id: batch_id.to_string(),
            }),
            Some(_) => Ok(ResumePoint {
                source_codes: self.processed_source_codes(batch_id)?,
                target_codes: self.stored_target_codes(batch_id)?,
            }),
        }
    }

    /// Get a run by batch id.
    pub fn get_run(&self, batch_id: &str) -> DbResult<Option<RunRecord>> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT batch_id, config, input_fingerprint, source_count, target_count,
                       candidate_count, matched_count, unmatched_source_count,
                       unmatched_target_count, saved, not_saved, skipped, cancelled,
                       started_at, processing_time_ms
                FROM match_runs
                WHERE batch_id = ?
                "#,
                [batch_id],
                |row| {
                    Ok(RunRecord {
                        batch_id: row.get(0)?,
                        config_json: row.get(1)?,
                        input_fingerprint: row.get(2)?,
                        source_count: row.get::<_, i64>(3)? as usize,
                        target_count: row.get::<_, i64>(4)? as usize,
                        candidate_count: row.get::<_, i64>(5)? as usize,
                        matched_count: row.get::<_, i64>(6)? as usize,
                        unmatched_source_count: row.get::<_, i64>(7)? as usize,
                        unmatched_target_count: row.get::<_, i64>(8)? as usize,
                        saved: row.get::<_, i64>(9)? as usize,
                        not_saved: row.get::<_, i64>(10)? as usize,
                        skipped: row.get::<_, i64>(11)? as usize,
                        cancelled: row.get(12)?,
                        started_at: row.get(13)?,
                        processing_time_ms: row.get::<_, i64>(14)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Fingerprint recorded for a batch, if the batch exists.
    pub fn run_fingerprint(&self, batch_id: &str) -> DbResult<Option<String>> {
        let fingerprint = self
            .conn
            .query_row(
                "SELECT input_fingerprint FROM match_runs WHERE batch_id = ?",
                [batch_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fingerprint)
    }
}
