//! Matching engine.
//!
//! Scores every source record against every target record, resolves weights
//! per pair, and sorts each source into exactly one bucket: one or more
//! candidates at or above the threshold, or a single unmatched record.
//!
//! The run is single-threaded. Between source records the engine reports
//! progress, checks for cancellation and the optional time budget, and hands
//! the resolved record to the sink.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigResult, MatchConfig, MatchMode};
use crate::models::{
    ConfidenceLevel, DrugRecord, ListSide, MatchCandidate, SimilarityVector, UnmatchedRecord,
};

use super::generic::GenericNameMatcher;
use super::price::PriceMatcher;
use super::similarity::AttributeScorer;
use super::sink::ResultSink;
use super::weighting::{ResolvedWeights, WeightingPolicy};

/// Run-level failures. The completed in-memory result is always carried.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("storage unavailable: all {attempted} result writes failed")]
    StorageUnavailable { attempted: usize, run: Box<MatchRun> },
}

pub type RunResult<T> = Result<T, RunError>;

impl RunError {
    /// The results computed before the failure was detected.
    pub fn into_run(self) -> MatchRun {
        match self {
            RunError::StorageUnavailable { run, .. } => *run,
        }
    }
}

/// A fresh batch id (UUID v4).
pub fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Receives `(processed, total)` after each source record.
pub trait ProgressObserver {
    fn on_progress(&mut self, processed: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: FnMut(usize, usize),
{
    fn on_progress(&mut self, processed: usize, total: usize) {
        self(processed, total)
    }
}

/// External controls for one run.
#[derive(Default)]
pub struct RunControl<'a> {
    batch_id: Option<String>,
    sink: Option<&'a mut dyn ResultSink>,
    progress: Option<&'a mut dyn ProgressObserver>,
    cancel: Option<Arc<AtomicBool>>,
    resume_sources: HashSet<String>,
    resume_targets: HashSet<String>,
    time_budget: Option<Duration>,
}

impl<'a> RunControl<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing batch id instead of generating one.
    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_sink(mut self, sink: &'a mut dyn ResultSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, progress: &'a mut dyn ProgressObserver) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Stop between source records once the flag is set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Skip source records whose codes were already processed.
    pub fn resume_from<I>(mut self, processed_codes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.resume_sources.extend(processed_codes);
        self
    }

    /// Leave these target codes out of the reverse pass.
    ///
    /// A resumed batch already holds rows for targets matched or reported
    /// unmatched by earlier segments.
    pub fn resume_targets_from<I>(mut self, stored_codes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.resume_targets.extend(stored_codes);
        self
    }

    /// Stop between source records once the run has taken this long.
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    fn should_stop(&self, started: Instant) -> bool {
        let cancelled = self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed));
        let out_of_time = self
            .time_budget
            .is_some_and(|budget| started.elapsed() >= budget);
        cancelled || out_of_time
    }

    fn report(&mut self, processed: usize, total: usize) {
        if let Some(progress) = self.progress.as_deref_mut() {
            progress.on_progress(processed, total);
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRun {
    pub batch_id: String,
    pub config: MatchConfig,
    pub source_count: usize,
    pub target_count: usize,
    pub candidates: Vec<MatchCandidate>,
    pub unmatched_sources: Vec<UnmatchedRecord>,
    /// Targets no source matched (bidirectional runs only)
    pub unmatched_targets: Vec<UnmatchedRecord>,
    /// Records successfully handed to the sink
    pub saved: usize,
    /// Records the sink failed to store
    pub not_saved: usize,
    /// Source records skipped because a previous run processed them
    pub skipped: usize,
    pub cancelled: bool,
    pub started_at: String,
    pub processing_time_ms: u64,
}

impl MatchRun {
    fn new(batch_id: String, config: MatchConfig, source_count: usize, target_count: usize) -> Self {
        Self {
            batch_id,
            config,
            source_count,
            target_count,
            candidates: Vec::new(),
            unmatched_sources: Vec::new(),
            unmatched_targets: Vec::new(),
            saved: 0,
            not_saved: 0,
            skipped: 0,
            cancelled: false,
            started_at: chrono::Utc::now().to_rfc3339(),
            processing_time_ms: 0,
        }
    }

    /// Candidates flagged as the best for their source record.
    pub fn best_candidates(&self) -> impl Iterator<Item = &MatchCandidate> {
        self.candidates.iter().filter(|c| c.is_best_for_source)
    }

    /// Source records with at least one candidate.
    pub fn matched_source_count(&self) -> usize {
        self.best_candidates().count()
    }

    /// Source records resolved in this run.
    pub fn processed_count(&self) -> usize {
        self.matched_source_count() + self.unmatched_sources.len()
    }

    pub fn manual_review_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.manual_review).count()
    }
}

/// Similarities, weights and score for one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    pub similarities: SimilarityVector,
    pub resolved: ResolvedWeights,
    pub overall_score: f64,
}

/// Result of scoring one record against the other list.
enum Resolution {
    /// Candidates with the index of their target
    Matched(Vec<(usize, MatchCandidate)>),
    Unmatched(UnmatchedRecord),
}

pub struct MatchingEngine {
    config: MatchConfig,
    scorer: AttributeScorer,
    prices: PriceMatcher,
    policy: WeightingPolicy,
}

impl MatchingEngine {
    /// Create an engine, validating the configuration first.
    pub fn new(mut config: MatchConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            prices: config.price_matcher(),
            policy: WeightingPolicy::new(config.weight_scheme),
            scorer: AttributeScorer::new(),
            config,
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Score every attribute of one pair and resolve its weights.
    pub fn score_pair(
        &self,
        generic: &GenericNameMatcher,
        source: &DrugRecord,
        target: &DrugRecord,
    ) -> PairScore {
        let generic_detail = generic.best_match(&source.generic_name, &target.generic_name);
        let similarities = SimilarityVector {
            brand: self
                .scorer
                .brand_similarity(&source.brand_name, &target.brand_name),
            generic: generic_detail.final_score,
            strength: self
                .scorer
                .strength_similarity(&source.strength, &target.strength),
            dosage: self
                .scorer
                .dosage_similarity(&source.dosage_form, &target.dosage_form),
            price: self.prices.similarity(source.price, target.price),
            package_size: self
                .scorer
                .package_size_similarity(&source.package_size, &target.package_size),
            unit: self.scorer.unit_similarity(&source.unit, &target.unit),
            unit_category: self
                .scorer
                .unit_category_similarity(&source.unit_category, &target.unit_category),
            generic_detail,
        };

        let resolved = self.policy.resolve(&self.config.base_weights, &similarities);
        let overall_score = resolved.weights.apply(&similarities).clamp(0.0, 1.0);

        PairScore {
            similarities,
            resolved,
            overall_score,
        }
    }

    /// Reconcile `sources` against `targets`.
    ///
    /// Returns the full in-memory result even when some writes failed. Only when
    /// every attempted write failed is the run reported as
    /// [`RunError::StorageUnavailable`], still carrying the result.
    pub fn run(
        &self,
        sources: &[DrugRecord],
        targets: &[DrugRecord],
        mut control: RunControl<'_>,
    ) -> RunResult<MatchRun> {
        let started = Instant::now();
        let batch_id = control
            .batch_id
            .take()
            .unwrap_or_else(new_batch_id);
        let mut run = MatchRun::new(batch_id, self.config.clone(), sources.len(), targets.len());

        info!(
            batch_id = %run.batch_id,
            sources = sources.len(),
            targets = targets.len(),
            mode = ?self.config.mode,
            bidirectional = self.config.bidirectional,
            resumed = control.resume_sources.len(),
            "starting match run"
        );

        let mut generic = GenericNameMatcher::new();
        generic.train(targets.iter().map(|t| t.generic_name.as_str()));

        let total = sources.len();
        let mut referenced_targets: HashSet<usize> = HashSet::new();

        for (index, source) in sources.iter().enumerate() {
            if control.should_stop(started) {
                run.cancelled = true;
                info!(processed = index, total, "match run stopped early");
                break;
            }

            if control.resume_sources.contains(&source.code) {
                run.skipped += 1;
                control.report(index + 1, total);
                continue;
            }

            let processed_at = chrono::Utc::now().to_rfc3339();
            match self.resolve(&generic, source, targets, ListSide::Source, &processed_at) {
                Resolution::Matched(scored) => {
                    let candidates: Vec<MatchCandidate> = scored
                        .into_iter()
                        .map(|(target_index, candidate)| {
                            referenced_targets.insert(target_index);
                            candidate
                        })
                        .collect();
                    debug!(code = %source.code, candidates = candidates.len(), "source matched");

                    if let Some(sink) = control.sink.as_deref_mut() {
                        let outcome = sink.save_matches(&run.batch_id, &candidates, &processed_at);
                        record_save(&mut run, &source.code, outcome);
                    }
                    run.candidates.extend(candidates);
                }
                Resolution::Unmatched(unmatched) => {
                    debug!(
                        code = %source.code,
                        best_score = unmatched.best_score_seen,
                        "source unmatched"
                    );

                    if let Some(sink) = control.sink.as_deref_mut() {
                        let outcome = sink.save_unmatched(
                            &run.batch_id,
                            ListSide::Source,
                            &unmatched,
                            &processed_at,
                        );
                        record_save(&mut run, &source.code, outcome);
                    }
                    run.unmatched_sources.push(unmatched);
                }
            }

            control.report(index + 1, total);
        }

        if self.config.bidirectional {
            if run.cancelled {
                info!("skipping reverse pass for a stopped run");
            } else {
                self.reverse_pass(sources, targets, &referenced_targets, &mut run, &mut control);
            }
        }

        run.processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            batch_id = %run.batch_id,
            candidates = run.candidates.len(),
            matched = run.matched_source_count(),
            unmatched_sources = run.unmatched_sources.len(),
            unmatched_targets = run.unmatched_targets.len(),
            skipped = run.skipped,
            not_saved = run.not_saved,
            cancelled = run.cancelled,
            elapsed_ms = run.processing_time_ms,
            "match run finished"
        );

        let attempted = run.saved + run.not_saved;
        if attempted > 0 && run.saved == 0 {
            return Err(RunError::StorageUnavailable {
                attempted,
                run: Box::new(run),
            });
        }
        Ok(run)
    }

    /// Score one record against every record of `others`.
    fn resolve(
        &self,
        generic: &GenericNameMatcher,
        record: &DrugRecord,
        others: &[DrugRecord],
        side: ListSide,
        processed_at: &str,
    ) -> Resolution {
        if others.is_empty() {
            let missing = match side {
                ListSide::Source => "targets",
                ListSide::Target => "sources",
            };
            return Resolution::Unmatched(UnmatchedRecord {
                record: record.clone(),
                best_score_seen: 0.0,
                best_candidate_code: None,
                reason: format!("no {missing} available"),
                processed_at: processed_at.to_string(),
            });
        }

        let threshold = self.config.threshold;
        let mut best_seen: Option<(usize, f64)> = None;
        let mut candidates: Vec<(usize, MatchCandidate)> = Vec::new();

        for (index, other) in others.iter().enumerate() {
            let pair = self.score_pair(generic, record, other);
            let score = pair.overall_score;

            if score > best_seen.map_or(0.0, |(_, best)| best) {
                best_seen = Some((index, score));
            }

            if score >= threshold {
                candidates.push((
                    index,
                    MatchCandidate {
                        source: record.clone(),
                        target: other.clone(),
                        similarities: pair.similarities,
                        weights: pair.resolved.weights,
                        overall_score: score,
                        confidence: ConfidenceLevel::from_score(score),
                        is_best_for_source: false,
                        manual_review: pair.resolved.manual_review,
                        processed_at: processed_at.to_string(),
                    },
                ));
            }
        }

        // First candidate wins ties
        let winner = candidates
            .iter()
            .enumerate()
            .fold(None::<(usize, f64)>, |best, (position, (_, candidate))| match best {
                Some((_, score)) if candidate.overall_score <= score => best,
                _ => Some((position, candidate.overall_score)),
            })
            .map(|(position, _)| position);

        let Some(winner) = winner else {
            return Resolution::Unmatched(UnmatchedRecord {
                record: record.clone(),
                best_score_seen: best_seen.map_or(0.0, |(_, score)| score),
                best_candidate_code: best_seen.map(|(index, _)| others[index].code.clone()),
                reason: format!("no matches above threshold {threshold}"),
                processed_at: processed_at.to_string(),
            });
        };

        candidates[winner].1.is_best_for_source = true;
        if self.config.mode == MatchMode::SingleBest {
            candidates = vec![candidates.swap_remove(winner)];
        }
        Resolution::Matched(candidates)
    }

    /// Surface targets that no source matched.
    ///
    /// Each unreferenced target is scored against all sources with the roles
    /// swapped. Those still below the threshold become unmatched targets. No
    /// candidates are created here. Targets a resumed batch already stored are
    /// skipped.
    fn reverse_pass(
        &self,
        sources: &[DrugRecord],
        targets: &[DrugRecord],
        referenced: &HashSet<usize>,
        run: &mut MatchRun,
        control: &mut RunControl<'_>,
    ) {
        let mut generic = GenericNameMatcher::new();
        generic.train(sources.iter().map(|s| s.generic_name.as_str()));

        let pending: Vec<&DrugRecord> = targets
            .iter()
            .enumerate()
            .filter(|(index, target)| {
                !referenced.contains(index) && !control.resume_targets.contains(&target.code)
            })
            .map(|(_, target)| target)
            .collect();
        debug!(
            pending = pending.len(),
            already_stored = control.resume_targets.len(),
            "starting reverse pass"
        );

        for target in pending {
            let processed_at = chrono::Utc::now().to_rfc3339();
            let Resolution::Unmatched(unmatched) =
                self.resolve(&generic, target, sources, ListSide::Target, &processed_at)
            else {
                debug!(code = %target.code, "target reaches threshold in reverse");
                continue;
            };

            if let Some(sink) = control.sink.as_deref_mut() {
                let outcome =
                    sink.save_unmatched(&run.batch_id, ListSide::Target, &unmatched, &processed_at);
                record_save(run, &target.code, outcome);
            }
            run.unmatched_targets.push(unmatched);
        }
    }
}

fn record_save(run: &mut MatchRun, code: &str, outcome: super::sink::SinkResult<()>) {
    match outcome {
        Ok(()) => run.saved += 1,
        Err(err) => {
            run.not_saved += 1;
            warn!(code, error = %err, "failed to persist result");
        }
    }
}
