//! Aggregate statistics over a run.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::matcher::{MatchRun, PriceVerdict};
use crate::models::{Attribute, ConfidenceLevel, DrugRecord, GenericMethod};

/// Counts, per-attribute means and histograms for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub batch_id: String,
    pub counts: SummaryCounts,
    /// Percentage of processed source records with a candidate
    pub match_rate: f64,
    /// Mean similarity per attribute over best-for-source candidates
    pub mean_similarity: BTreeMap<Attribute, f64>,
    /// Best-for-source candidates per confidence level, highest first
    pub confidence_histogram: IndexMap<ConfidenceLevel, usize>,
    /// Best-for-source candidates per dominant generic-name technique
    pub generic_methods: IndexMap<GenericMethod, usize>,
    pub price: PriceStats,
    pub processing_time_ms: u64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryCounts {
    pub sources: usize,
    pub targets: usize,
    pub matched_sources: usize,
    pub candidates: usize,
    pub unmatched_sources: usize,
    pub unmatched_targets: usize,
    /// Targets that appear in no candidate
    pub targets_without_candidates: usize,
    pub manual_review: usize,
    pub skipped: usize,
    pub not_saved: usize,
}

/// Price agreement over best-for-source candidates with both prices known.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceStats {
    pub priced_pairs: usize,
    pub mean_absolute_difference: f64,
    pub mean_percentage_difference: f64,
    pub verdicts: IndexMap<PriceVerdict, usize>,
}

impl RunSummary {
    /// Summarize a run against the lists it was computed from.
    pub fn build(run: &MatchRun, sources: &[DrugRecord], targets: &[DrugRecord]) -> Self {
        let best: Vec<_> = run.best_candidates().collect();

        let referenced: HashSet<&str> = run
            .candidates
            .iter()
            .map(|c| c.target.code.as_str())
            .collect();
        let targets_without_candidates = targets
            .iter()
            .filter(|t| !referenced.contains(t.code.as_str()))
            .count();

        let counts = SummaryCounts {
            sources: sources.len(),
            targets: targets.len(),
            matched_sources: best.len(),
            candidates: run.candidates.len(),
            unmatched_sources: run.unmatched_sources.len(),
            unmatched_targets: run.unmatched_targets.len(),
            targets_without_candidates,
            manual_review: run.manual_review_count(),
            skipped: run.skipped,
            not_saved: run.not_saved,
        };

        let processed = counts.matched_sources + counts.unmatched_sources;
        let match_rate = if processed > 0 {
            counts.matched_sources as f64 / processed as f64 * 100.0
        } else {
            0.0
        };

        let mean_similarity = Attribute::ALL
            .iter()
            .map(|attribute| {
                let mean = if best.is_empty() {
                    0.0
                } else {
                    best.iter()
                        .map(|c| c.similarities.get(*attribute))
                        .sum::<f64>()
                        / best.len() as f64
                };
                (*attribute, mean)
            })
            .collect();

        let mut confidence_histogram: IndexMap<ConfidenceLevel, usize> =
            ConfidenceLevel::ALL.iter().map(|level| (*level, 0)).collect();
        let mut generic_methods: IndexMap<GenericMethod, usize> = IndexMap::new();
        for candidate in &best {
            *confidence_histogram.entry(candidate.confidence).or_insert(0) += 1;
            *generic_methods
                .entry(candidate.similarities.generic_detail.method)
                .or_insert(0) += 1;
        }

        let prices = run.config.price_matcher();
        let mut price = PriceStats::default();
        let mut total_difference = 0.0;
        let mut total_percentage = 0.0;
        for analysis in best
            .iter()
            .filter_map(|c| prices.analyze(c.source.price, c.target.price))
        {
            price.priced_pairs += 1;
            total_difference += analysis.difference;
            total_percentage += analysis.percentage_diff;
            *price.verdicts.entry(analysis.verdict).or_insert(0) += 1;
        }
        if price.priced_pairs > 0 {
            price.mean_absolute_difference = total_difference / price.priced_pairs as f64;
            price.mean_percentage_difference = total_percentage / price.priced_pairs as f64;
        }

        Self {
            batch_id: run.batch_id.clone(),
            counts,
            match_rate,
            mean_similarity,
            confidence_histogram,
            generic_methods,
            price,
            processing_time_ms: run.processing_time_ms,
            cancelled: run.cancelled,
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text report for terminals.
    pub fn render_text(&self) -> String {
        let c = &self.counts;
        let mut out = String::new();

        out.push_str(&format!("Batch {}\n", self.batch_id));
        out.push_str(&format!(
            "  sources: {}  targets: {}  skipped: {}\n",
            c.sources, c.targets, c.skipped
        ));
        out.push_str(&format!(
            "  matched sources: {} ({:.1}%)  candidates: {}  manual review: {}\n",
            c.matched_sources, self.match_rate, c.candidates, c.manual_review
        ));
        out.push_str(&format!(
            "  unmatched sources: {}  unmatched targets: {}  targets without candidates: {}\n",
            c.unmatched_sources, c.unmatched_targets, c.targets_without_candidates
        ));
        if c.not_saved > 0 {
            out.push_str(&format!("  not saved: {}\n", c.not_saved));
        }

        out.push_str("Confidence\n");
        for (level, count) in &self.confidence_histogram {
            out.push_str(&format!("  {:<10} {}\n", level.label(), count));
        }

        out.push_str("Mean similarity\n");
        for (attribute, mean) in &self.mean_similarity {
            out.push_str(&format!("  {:<14} {:.3}\n", attribute.key(), mean));
        }

        if self.price.priced_pairs > 0 {
            out.push_str(&format!(
                "Price: {} pairs, mean difference {:.2} ({:.1}%)\n",
                self.price.priced_pairs,
                self.price.mean_absolute_difference,
                self.price.mean_percentage_difference
            ));
        }
        if self.cancelled {
            out.push_str("Run stopped before all sources were processed\n");
        }
        out.push_str(&format!("Elapsed: {} ms\n", self.processing_time_ms));

        out
    }
}
