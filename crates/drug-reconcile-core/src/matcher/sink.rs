//! Persistence collaborator interface.
//!
//! The engine hands each resolved record to a [`ResultSink`] and never assumes
//! the write succeeded. Failures are counted and logged per record.

use thiserror::Error;

use crate::models::{ListSide, MatchCandidate, UnmatchedRecord};

/// Persistence errors reported by a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("record {code} rejected: {reason}")]
    Rejected { code: String, reason: String },
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Receives resolved records as the engine produces them.
pub trait ResultSink {
    /// Store every candidate emitted for one source record.
    fn save_matches(
        &mut self,
        batch_id: &str,
        candidates: &[MatchCandidate],
        processed_at: &str,
    ) -> SinkResult<()>;

    /// Store one record that found no candidate.
    fn save_unmatched(
        &mut self,
        batch_id: &str,
        side: ListSide,
        unmatched: &UnmatchedRecord,
        processed_at: &str,
    ) -> SinkResult<()>;
}

/// Collects results in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub matches: Vec<(String, MatchCandidate)>,
    pub unmatched: Vec<(String, ListSide, UnmatchedRecord)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for MemorySink {
    fn save_matches(
        &mut self,
        batch_id: &str,
        candidates: &[MatchCandidate],
        _processed_at: &str,
    ) -> SinkResult<()> {
        self.matches.extend(
            candidates
                .iter()
                .map(|candidate| (batch_id.to_string(), candidate.clone())),
        );
        Ok(())
    }

    fn save_unmatched(
        &mut self,
        batch_id: &str,
        side: ListSide,
        unmatched: &UnmatchedRecord,
        _processed_at: &str,
    ) -> SinkResult<()> {
        self.unmatched
            .push((batch_id.to_string(), side, unmatched.clone()));
        Ok(())
    }
}
