//! SQLite store for match results and run bookkeeping.
//!
//! `drug_results` holds one row per emitted candidate or unmatched record;
//! `match_runs` holds one row per batch. A batch row is written before the
//! first result so an interrupted batch can always be resumed.

mod results;
mod runs;
mod schema;

pub use results::*;
pub use runs::*;
pub use schema::*;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use crate::matcher::SinkError;

/// Result store errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("unknown batch {0}")]
    UnknownBatch(String),

    #[error("batch {batch_id} was run against different input lists")]
    FingerprintMismatch { batch_id: String },
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for SinkError {
    fn from(err: DbError) -> Self {
        SinkError::Unavailable(err.to_string())
    }
}

/// Handle on a results database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the results file at `path`, creating tables on first use.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Throwaway in-memory store.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Underlying connection, for ad hoc queries against the result tables.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction; one source record's candidates commit together.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}
