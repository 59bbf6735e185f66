//! CSV input loader.
//!
//! Columns are positional: `code, brand_name, generic_name, strength,
//! dosage_form, price, package_size, unit, unit_category`. The header row is
//! skipped, rows may be short, and garbled cells degrade to empty values.

use std::io;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;

use crate::models::DrugRecord;

/// Input loading errors.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },

    #[error("malformed CSV at line {line}: {source}")]
    Csv { line: u64, source: csv::Error },
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Load drug records from a headered CSV file.
pub fn load_csv<P: AsRef<Path>>(path: P) -> LoadResult<Vec<DrugRecord>> {
    let path = path.as_ref();
    let reader = builder().from_path(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let records = collect(reader)?;
    tracing::info!(path = %path.display(), records = records.len(), "loaded drug list");
    Ok(records)
}

/// Read drug records from any headered CSV source.
pub fn read_records<R: io::Read>(reader: R) -> LoadResult<Vec<DrugRecord>> {
    collect(builder().from_reader(reader))
}

fn builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(true).flexible(true).trim(Trim::All);
    builder
}

fn collect<R: io::Read>(mut reader: csv::Reader<R>) -> LoadResult<Vec<DrugRecord>> {
    let mut records = Vec::new();
    let mut row = StringRecord::new();

    loop {
        let line = reader.position().line();
        match reader.read_record(&mut row) {
            Ok(true) => {}
            Ok(false) => break,
            Err(source) => return Err(LoadError::Csv { line, source }),
        }

        if row.iter().all(str::is_empty) {
            continue;
        }
        records.push(DrugRecord::from_row(&row.iter().collect::<Vec<_>>()));
    }

    Ok(records)
}
