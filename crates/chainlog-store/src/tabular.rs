//! Schema-evolving CSV table
//!
//! Every append is a full schema migration: the existing header and rows are
//! read back, the column set is widened to the union of old and new columns,
//! and the whole file is rewritten. Rows are never dropped and columns never
//! disappear; missing values are the empty cell.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::error::{Result, StoreError};
use crate::flatten::{flatten_record, render_cell};

/// In-memory copy of a store file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at `row` in column `name`; empty string for nulls.
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let col = self.column(name)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

/// What an append changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// The file did not exist before this append
    pub created: bool,
    /// Columns this append introduced
    pub added_columns: Vec<String>,
    /// Rows in the file after the append
    pub total_rows: usize,
}

/// Appends records to CSV files, one writer at a time.
#[derive(Debug, Default)]
pub struct TabularWriter {
    lock: Mutex<()>,
}

impl TabularWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` to the table at `path`, widening its schema as needed.
    pub fn append(&self, path: &Path, record: &Map<String, Value>) -> Result<AppendOutcome> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let (table, outcome) = widen(path, record)?;
        commit(path, &table)?;
        Ok(outcome)
    }

    /// Append one record to each of several tables.
    ///
    /// Every table is read back and checked before any file is rewritten, so a
    /// corrupt or unreadable table leaves all of them untouched.
    pub fn append_all(
        &self,
        entries: &[(&Path, &Map<String, Value>)],
    ) -> Result<Vec<AppendOutcome>> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let planned = entries
            .iter()
            .map(|(path, record)| widen(path, record))
            .collect::<Result<Vec<_>>>()?;

        let mut outcomes = Vec::with_capacity(planned.len());
        for ((path, _), (table, outcome)) in entries.iter().zip(planned) {
            commit(path, &table)?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

/// The table at `path` with `record` appended, not yet written.
fn widen(path: &Path, record: &Map<String, Value>) -> Result<(Table, AppendOutcome)> {
    let flat = flatten_record(record);

    if !path.exists() {
        let table = Table {
            headers: flat.keys().cloned().collect(),
            rows: vec![flat.values().map(render_cell).collect()],
        };
        let outcome = AppendOutcome {
            created: true,
            added_columns: table.headers.clone(),
            total_rows: 1,
        };
        return Ok((table, outcome));
    }

    let mut table = read_table(path)?;

    let known: HashSet<&str> = table.headers.iter().map(String::as_str).collect();
    let added_columns: Vec<String> = flat
        .keys()
        .filter(|k| !known.contains(k.as_str()))
        .cloned()
        .collect();

    if !added_columns.is_empty() {
        debug!(path = %path.display(), columns = ?added_columns, "Widening store schema");
        table.headers.extend(added_columns.iter().cloned());
        for row in &mut table.rows {
            row.resize(table.headers.len(), String::new());
        }
    }

    let new_row = table
        .headers
        .iter()
        .map(|h| flat.get(h).map(render_cell).unwrap_or_default())
        .collect();
    table.rows.push(new_row);

    let outcome = AppendOutcome {
        created: false,
        added_columns,
        total_rows: table.len(),
    };
    Ok((table, outcome))
}

fn commit(path: &Path, table: &Table) -> Result<()> {
    if let Err(e) = write_table(path, table) {
        error!(path = %path.display(), error = %e, "Failed to rewrite store");
        return Err(e);
    }
    info!(path = %path.display(), rows = table.len(), columns = table.headers.len(), "Wrote store");
    Ok(())
}

/// Read a whole store file. Any parse failure is reported as corruption.
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| StoreError::corrupt(path, e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(StoreError::corrupt(path, "missing header row"));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = headers.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(StoreError::corrupt(path, format!("duplicate column '{}'", dup)));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| StoreError::corrupt(path, e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { headers, rows })
}

/// Rewrite `path` with `table` through a sibling temporary file.
fn write_table(path: &Path, table: &Table) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
