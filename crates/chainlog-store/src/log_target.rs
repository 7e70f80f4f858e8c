//! The pair of store files behind one logging target
//!
//! `{user}_responses_all_fields_{experiment}.csv` holds every field of every
//! record; `{user}_responses_subset_of_fields_{experiment}.csv` holds the
//! responses-only view used to browse inputs and outputs quickly.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::tabular::TabularWriter;

pub const ALL_FIELDS: &str = "responses_all_fields";
pub const SUBSET_OF_FIELDS: &str = "responses_subset_of_fields";

/// Columns of the responses-only view, in order.
pub const SUBSET_COLUMNS: &[&str] = &["run_id", "input", "response", "start_time", "duration_in_seconds"];

/// Optional columns copied into the view only when present.
pub const SUBSET_OPTIONAL_COLUMNS: &[&str] = &["rating", "comments"];

/// Build the responses-only view of a full record.
pub fn responses_subset(record: &Map<String, Value>) -> Map<String, Value> {
    let mut subset = Map::new();
    for column in SUBSET_COLUMNS {
        subset.insert(
            column.to_string(),
            record.get(*column).cloned().unwrap_or(Value::Null),
        );
    }
    for column in SUBSET_OPTIONAL_COLUMNS {
        if let Some(value) = record.get(*column) {
            subset.insert(column.to_string(), value.clone());
        }
    }
    subset
}

/// Full-fidelity and responses-only files for one user and experiment.
#[derive(Debug)]
pub struct LogTarget {
    dir: PathBuf,
    user_name: String,
    experiment_name: String,
    writer: TabularWriter,
}

impl LogTarget {
    pub fn new(
        dir: impl Into<PathBuf>,
        user_name: impl Into<String>,
        experiment_name: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            user_name: user_name.into(),
            experiment_name: experiment_name.into(),
            writer: TabularWriter::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, whats_logged: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}.csv",
            self.user_name.replace(' ', "_"),
            whats_logged,
            self.experiment_name
        ))
    }

    pub fn all_fields_path(&self) -> PathBuf {
        self.file_path(ALL_FIELDS)
    }

    pub fn subset_path(&self) -> PathBuf {
        self.file_path(SUBSET_OF_FIELDS)
    }

    /// Write the full record and (optionally) its responses-only view.
    ///
    /// Both files are checked before either is rewritten, so they gain the
    /// new row together or not at all.
    pub fn write(&self, record: &Map<String, Value>, with_subset: bool) -> Result<()> {
        let all_path = self.all_fields_path();
        if !with_subset {
            self.writer.append(&all_path, record)?;
            info!(path = %all_path.display(), "saved responses all fields");
            return Ok(());
        }

        let subset_path = self.subset_path();
        let subset = responses_subset(record);
        self.writer
            .append_all(&[(all_path.as_path(), record), (subset_path.as_path(), &subset)])?;
        info!(path = %all_path.display(), "saved responses all fields");
        info!(path = %subset_path.display(), "saved responses subset of fields");
        Ok(())
    }
}
