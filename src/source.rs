//! Where training records come from.
//!
//! The detector pulls records once per `train` call through a
//! [`RecordSource`]. Any closure returning `Result<Vec<Record>>` is a source;
//! [`JsonRecordSource`] reads a JSON array or JSON-lines file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{ImpactError, Result};
use crate::models::Record;

/// Pull-based supplier of training records.
pub trait RecordSource: Send + Sync {
    fn load(&self) -> Result<Vec<Record>>;
}

impl<F> RecordSource for F
where
    F: Fn() -> Result<Vec<Record>> + Send + Sync,
{
    fn load(&self) -> Result<Vec<Record>> {
        self()
    }
}

/// Records from a file holding either one JSON array of objects or one
/// object per line. Every record must carry non-empty title, description,
/// org_name and org_description.
#[derive(Debug, Clone)]
pub struct JsonRecordSource {
    path: PathBuf,
}

impl JsonRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse records without the required-field check. Used for query files.
    pub fn load_unvalidated(&self) -> Result<Vec<Record>> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            ImpactError::DataSource(format!("cannot read {}: {e}", self.path.display()))
        })?;
        parse_records(&raw)
    }
}

impl RecordSource for JsonRecordSource {
    fn load(&self) -> Result<Vec<Record>> {
        let records = self.load_unvalidated()?;
        for record in &records {
            record.validate_required()?;
        }
        debug!(path = %self.path.display(), records = records.len(), "Loaded records");
        Ok(records)
    }
}

/// Parse a JSON array of objects or JSON lines into records.
pub fn parse_records(raw: &str) -> Result<Vec<Record>> {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(trimmed)?;
        return values
            .into_iter()
            .enumerate()
            .map(|(position, value)| record_from_value(position, value))
            .collect();
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line, text)| {
            let value: Value = serde_json::from_str(text)?;
            record_from_value(line, value)
        })
        .collect()
}

fn record_from_value(position: usize, value: Value) -> Result<Record> {
    match value {
        Value::Object(object) => Record::from_json(object),
        _ => Err(ImpactError::DataSource(format!(
            "entry {position} is not a JSON object"
        ))),
    }
}
