//! Append-only import history, one JSON record per line.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::StoreError;

/// One import, as recorded in the history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAudit {
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied label for where the batch came from.
    pub source: String,
    pub new_count: usize,
    pub updated_count: usize,
    pub total_after: usize,
}

/// Append one record, creating the file on first use.
pub fn append(path: &Path, entry: &ImportAudit) -> Result<(), StoreError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

/// Read every record in chronological order. A missing file means no
/// history yet; malformed lines are skipped.
pub fn read_all(path: &Path) -> Result<Vec<ImportAudit>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(error = %e, "skipping malformed import history line"),
        }
    }

    Ok(entries)
}
