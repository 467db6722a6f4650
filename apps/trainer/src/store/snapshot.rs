//! Versioned progress snapshots with bounded rotation.
//!
//! The current snapshot is written atomically (temp file plus rename); the
//! previous good copy goes into a rotation directory first, pruned down to a
//! configured retention count. The copy happens before the replace, so a
//! crash in between never loses the last good snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use vocab_core::ReviewItem;

use super::StoreError;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Current snapshot filename inside the data directory.
pub const SNAPSHOT_FILE: &str = "progress.json";

/// Directory holding rotated prior snapshots.
pub const ROTATED_DIR: &str = "snapshots";

/// On-disk snapshot document. Words are keyed by the item's word, so the
/// file diffs cleanly between runs.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub word_count: usize,
    pub words: BTreeMap<String, ReviewItem>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    version: u32,
    words: BTreeMap<String, serde_json::Value>,
}

/// Write `snapshot` as the current file, rotating the previous one away
/// first.
pub fn write(dir: &Path, snapshot: &Snapshot, retention: usize) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;
    let current = dir.join(SNAPSHOT_FILE);

    if current.exists() {
        rotate(dir, &current, snapshot.timestamp, retention)?;
    }

    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    fs::write(&tmp, json)?;
    fs::rename(&tmp, &current)?;
    Ok(())
}

/// Load the current snapshot. `Ok(None)` when none has been written yet.
///
/// Records that fail to deserialize are skipped with a warning; the rest of
/// the snapshot still loads. Every loaded item is clamped back inside its
/// invariants.
pub fn read(dir: &Path) -> Result<Option<Vec<ReviewItem>>, StoreError> {
    let current = dir.join(SNAPSHOT_FILE);
    if !current.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(&current)?;
    let parsed: RawSnapshot = serde_json::from_str(&raw)?;
    if parsed.version > SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedSnapshot(parsed.version));
    }

    let mut items = Vec::with_capacity(parsed.words.len());
    for (word, value) in parsed.words {
        match serde_json::from_value::<ReviewItem>(value) {
            Ok(mut item) => {
                item.clamp_invariants();
                items.push(item);
            }
            Err(e) => warn!(word, error = %e, "skipping malformed snapshot record"),
        }
    }
    Ok(Some(items))
}

fn rotate(
    dir: &Path,
    current: &Path,
    now: DateTime<Utc>,
    retention: usize,
) -> Result<(), StoreError> {
    if retention == 0 {
        return Ok(());
    }
    let rotated_dir = dir.join(ROTATED_DIR);
    fs::create_dir_all(&rotated_dir)?;

    let name = format!("progress_{}.json", now.format("%Y%m%d_%H%M%S_%3f"));
    fs::copy(current, rotated_dir.join(name))?;
    prune(&rotated_dir, retention)?;
    Ok(())
}

/// Delete rotated snapshots beyond the retention count, oldest first. The
/// timestamped names sort chronologically.
fn prune(rotated_dir: &Path, retention: usize) -> Result<(), StoreError> {
    let mut rotated: Vec<PathBuf> = fs::read_dir(rotated_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("progress_") && name.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();

    if rotated.len() <= retention {
        return Ok(());
    }

    rotated.sort();
    let excess = rotated.len() - retention;
    for path in rotated.drain(..excess) {
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to prune rotated snapshot");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn snapshot_of(items: &[ReviewItem], timestamp: DateTime<Utc>) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            timestamp,
            word_count: items.len(),
            words: items.iter().map(|i| (i.word.clone(), i.clone())).collect(),
        }
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let items = vec![
            ReviewItem::new("apple".into(), "a fruit".into(), now),
            ReviewItem::new("run".into(), "to move fast".into(), now),
        ];

        write(dir.path(), &snapshot_of(&items, now), 3).unwrap();
        let loaded = read(dir.path()).unwrap().unwrap();

        assert_eq!(loaded.len(), 2);
        let words: Vec<&str> = loaded.iter().map(|i| i.word.as_str()).collect();
        assert!(words.contains(&"apple"));
        assert!(words.contains(&"run"));
    }

    #[test]
    fn absent_snapshot_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(read(dir.path()).unwrap().is_none());
    }

    #[test]
    fn rotation_keeps_only_the_retention_count() {
        let dir = TempDir::new().unwrap();
        let base = Utc::now();
        let items = vec![ReviewItem::new("apple".into(), "a fruit".into(), base)];

        for i in 0..4 {
            let at = base + Duration::seconds(i);
            write(dir.path(), &snapshot_of(&items, at), 2).unwrap();
        }

        let rotated = fs::read_dir(dir.path().join(ROTATED_DIR)).unwrap().count();
        assert_eq!(rotated, 2);
        assert!(dir.path().join(SNAPSHOT_FILE).exists());
    }

    #[test]
    fn zero_retention_skips_rotation() {
        let dir = TempDir::new().unwrap();
        let base = Utc::now();
        let items = vec![ReviewItem::new("apple".into(), "a fruit".into(), base)];

        write(dir.path(), &snapshot_of(&items, base), 0).unwrap();
        write(dir.path(), &snapshot_of(&items, base + Duration::seconds(1)), 0).unwrap();

        assert!(!dir.path().join(ROTATED_DIR).exists());
    }

    #[test]
    fn malformed_record_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let good = ReviewItem::new("apple".into(), "a fruit".into(), now);

        let doc = serde_json::json!({
            "version": SNAPSHOT_VERSION,
            "timestamp": now,
            "word_count": 2,
            "words": {
                "apple": serde_json::to_value(&good).unwrap(),
                "broken": { "word": "broken" },
            },
        });
        fs::write(dir.path().join(SNAPSHOT_FILE), doc.to_string()).unwrap();

        let loaded = read(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].word, "apple");
    }

    #[test]
    fn loaded_items_are_clamped() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut item = ReviewItem::new("apple".into(), "a fruit".into(), now);
        item.easiness_factor = 0.2;
        item.interval_days = 0;

        write(dir.path(), &snapshot_of(&[item], now), 1).unwrap();
        let loaded = read(dir.path()).unwrap().unwrap();

        assert_eq!(loaded[0].easiness_factor, vocab_core::MIN_EASINESS);
        assert_eq!(loaded[0].interval_days, 1);
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let doc = serde_json::json!({
            "version": SNAPSHOT_VERSION + 1,
            "timestamp": Utc::now(),
            "word_count": 0,
            "words": {},
        });
        fs::write(dir.path().join(SNAPSHOT_FILE), doc.to_string()).unwrap();

        let err = read(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedSnapshot(v) if v == SNAPSHOT_VERSION + 1));
    }
}
