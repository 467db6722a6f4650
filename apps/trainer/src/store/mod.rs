//! Learning store: owns every review item and its durable state.

pub mod history;
pub mod snapshot;
pub mod stats;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use vocab_core::{Clock, ImportRecord, ReviewItem, MAX_DIFFICULTY, MIN_DIFFICULTY};

use history::ImportAudit;
use snapshot::Snapshot;
use stats::LearningStatistics;

/// History log filename inside the data directory.
const IMPORT_HISTORY_FILE: &str = "import_history.log";

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown word: {0}")]
    UnknownWord(String),

    #[error("unsupported snapshot version {0}")]
    UnsupportedSnapshot(u32),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Counts returned by [`LearningStore::import_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOutcome {
    pub new: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Default)]
struct ItemArena {
    items: Vec<ReviewItem>,
    by_word: HashMap<String, usize>,
    by_id: HashMap<Uuid, usize>,
}

impl ItemArena {
    fn insert(&mut self, item: ReviewItem) {
        self.by_word.insert(item.word.clone(), self.items.len());
        self.by_id.insert(item.id, self.items.len());
        self.items.push(item);
    }

    fn clear(&mut self) {
        self.items.clear();
        self.by_word.clear();
        self.by_id.clear();
    }
}

/// Owns every review item, keyed by word, in stable insertion order.
///
/// All item state lives behind one mutex. Durable writes serialize a clone
/// taken under the lock and do their I/O after releasing it, so disk speed
/// never blocks readers.
pub struct LearningStore {
    inner: Mutex<ItemArena>,
    data_dir: PathBuf,
    snapshot_retention: usize,
    clock: Arc<dyn Clock>,
}

impl LearningStore {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        snapshot_retention: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Mutex::new(ItemArena::default()),
            data_dir: data_dir.into(),
            snapshot_retention,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ItemArena> {
        self.inner.lock().expect("store lock")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Copy of the item for `word`, if present.
    pub fn get(&self, word: &str) -> Option<ReviewItem> {
        let arena = self.lock();
        arena.by_word.get(word).map(|&idx| arena.items[idx].clone())
    }

    /// Copy of the item for `id`, if present.
    pub fn resolve(&self, id: Uuid) -> Option<ReviewItem> {
        let arena = self.lock();
        arena.by_id.get(&id).map(|&idx| arena.items[idx].clone())
    }

    /// Current due time of the item for `id`.
    pub fn due_time_of(&self, id: Uuid) -> Option<DateTime<Utc>> {
        let arena = self.lock();
        arena.by_id.get(&id).map(|&idx| arena.items[idx].next_due_at)
    }

    /// Copies of every item in insertion order.
    pub fn items_snapshot(&self) -> Vec<ReviewItem> {
        self.lock().items.clone()
    }

    /// Run `f` against the item for `word` under the store lock.
    ///
    /// `f` must not call back into the store or perform I/O.
    pub fn with_item_mut<F, R>(&self, word: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut ReviewItem) -> R,
    {
        let mut arena = self.lock();
        let idx = match arena.by_word.get(word) {
            Some(&idx) => idx,
            None => return Err(StoreError::UnknownWord(word.to_string())),
        };
        Ok(f(&mut arena.items[idx]))
    }

    /// Add a manually created item. Returns false when the word is already
    /// present.
    pub fn add(&self, item: ReviewItem) -> bool {
        let mut arena = self.lock();
        if arena.by_word.contains_key(&item.word) {
            return false;
        }
        arena.insert(item);
        true
    }

    /// Import a batch of records, merging into existing items by word.
    ///
    /// New words become fresh items due immediately. Existing words get
    /// their content fields merged; scheduling state is never touched by an
    /// import. Records with blank required fields are skipped. The batch is
    /// recorded in the append-only import history.
    pub fn import_batch(&self, records: &[ImportRecord], source: &str) -> Result<ImportOutcome> {
        let now = self.clock.now();
        let mut outcome = ImportOutcome::default();

        let total_after = {
            let mut arena = self.lock();
            for record in records {
                if !record.is_valid() {
                    outcome.skipped += 1;
                    warn!(source, word = %record.word, "skipping import record with blank required fields");
                    continue;
                }
                let word = record.word.trim().to_string();
                match arena.by_word.get(&word).copied() {
                    Some(idx) => {
                        merge_record(&mut arena.items[idx], record, now);
                        outcome.updated += 1;
                    }
                    None => {
                        arena.insert(item_from_record(record, word, now));
                        outcome.new += 1;
                    }
                }
            }
            arena.items.len()
        };

        std::fs::create_dir_all(&self.data_dir)?;
        history::append(
            &self.data_dir.join(IMPORT_HISTORY_FILE),
            &ImportAudit {
                timestamp: now,
                source: source.to_string(),
                new_count: outcome.new,
                updated_count: outcome.updated,
                total_after,
            },
        )?;

        info!(
            source,
            new = outcome.new,
            updated = outcome.updated,
            skipped = outcome.skipped,
            "imported vocabulary batch"
        );
        Ok(outcome)
    }

    /// Write the current state as a snapshot, rotating the previous one.
    pub fn persist(&self) -> Result<()> {
        let (words, word_count) = {
            let arena = self.lock();
            let words: BTreeMap<String, ReviewItem> = arena
                .items
                .iter()
                .map(|item| (item.word.clone(), item.clone()))
                .collect();
            (words, arena.items.len())
        };

        let doc = Snapshot {
            version: snapshot::SNAPSHOT_VERSION,
            timestamp: self.clock.now(),
            word_count,
            words,
        };
        snapshot::write(&self.data_dir, &doc, self.snapshot_retention)
    }

    /// Replace in-memory state from the current snapshot. Returns false when
    /// no snapshot exists; the store is left empty in that case.
    pub fn restore(&self) -> Result<bool> {
        let mut items = match snapshot::read(&self.data_dir)? {
            Some(items) => items,
            None => return Ok(false),
        };

        // The snapshot keys sort alphabetically; put items back into
        // creation order so queue tie-breaks survive a restart.
        items.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.word.cmp(&b.word))
        });

        let mut arena = self.lock();
        arena.clear();
        for item in items {
            arena.insert(item);
        }
        info!(items = arena.items.len(), "restored learning store snapshot");
        Ok(true)
    }

    /// Aggregate statistics, with a trailing `activity_days`-day series.
    pub fn statistics(&self, activity_days: usize) -> LearningStatistics {
        let items = self.items_snapshot();
        stats::compute(&items, self.clock.now().date_naive(), activity_days)
    }

    /// Reviewed items ranked by descending error rate. Ties keep insertion
    /// order; unreviewed items never rank.
    pub fn items_prone_to_error(&self, limit: usize) -> Vec<ReviewItem> {
        let arena = self.lock();
        let mut reviewed: Vec<&ReviewItem> =
            arena.items.iter().filter(|i| i.review_count > 0).collect();
        reviewed.sort_by(|a, b| b.error_rate().total_cmp(&a.error_rate()));
        reviewed.into_iter().take(limit).cloned().collect()
    }

    /// Every recorded import, oldest first.
    pub fn import_history(&self) -> Result<Vec<ImportAudit>> {
        history::read_all(&self.data_dir.join(IMPORT_HISTORY_FILE))
    }
}

fn item_from_record(record: &ImportRecord, word: String, now: DateTime<Utc>) -> ReviewItem {
    let mut item = ReviewItem::new(word, record.meaning.trim().to_string(), now);
    item.pronunciation = record
        .pronunciation
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from);
    item.difficulty = record
        .difficulty
        .unwrap_or(MIN_DIFFICULTY)
        .clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
    item.tags = record.tag_list();
    item.examples = record.example_list();
    item.synonyms = record.synonym_list();
    item.antonyms = record.antonym_list();
    item
}

/// Merge importable fields into an existing item. Scheduling state stays as
/// it is.
fn merge_record(item: &mut ReviewItem, record: &ImportRecord, now: DateTime<Utc>) {
    item.meaning = record.meaning.trim().to_string();
    if let Some(pronunciation) = record.pronunciation.as_deref() {
        let trimmed = pronunciation.trim();
        if !trimmed.is_empty() {
            item.pronunciation = Some(trimmed.to_string());
        }
    }
    if let Some(difficulty) = record.difficulty {
        item.difficulty = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
    }
    merge_lists(&mut item.tags, record.tag_list());
    merge_lists(&mut item.examples, record.example_list());
    merge_lists(&mut item.synonyms, record.synonym_list());
    merge_lists(&mut item.antonyms, record.antonym_list());
    item.updated_at = now;
}

/// Order-preserving union: existing values keep their position, unseen
/// incoming values append.
fn merge_lists(existing: &mut Vec<String>, incoming: Vec<String>) {
    for value in incoming {
        if !existing.contains(&value) {
            existing.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use vocab_core::ManualClock;

    fn store(dir: &TempDir, clock: Arc<ManualClock>) -> LearningStore {
        LearningStore::new(dir.path(), 3, clock)
    }

    fn record(word: &str, meaning: &str) -> ImportRecord {
        ImportRecord {
            word: word.to_string(),
            meaning: meaning.to_string(),
            ..Default::default()
        }
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc::now()))
    }

    #[test]
    fn import_counts_new_and_skipped_records() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, manual_clock());

        let records = vec![
            record("apple", "a fruit"),
            record("run", "to move fast"),
            record("", "meaning without a word"),
        ];
        let outcome = s.import_batch(&records, "starter.csv").unwrap();

        assert_eq!(outcome, ImportOutcome { new: 2, updated: 0, skipped: 1 });
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn importing_the_same_batch_twice_updates_in_place() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, manual_clock());
        let records = vec![record("apple", "a fruit"), record("run", "to move fast")];

        let first = s.import_batch(&records, "starter.csv").unwrap();
        let second = s.import_batch(&records, "starter.csv").unwrap();

        assert_eq!(first.new, 2);
        assert_eq!(second, ImportOutcome { new: 0, updated: 2, skipped: 0 });
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn merge_unions_lists_and_overwrites_scalars() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, manual_clock());

        let mut original = record("run", "to move fast");
        original.tags = "verb".to_string();
        original.synonyms = "sprint".to_string();
        s.import_batch(&[original], "first.csv").unwrap();

        let mut update = record("run", "to jog");
        update.tags = "basic, verb".to_string();
        update.synonyms = "dash".to_string();
        update.difficulty = Some(4);
        s.import_batch(&[update], "second.csv").unwrap();

        let item = s.get("run").unwrap();
        assert_eq!(item.meaning, "to jog");
        assert_eq!(item.difficulty, 4);
        assert_eq!(item.tags, vec!["verb", "basic"]);
        assert_eq!(item.synonyms, vec!["sprint", "dash"]);
    }

    #[test]
    fn import_never_touches_scheduling_state() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, manual_clock());
        s.import_batch(&[record("run", "to move fast")], "first.csv").unwrap();

        s.with_item_mut("run", |item| {
            item.review_count = 5;
            item.correct_count = 4;
            item.interval_days = 14;
            item.easiness_factor = 2.1;
        })
        .unwrap();

        s.import_batch(&[record("run", "updated meaning")], "second.csv").unwrap();

        let item = s.get("run").unwrap();
        assert_eq!(item.meaning, "updated meaning");
        assert_eq!(item.review_count, 5);
        assert_eq!(item.interval_days, 14);
        assert_eq!(item.easiness_factor, 2.1);
    }

    #[test]
    fn unknown_word_is_an_error() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, manual_clock());

        let err = s.with_item_mut("absent", |_| ()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownWord(word) if word == "absent"));
    }

    #[test]
    fn lookup_by_word_and_id_agree() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, manual_clock());
        s.import_batch(&[record("apple", "a fruit")], "starter.csv").unwrap();

        let by_word = s.get("apple").unwrap();
        let by_id = s.resolve(by_word.id).unwrap();
        assert_eq!(by_word, by_id);
        assert_eq!(s.due_time_of(by_word.id), Some(by_word.next_due_at));
    }

    #[test]
    fn persist_then_restore_round_trips() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let s = store(&dir, clock.clone());

        s.import_batch(
            &[record("apple", "a fruit"), record("run", "to move fast")],
            "starter.csv",
        )
        .unwrap();
        s.with_item_mut("run", |item| {
            item.review_count = 3;
            item.correct_count = 2;
            item.interval_days = 6;
        })
        .unwrap();
        s.persist().unwrap();

        let reopened = store(&dir, clock);
        assert!(reopened.restore().unwrap());
        assert_eq!(reopened.len(), 2);

        let run = reopened.get("run").unwrap();
        assert_eq!(run.review_count, 3);
        assert_eq!(run.interval_days, 6);
    }

    #[test]
    fn restore_without_snapshot_returns_false() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, manual_clock());
        assert!(!s.restore().unwrap());
        assert!(s.is_empty());
    }

    #[test]
    fn snapshot_rotation_is_bounded() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let s = LearningStore::new(dir.path(), 2, clock.clone());
        s.import_batch(&[record("apple", "a fruit")], "starter.csv").unwrap();

        for _ in 0..4 {
            s.persist().unwrap();
            clock.advance(Duration::seconds(1));
        }

        let rotated = std::fs::read_dir(dir.path().join(snapshot::ROTATED_DIR))
            .unwrap()
            .count();
        assert_eq!(rotated, 2);
    }

    #[test]
    fn import_history_records_every_batch() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let s = store(&dir, clock.clone());

        s.import_batch(&[record("apple", "a fruit")], "first.csv").unwrap();
        clock.advance(Duration::minutes(1));
        s.import_batch(&[record("apple", "a fruit"), record("run", "to move fast")], "second.csv")
            .unwrap();

        let entries = s.import_history().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, "first.csv");
        assert_eq!(entries[0].new_count, 1);
        assert_eq!(entries[1].updated_count, 1);
        assert_eq!(entries[1].new_count, 1);
        assert_eq!(entries[1].total_after, 2);
    }

    #[test]
    fn error_prone_ranking_is_stable_and_skips_unreviewed() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, manual_clock());
        s.import_batch(
            &[
                record("solid", "well known"),
                record("shaky", "often missed"),
                record("wobbly", "equally missed"),
                record("fresh", "never reviewed"),
            ],
            "starter.csv",
        )
        .unwrap();

        s.with_item_mut("solid", |item| {
            item.review_count = 10;
            item.correct_count = 9;
        })
        .unwrap();
        s.with_item_mut("shaky", |item| {
            item.review_count = 10;
            item.correct_count = 5;
        })
        .unwrap();
        s.with_item_mut("wobbly", |item| {
            item.review_count = 4;
            item.correct_count = 2;
        })
        .unwrap();

        let ranked = s.items_prone_to_error(10);
        let words: Vec<&str> = ranked.iter().map(|i| i.word.as_str()).collect();
        assert_eq!(words, vec!["shaky", "wobbly", "solid"]);

        assert_eq!(s.items_prone_to_error(1).len(), 1);
    }

    #[test]
    fn add_rejects_duplicate_words() {
        let dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let s = store(&dir, clock.clone());

        let item = ReviewItem::new("apple".into(), "a fruit".into(), clock.now());
        assert!(s.add(item.clone()));
        assert!(!s.add(item));
        assert_eq!(s.len(), 1);
    }
}
