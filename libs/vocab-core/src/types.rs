//! Core types for the vocabulary trainer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard floor for the easiness factor, independent of configured parameters.
pub const MIN_EASINESS: f64 = 1.3;

/// Difficulty bounds for a review item.
pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

/// A vocabulary entry together with its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub word: String,
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<String>,
    pub difficulty: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub antonyms: Vec<String>,
    pub review_count: u32,
    pub correct_count: u32,
    pub consecutive_correct: u32,
    pub easiness_factor: f64,
    pub interval_days: u32,
    pub last_reviewed_at: DateTime<Utc>,
    pub next_due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewItem {
    /// Create a fresh item due immediately: interval 1, ease 2.5, zero counts.
    pub fn new(word: String, meaning: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            word,
            meaning,
            pronunciation: None,
            difficulty: MIN_DIFFICULTY,
            tags: Vec::new(),
            examples: Vec::new(),
            synonyms: Vec::new(),
            antonyms: Vec::new(),
            review_count: 0,
            correct_count: 0,
            consecutive_correct: 0,
            easiness_factor: 2.5,
            interval_days: 1,
            last_reviewed_at: now,
            next_due_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this item's next review time has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due_at <= now
    }

    /// Percentage of correct reviews, 0.0 when never reviewed.
    pub fn accuracy(&self) -> f64 {
        if self.review_count == 0 {
            return 0.0;
        }
        f64::from(self.correct_count) / f64::from(self.review_count) * 100.0
    }

    /// Fraction of failed reviews, 0.0 when never reviewed.
    pub fn error_rate(&self) -> f64 {
        if self.review_count == 0 {
            return 0.0;
        }
        f64::from(self.review_count - self.correct_count) / f64::from(self.review_count)
    }

    /// Clamp every field back inside its invariant.
    ///
    /// Applied to records read from a snapshot so that a hand-edited or
    /// partially corrupted value cannot poison the scheduler.
    pub fn clamp_invariants(&mut self) {
        self.difficulty = self.difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        if self.easiness_factor < MIN_EASINESS || !self.easiness_factor.is_finite() {
            self.easiness_factor = MIN_EASINESS;
        }
        if self.interval_days < 1 {
            self.interval_days = 1;
        }
        if self.correct_count > self.review_count {
            self.correct_count = self.review_count;
        }
        if self.next_due_at < self.last_reviewed_at {
            self.next_due_at = self.last_reviewed_at;
        }
    }
}

/// One row handed over by an external CSV/JSON loader.
///
/// List-valued fields keep the delimiter-joined form they have in source
/// files; the `*_list` accessors split and trim them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportRecord {
    pub word: String,
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
    /// Comma-joined.
    #[serde(default)]
    pub tags: String,
    /// Semicolon-joined.
    #[serde(default)]
    pub examples: String,
    /// Comma-joined.
    #[serde(default)]
    pub synonyms: String,
    /// Comma-joined.
    #[serde(default)]
    pub antonyms: String,
}

impl ImportRecord {
    /// A record is importable when both required fields are non-blank.
    pub fn is_valid(&self) -> bool {
        !self.word.trim().is_empty() && !self.meaning.trim().is_empty()
    }

    pub fn tag_list(&self) -> Vec<String> {
        split_joined(&self.tags, ',')
    }

    pub fn example_list(&self) -> Vec<String> {
        split_joined(&self.examples, ';')
    }

    pub fn synonym_list(&self) -> Vec<String> {
        split_joined(&self.synonyms, ',')
    }

    pub fn antonym_list(&self) -> Vec<String> {
        split_joined(&self.antonyms, ',')
    }
}

fn split_joined(raw: &str, delimiter: char) -> Vec<String> {
    raw.split(delimiter)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

/// Ordering applied to the ready queue when it is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOrdering {
    Random,
    Difficulty,
    Performance,
    Interval,
}

impl Default for QueueOrdering {
    fn default() -> Self {
        Self::Random
    }
}

impl QueueOrdering {
    /// Get the ordering name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Difficulty => "difficulty",
            Self::Performance => "performance",
            Self::Interval => "interval",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "random" => Some(Self::Random),
            "difficulty" => Some(Self::Difficulty),
            "performance" => Some(Self::Performance),
            "interval" => Some(Self::Interval),
            _ => None,
        }
    }
}
