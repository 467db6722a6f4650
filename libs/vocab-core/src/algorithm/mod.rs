//! Spaced repetition scheduling math.

pub mod sm2;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Projected scheduling state for an item after one graded review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub interval_days: u32,
    pub easiness: f64,
    pub consecutive_correct: u32,
}

/// One entry in the scheduling decision log.
///
/// Appended on every schedule computation and never mutated afterwards, so a
/// review history can be replayed and audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDecision {
    pub item_id: Uuid,
    pub word: String,
    pub quality: i32,
    pub interval_before: u32,
    pub interval_after: u32,
    pub ease_before: f64,
    pub ease_after: f64,
    pub decided_at: DateTime<Utc>,
}
