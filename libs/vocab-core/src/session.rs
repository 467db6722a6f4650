//! Per-session drill bookkeeping.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Counters for one drill session.
///
/// A tracker covers exactly one session: it starts counting on construction
/// and stops at `end_session`. Starting the next session means constructing
/// a fresh tracker.
pub struct SessionTracker {
    clock: Arc<dyn Clock>,
    session_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    answered: u32,
    correct: u32,
    touched: Vec<Uuid>,
}

/// Snapshot of session counters for display layers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub answered: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub elapsed_seconds: i64,
}

impl SessionTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            session_id: Uuid::new_v4(),
            started_at,
            ended_at: None,
            answered: 0,
            correct: 0,
            touched: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn answered(&self) -> u32 {
        self.answered
    }

    pub fn correct(&self) -> u32 {
        self.correct
    }

    /// Item ids in the order they were answered this session.
    pub fn touched(&self) -> &[Uuid] {
        &self.touched
    }

    /// Record one graded answer. Ignored once the session has ended.
    pub fn record_answer(&mut self, item_id: Uuid, correct: bool) {
        if self.ended_at.is_some() {
            return;
        }
        self.answered += 1;
        if correct {
            self.correct += 1;
        }
        self.touched.push(item_id);
    }

    /// Percentage of correct answers, 0.0 when nothing was answered.
    pub fn accuracy(&self) -> f64 {
        if self.answered == 0 {
            return 0.0;
        }
        f64::from(self.correct) / f64::from(self.answered) * 100.0
    }

    /// Time spent so far, frozen once the session has ended.
    pub fn elapsed(&self) -> Duration {
        let end = self.ended_at.unwrap_or_else(|| self.clock.now());
        end - self.started_at
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Close the session. Idempotent: the first call fixes the end time and
    /// later calls return it unchanged.
    pub fn end_session(&mut self) -> DateTime<Utc> {
        if let Some(ended) = self.ended_at {
            return ended;
        }
        let ended = self.clock.now();
        self.ended_at = Some(ended);
        ended
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            answered: self.answered,
            correct: self.correct,
            accuracy: self.accuracy(),
            elapsed_seconds: self.elapsed().num_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;

    fn tracker() -> (Arc<ManualClock>, SessionTracker) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tracker = SessionTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn accuracy_is_zero_before_any_answer() {
        let (_, tracker) = tracker();
        assert_eq!(tracker.accuracy(), 0.0);
    }

    #[test]
    fn counters_track_answers_in_order() {
        let (_, mut tracker) = tracker();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        tracker.record_answer(first, true);
        tracker.record_answer(second, false);

        assert_eq!(tracker.answered(), 2);
        assert_eq!(tracker.correct(), 1);
        assert_eq!(tracker.accuracy(), 50.0);
        assert_eq!(tracker.touched(), &[first, second]);
    }

    #[test]
    fn elapsed_follows_the_injected_clock() {
        let (clock, tracker) = tracker();
        clock.advance(Duration::minutes(5));
        assert_eq!(tracker.elapsed(), Duration::minutes(5));
    }

    #[test]
    fn end_session_is_idempotent() {
        let (clock, mut tracker) = tracker();
        clock.advance(Duration::minutes(1));
        let first_end = tracker.end_session();

        clock.advance(Duration::minutes(10));
        assert_eq!(tracker.end_session(), first_end);
        assert_eq!(tracker.elapsed(), Duration::minutes(1));
    }

    #[test]
    fn answers_after_end_are_ignored() {
        let (_, mut tracker) = tracker();
        tracker.record_answer(Uuid::new_v4(), true);
        tracker.end_session();
        tracker.record_answer(Uuid::new_v4(), true);

        assert_eq!(tracker.answered(), 1);
        assert_eq!(tracker.touched().len(), 1);
    }

    #[test]
    fn summary_reflects_counters() {
        let (clock, mut tracker) = tracker();
        tracker.record_answer(Uuid::new_v4(), true);
        clock.advance(Duration::seconds(90));
        tracker.end_session();

        let summary = tracker.summary();
        assert_eq!(summary.answered, 1);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.accuracy, 100.0);
        assert_eq!(summary.elapsed_seconds, 90);
    }
}
