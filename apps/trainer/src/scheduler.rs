//! Review scheduling: applying graded outcomes and feeding the drill queue.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use tracing::debug;
use uuid::Uuid;

use vocab_core::{
    Clock, QueueOrdering, ReviewItem, Schedule, ScheduleDecision, ScheduleError, Sm2,
};

/// Outcome of applying one graded answer to an item.
#[derive(Debug, Clone)]
pub struct GradedReview {
    pub item_id: Uuid,
    pub word: String,
    pub quality: i32,
    pub correct: bool,
    pub interval_days: u32,
    pub easiness: f64,
    pub next_due_at: DateTime<Utc>,
}

/// Entry in the due heap. Ordered by due time, then insertion sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DueEntry {
    due_at: DateTime<Utc>,
    seq: u64,
    item_id: Uuid,
}

/// Drives the review loop: owns the due-time heap, the ready queue, and the
/// append-only decision log.
///
/// The heap holds `(due_at, seq, item_id)` only; items themselves live in
/// the store. A popped entry is checked against the item's current due time,
/// so entries left behind by a reschedule are skipped rather than served.
pub struct ReviewScheduler {
    algorithm: Sm2,
    clock: Arc<dyn Clock>,
    due: BinaryHeap<Reverse<DueEntry>>,
    ready: VecDeque<Uuid>,
    seq: u64,
    decisions: Vec<ScheduleDecision>,
}

impl ReviewScheduler {
    pub fn new(algorithm: Sm2, clock: Arc<dyn Clock>) -> Self {
        Self {
            algorithm,
            clock,
            due: BinaryHeap::new(),
            ready: VecDeque::new(),
            seq: 0,
            decisions: Vec::new(),
        }
    }

    pub fn parameters(&self) -> &Sm2 {
        &self.algorithm
    }

    /// Scheduling decisions in the order they were made.
    pub fn decisions(&self) -> &[ScheduleDecision] {
        &self.decisions
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn due_len(&self) -> usize {
        self.due.len()
    }

    /// Compute the next schedule for `item` under `quality` and record the
    /// decision. The item itself is not modified.
    pub fn compute_next_schedule(
        &mut self,
        item: &ReviewItem,
        quality: i32,
    ) -> Result<Schedule, ScheduleError> {
        let schedule = self.algorithm.next_schedule(item, quality)?;
        self.decisions.push(ScheduleDecision {
            item_id: item.id,
            word: item.word.clone(),
            quality,
            interval_before: item.interval_days,
            interval_after: schedule.interval_days,
            ease_before: item.easiness_factor,
            ease_after: schedule.easiness,
            decided_at: self.clock.now(),
        });
        Ok(schedule)
    }

    /// Apply a graded answer: update counts and scheduling state on `item`
    /// and requeue it at its new due time.
    ///
    /// An explicit `quality` outside the grade range is rejected before the
    /// item is touched; `None` derives the grade from `correct`.
    pub fn apply_outcome(
        &mut self,
        item: &mut ReviewItem,
        correct: bool,
        quality: Option<i32>,
    ) -> Result<GradedReview, ScheduleError> {
        let quality = match quality {
            Some(q) => {
                self.algorithm.check_quality(q)?;
                q
            }
            None => self.algorithm.implied_quality(correct),
        };

        let schedule = self.compute_next_schedule(item, quality)?;
        let now = self.clock.now();

        item.review_count += 1;
        if correct {
            item.correct_count += 1;
        }
        item.interval_days = schedule.interval_days;
        item.easiness_factor = schedule.easiness;
        item.consecutive_correct = schedule.consecutive_correct;
        item.last_reviewed_at = now;
        item.next_due_at = now + Duration::days(i64::from(schedule.interval_days));
        item.updated_at = now;

        self.push_due(item.id, item.next_due_at);
        // The item is no longer due; drop any queued presentation of it.
        self.ready.retain(|queued| *queued != item.id);

        Ok(GradedReview {
            item_id: item.id,
            word: item.word.clone(),
            quality,
            correct,
            interval_days: schedule.interval_days,
            easiness: schedule.easiness,
            next_due_at: item.next_due_at,
        })
    }

    fn push_due(&mut self, item_id: Uuid, due_at: DateTime<Utc>) {
        self.seq += 1;
        self.due.push(Reverse(DueEntry { due_at, seq: self.seq, item_id }));
    }

    /// Pop up to `limit` item ids whose due time has passed, earliest first.
    ///
    /// `current_due` resolves an id to its authoritative due time; an entry
    /// that no longer matches is stale and gets skipped.
    pub fn pull_due_items<F>(&mut self, limit: usize, current_due: F) -> Vec<Uuid>
    where
        F: Fn(Uuid) -> Option<DateTime<Utc>>,
    {
        let now = self.clock.now();
        let mut pulled = Vec::new();

        while pulled.len() < limit {
            let head_is_due = match self.due.peek() {
                Some(Reverse(entry)) => entry.due_at <= now,
                None => false,
            };
            if !head_is_due {
                break;
            }
            if let Some(Reverse(entry)) = self.due.pop() {
                match current_due(entry.item_id) {
                    Some(due) if due == entry.due_at => pulled.push(entry.item_id),
                    Some(_) => debug!(item_id = %entry.item_id, "skipped stale due entry"),
                    None => debug!(item_id = %entry.item_id, "skipped due entry for unknown item"),
                }
            }
        }
        pulled
    }

    /// Rebuild both queues from the full item set: items due now go to the
    /// ready queue in `ordering` order (capped at `limit`), the rest to the
    /// due heap. Previous queue contents are discarded wholesale.
    pub fn build_ready_queue(
        &mut self,
        items: &[ReviewItem],
        ordering: QueueOrdering,
        limit: usize,
    ) {
        let now = self.clock.now();
        self.due.clear();
        self.ready.clear();

        let mut due_now: Vec<&ReviewItem> = Vec::new();
        for item in items {
            if item.is_due(now) {
                due_now.push(item);
            } else {
                self.push_due(item.id, item.next_due_at);
            }
        }

        order_due_items(&mut due_now, ordering);
        due_now.truncate(limit);
        self.ready = due_now.into_iter().map(|item| item.id).collect();

        debug!(
            ready = self.ready.len(),
            pending = self.due.len(),
            ordering = ordering.as_str(),
            "rebuilt ready queue"
        );
    }

    /// Next item id awaiting presentation, if any.
    pub fn next_ready(&mut self) -> Option<Uuid> {
        self.ready.pop_front()
    }

    /// Append freshly due ids to the back of the ready queue.
    pub fn extend_ready(&mut self, ids: impl IntoIterator<Item = Uuid>) {
        self.ready.extend(ids);
    }
}

/// Order candidates for presentation. All sorts are stable, so items equal
/// under the ordering keep their store order.
fn order_due_items(due: &mut Vec<&ReviewItem>, ordering: QueueOrdering) {
    match ordering {
        QueueOrdering::Random => due.shuffle(&mut rand::thread_rng()),
        QueueOrdering::Difficulty => due.sort_by(|a, b| b.difficulty.cmp(&a.difficulty)),
        QueueOrdering::Performance => due.sort_by(|a, b| {
            let a_reviewed = a.review_count > 0;
            let b_reviewed = b.review_count > 0;
            a_reviewed
                .cmp(&b_reviewed)
                .then_with(|| a.accuracy().total_cmp(&b.accuracy()))
        }),
        QueueOrdering::Interval => due.sort_by(|a, b| a.interval_days.cmp(&b.interval_days)),
    }
}
