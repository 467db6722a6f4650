//! Aggregate learning statistics computed over the item set.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use vocab_core::ReviewItem;

/// One day of review activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub reviewed: usize,
}

/// Per-tag slice of the statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagStats {
    pub items: usize,
    pub accuracy: f64,
}

/// Aggregate statistics over the whole store.
///
/// Averages over interval and easiness only count items that have been
/// reviewed at least once; unreviewed items still sit at their initial
/// values and would drag the averages toward the defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningStatistics {
    pub total_items: usize,
    pub reviewed_items: usize,
    pub unreviewed_items: usize,
    pub total_reviews: u64,
    /// Lifetime percentage of correct reviews, 0.0 with no reviews.
    pub accuracy: f64,
    pub average_difficulty: f64,
    pub average_interval_days: f64,
    pub average_easiness: f64,
    pub by_difficulty: BTreeMap<u8, usize>,
    pub by_tag: BTreeMap<String, TagStats>,
    /// Accuracy bucketed by each item's current interval.
    pub retention_by_interval: BTreeMap<u32, f64>,
    /// Trailing daily series, oldest day first, zero-filled.
    pub daily_activity: Vec<DailyActivity>,
}

fn percentage(correct: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    correct as f64 / total as f64 * 100.0
}

/// Compute statistics over `items`. `today` anchors the trailing
/// `activity_days`-day series.
pub fn compute(items: &[ReviewItem], today: NaiveDate, activity_days: usize) -> LearningStatistics {
    let total_items = items.len();
    let reviewed: Vec<&ReviewItem> = items.iter().filter(|i| i.review_count > 0).collect();
    let reviewed_items = reviewed.len();

    let total_reviews: u64 = items.iter().map(|i| u64::from(i.review_count)).sum();
    let total_correct: u64 = items.iter().map(|i| u64::from(i.correct_count)).sum();

    let average_difficulty = if total_items == 0 {
        0.0
    } else {
        items.iter().map(|i| f64::from(i.difficulty)).sum::<f64>() / total_items as f64
    };
    let average_interval_days = if reviewed_items == 0 {
        0.0
    } else {
        reviewed.iter().map(|i| f64::from(i.interval_days)).sum::<f64>() / reviewed_items as f64
    };
    let average_easiness = if reviewed_items == 0 {
        0.0
    } else {
        reviewed.iter().map(|i| i.easiness_factor).sum::<f64>() / reviewed_items as f64
    };

    let mut by_difficulty: BTreeMap<u8, usize> = BTreeMap::new();
    for item in items {
        *by_difficulty.entry(item.difficulty).or_insert(0) += 1;
    }

    let mut tag_totals: BTreeMap<String, (usize, u64, u64)> = BTreeMap::new();
    for item in items {
        for tag in &item.tags {
            let entry = tag_totals.entry(tag.clone()).or_insert((0, 0, 0));
            entry.0 += 1;
            entry.1 += u64::from(item.review_count);
            entry.2 += u64::from(item.correct_count);
        }
    }
    let by_tag = tag_totals
        .into_iter()
        .map(|(tag, (count, reviews, correct))| {
            (tag, TagStats { items: count, accuracy: percentage(correct, reviews) })
        })
        .collect();

    let mut interval_totals: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
    for item in &reviewed {
        let entry = interval_totals.entry(item.interval_days).or_insert((0, 0));
        entry.0 += u64::from(item.review_count);
        entry.1 += u64::from(item.correct_count);
    }
    let retention_by_interval = interval_totals
        .into_iter()
        .map(|(interval, (reviews, correct))| (interval, percentage(correct, reviews)))
        .collect();

    let mut daily_activity = Vec::with_capacity(activity_days);
    for offset in 0..activity_days {
        let date = today - Duration::days(offset as i64);
        let reviewed_on_day = reviewed
            .iter()
            .filter(|item| item.last_reviewed_at.date_naive() == date)
            .count();
        daily_activity.push(DailyActivity { date, reviewed: reviewed_on_day });
    }
    daily_activity.reverse();

    LearningStatistics {
        total_items,
        reviewed_items,
        unreviewed_items: total_items - reviewed_items,
        total_reviews,
        accuracy: percentage(total_correct, total_reviews),
        average_difficulty,
        average_interval_days,
        average_easiness,
        by_difficulty,
        by_tag,
        retention_by_interval,
        daily_activity,
    }
}
