//! SM-2 derivative used for vocabulary reviews.
//!
//! Grades below 3 reset the interval and shrink the easiness factor; passing
//! grades walk the fixed 1 → 6 → 14 day tiers before growing
//! multiplicatively with the easiness factor and an optional streak bonus.

use super::Schedule;
use crate::error::ScheduleError;
use crate::types::ReviewItem;

/// Grades below this value land in the failure band.
const FAILURE_BAND: i32 = 3;

/// Review parameters. Immutable once a scheduler is constructed around them.
#[derive(Debug, Clone)]
pub struct Sm2 {
    pub min_easiness: f64,
    pub perfect_score: i32,
    pub min_quality: i32,
    /// Scales every final interval; the failure-band interval is this
    /// modifier applied to a base of one day.
    pub interval_modifier: f64,
    /// Easiness penalty per point of quality shortfall on a failed review.
    pub penalty_factor: f64,
    /// Interval bonus applied once the correct streak reaches the threshold.
    pub bonus_factor: f64,
    pub consecutive_bonus_threshold: u32,
}

impl Default for Sm2 {
    fn default() -> Self {
        Self {
            min_easiness: 1.3,
            perfect_score: 5,
            min_quality: 0,
            interval_modifier: 1.0,
            penalty_factor: 0.2,
            bonus_factor: 0.05,
            consecutive_bonus_threshold: 3,
        }
    }
}

impl Sm2 {
    /// Validate a caller-supplied quality grade.
    pub fn check_quality(&self, quality: i32) -> Result<(), ScheduleError> {
        if quality < self.min_quality || quality > self.perfect_score {
            return Err(ScheduleError::InvalidGrade {
                quality,
                min: self.min_quality,
                max: self.perfect_score,
            });
        }
        Ok(())
    }

    /// Quality grade implied by a bare correct/incorrect outcome.
    pub fn implied_quality(&self, correct: bool) -> i32 {
        if correct {
            self.perfect_score
        } else {
            self.min_quality
        }
    }

    /// Compute interval, easiness, and streak for `item` after a review
    /// graded `quality`.
    pub fn next_schedule(&self, item: &ReviewItem, quality: i32) -> Result<Schedule, ScheduleError> {
        self.check_quality(quality)?;

        let ease = item.easiness_factor;
        let (interval, easiness, streak) = if quality < FAILURE_BAND {
            let penalized = ease - self.penalty_factor * f64::from(FAILURE_BAND - quality);
            (1.0, penalized.max(self.min_easiness), 0)
        } else {
            let streak = item.consecutive_correct + 1;
            let bonus = if streak >= self.consecutive_bonus_threshold {
                1.0 + self.bonus_factor
            } else {
                1.0
            };
            let q_diff = f64::from(self.perfect_score - quality);
            let rewarded = ease + (0.1 - q_diff * (0.08 + q_diff * 0.02));
            // Fixed graduation tiers take no streak bonus; growth past them
            // multiplies the pre-update easiness.
            let grown = if item.interval_days <= 1 {
                6.0
            } else if item.interval_days == 6 {
                14.0
            } else {
                (f64::from(item.interval_days) * ease * bonus).round()
            };
            (grown, rewarded.max(self.min_easiness), streak)
        };

        let scaled = (interval * self.interval_modifier).round().max(1.0);
        Ok(Schedule {
            interval_days: scaled as u32,
            easiness,
            consecutive_correct: streak,
        })
    }
}
