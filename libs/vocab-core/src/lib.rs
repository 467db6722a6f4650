//! Core domain library for the vocabulary trainer.
//!
//! Provides:
//! - Review item and import record types
//! - SM-2 derivative scheduling math with configurable parameters
//! - Injectable clock for deterministic time handling
//! - Per-session counters

pub mod algorithm;
pub mod clock;
pub mod error;
pub mod session;
pub mod types;

pub use algorithm::{sm2::Sm2, Schedule, ScheduleDecision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, ScheduleError};
pub use session::{SessionSummary, SessionTracker};
pub use types::{
    ImportRecord, QueueOrdering, ReviewItem, MAX_DIFFICULTY, MIN_DIFFICULTY, MIN_EASINESS,
};
