//! Error types for vocab-core.

use thiserror::Error;

/// Result type alias using ScheduleError.
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Errors from scheduling math.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("quality {quality} outside allowed range {min}..={max}")]
    InvalidGrade { quality: i32, min: i32, max: i32 },
}
