//! Application-level error type.

use thiserror::Error;

use crate::audio::SpeechError;
use crate::cache::CacheError;
use crate::explain::ExplainError;
use crate::store::StoreError;
use vocab_core::ScheduleError;

/// Umbrella over every error in the crate, for embedders that drive the
/// [`Trainer`](crate::app::Trainer) and its services behind one `?`.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("explanation error: {0}")]
    Explain(#[from] ExplainError),
}

pub type Result<T> = std::result::Result<T, TrainerError>;
