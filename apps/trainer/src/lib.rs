//! Review engine for the vocabulary trainer.
//!
//! The GUI, speech synthesis, and LLM transport live elsewhere; this crate
//! owns everything between them: the SM-2 derivative scheduler and its
//! queues, the learning store with snapshot persistence and statistics, the
//! content caches fronting the synthesizer and explainer, and session
//! bookkeeping. [`Trainer`] wires one instance of each together.

pub mod app;
pub mod audio;
pub mod cache;
pub mod error;
pub mod explain;
pub mod scheduler;
pub mod store;

pub use app::{Trainer, TrainerConfig};
pub use audio::{AudioClip, SpeechError, SpeechService, Synthesizer};
pub use cache::{CacheConfig, CacheError, CacheStats, CacheValue, ContentCache};
pub use error::{Result, TrainerError};
pub use explain::{ExplainError, ExplainService, Explainer, Explanation, ExplanationKind};
pub use scheduler::{GradedReview, ReviewScheduler};
pub use store::{ImportOutcome, LearningStore, StoreError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing from `RUST_LOG`, defaulting to `info`. Call once from
/// the embedding binary.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
