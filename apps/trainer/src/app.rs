//! Trainer composition root.
//!
//! A GUI, CLI, or service embeds one [`Trainer`]. It owns a single instance
//! of every component, wires them to one clock, and exposes the drill loop
//! as plain methods. Locks are always taken scheduler first, then store,
//! and are never held across durable I/O.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use tracing::info;
use uuid::Uuid;

use vocab_core::{
    Clock, ImportRecord, QueueOrdering, ReviewItem, ScheduleDecision, SessionSummary,
    SessionTracker, Sm2, SystemClock,
};

use crate::audio::AudioClip;
use crate::cache::sweeper::CacheSweeper;
use crate::cache::{CacheConfig, ContentCache};
use crate::error::Result;
use crate::explain::Explanation;
use crate::scheduler::{GradedReview, ReviewScheduler};
use crate::store::history::ImportAudit;
use crate::store::stats::LearningStatistics;
use crate::store::{ImportOutcome, LearningStore, StoreError};

/// Trainer construction parameters. Every field has a workable default.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub data_dir: PathBuf,
    /// Rotated snapshots kept beside the current one.
    pub snapshot_retention: usize,
    /// Lifetime of cached explanations. Audio never expires.
    pub explanation_ttl: Duration,
    /// Cadence of the background TTL sweep.
    pub sweep_interval: std::time::Duration,
    pub ready_ordering: QueueOrdering,
    /// Most items a single ready-queue rebuild will take.
    pub ready_limit: usize,
    /// Days covered by the statistics activity series.
    pub activity_days: usize,
    pub parameters: Sm2,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_retention: 5,
            explanation_ttl: Duration::days(7),
            sweep_interval: std::time::Duration::from_secs(3600),
            ready_ordering: QueueOrdering::Random,
            ready_limit: 50,
            activity_days: 30,
            parameters: Sm2::default(),
        }
    }
}

/// Default data directory under the platform-local application data dir.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vocab-trainer")
}

/// One running trainer: store, scheduler, session, and both caches.
pub struct Trainer {
    config: TrainerConfig,
    clock: Arc<dyn Clock>,
    store: LearningStore,
    scheduler: Mutex<ReviewScheduler>,
    session: Mutex<SessionTracker>,
    audio_cache: Arc<ContentCache<AudioClip>>,
    explanation_cache: Arc<ContentCache<Explanation>>,
    sweepers: Mutex<Vec<CacheSweeper>>,
}

impl Trainer {
    /// Open a trainer on the system clock.
    pub fn open(config: TrainerConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open with an injected clock so tests can drive due times and TTLs.
    ///
    /// Restores the store when a snapshot exists, opens both caches, and
    /// builds the initial ready queue.
    pub fn open_with_clock(config: TrainerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(StoreError::from)?;

        let store =
            LearningStore::new(config.data_dir.clone(), config.snapshot_retention, clock.clone());
        let restored = store.restore()?;

        let audio_cache = Arc::new(ContentCache::open(
            &config.data_dir,
            CacheConfig { name: "audio", ttl: None },
            clock.clone(),
        )?);
        let explanation_cache = Arc::new(ContentCache::open(
            &config.data_dir,
            CacheConfig { name: "explanations", ttl: Some(config.explanation_ttl) },
            clock.clone(),
        )?);

        let mut scheduler = ReviewScheduler::new(config.parameters.clone(), clock.clone());
        let items = store.items_snapshot();
        scheduler.build_ready_queue(&items, config.ready_ordering, config.ready_limit);

        let session = SessionTracker::new(clock.clone());

        info!(
            restored,
            items = items.len(),
            data_dir = %config.data_dir.display(),
            "trainer opened"
        );

        Ok(Self {
            config,
            clock,
            store,
            scheduler: Mutex::new(scheduler),
            session: Mutex::new(session),
            audio_cache,
            explanation_cache,
            sweepers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn store(&self) -> &LearningStore {
        &self.store
    }

    pub fn audio_cache(&self) -> Arc<ContentCache<AudioClip>> {
        self.audio_cache.clone()
    }

    pub fn explanation_cache(&self) -> Arc<ContentCache<Explanation>> {
        self.explanation_cache.clone()
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, ReviewScheduler> {
        self.scheduler.lock().expect("scheduler lock")
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionTracker> {
        self.session.lock().expect("session lock")
    }

    /// Next item to drill, refilling the ready queue from newly due heap
    /// entries when it runs dry.
    pub fn next_item(&self) -> Option<ReviewItem> {
        let mut scheduler = self.lock_scheduler();
        if let Some(id) = scheduler.next_ready() {
            return self.store.resolve(id);
        }
        let due = scheduler.pull_due_items(self.config.ready_limit, |id| self.store.due_time_of(id));
        scheduler.extend_ready(due);
        scheduler.next_ready().and_then(|id| self.store.resolve(id))
    }

    /// Grade one answer: reschedule the item, persist, and update the
    /// session. An invalid explicit grade leaves everything untouched.
    pub fn submit_answer(
        &self,
        word: &str,
        correct: bool,
        quality: Option<i32>,
    ) -> Result<GradedReview> {
        let review = {
            let mut scheduler = self.lock_scheduler();
            self.store.with_item_mut(word, |item| {
                scheduler.apply_outcome(item, correct, quality)
            })??
        };

        self.store.persist()?;
        self.lock_session().record_answer(review.item_id, review.correct);
        Ok(review)
    }

    /// Import a batch, rebuild the queue so new items become drillable, and
    /// persist.
    pub fn import(&self, records: &[ImportRecord], source: &str) -> Result<ImportOutcome> {
        let outcome = self.store.import_batch(records, source)?;
        self.rebuild_queue(self.config.ready_ordering, self.config.ready_limit);
        self.store.persist()?;
        Ok(outcome)
    }

    /// Rebuild the ready queue and due heap from the full item set.
    pub fn rebuild_queue(&self, ordering: QueueOrdering, limit: usize) {
        let items = self.store.items_snapshot();
        self.lock_scheduler().build_ready_queue(&items, ordering, limit);
    }

    /// Items whose due time has passed, earliest first, without queueing
    /// them for presentation.
    pub fn pull_due(&self, limit: usize) -> Vec<ReviewItem> {
        let ids = {
            let mut scheduler = self.lock_scheduler();
            scheduler.pull_due_items(limit, |id| self.store.due_time_of(id))
        };
        ids.into_iter().filter_map(|id| self.store.resolve(id)).collect()
    }

    pub fn remaining_ready(&self) -> usize {
        self.lock_scheduler().ready_len()
    }

    pub fn statistics(&self) -> LearningStatistics {
        self.store.statistics(self.config.activity_days)
    }

    pub fn items_prone_to_error(&self, limit: usize) -> Vec<ReviewItem> {
        self.store.items_prone_to_error(limit)
    }

    /// Scheduling decisions made since this trainer was opened.
    pub fn decision_log(&self) -> Vec<ScheduleDecision> {
        self.lock_scheduler().decisions().to_vec()
    }

    pub fn import_history(&self) -> Result<Vec<ImportAudit>> {
        Ok(self.store.import_history()?)
    }

    pub fn session_summary(&self) -> SessionSummary {
        self.lock_session().summary()
    }

    /// End the current session and return its final summary. Idempotent.
    pub fn end_session(&self) -> SessionSummary {
        let mut session = self.lock_session();
        session.end_session();
        session.summary()
    }

    /// Begin a fresh session, replacing the previous tracker.
    pub fn start_session(&self) -> Uuid {
        let mut session = self.lock_session();
        *session = SessionTracker::new(self.clock.clone());
        session.session_id()
    }

    /// Start the background sweeper for the explanation cache. Requires a
    /// tokio runtime; calling again while one is running is a no-op.
    pub fn start_maintenance(&self) {
        let mut sweepers = self.sweepers.lock().expect("sweeper lock");
        if !sweepers.is_empty() {
            return;
        }
        sweepers.push(CacheSweeper::spawn(
            self.explanation_cache.clone(),
            self.config.sweep_interval,
        ));
    }

    /// Stop background tasks and persist a final snapshot.
    pub async fn shutdown(&self) -> Result<()> {
        let sweepers: Vec<CacheSweeper> = {
            let mut guard = self.sweepers.lock().expect("sweeper lock");
            guard.drain(..).collect()
        };
        for sweeper in sweepers {
            sweeper.shutdown().await;
        }
        self.store.persist()?;
        info!("trainer shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn default_config_points_at_the_app_data_dir() {
        let config = TrainerConfig::default();
        assert!(config.data_dir.ends_with("vocab-trainer"));
        assert_eq!(config.snapshot_retention, 5);
        assert_eq!(config.explanation_ttl, Duration::days(7));
    }

    #[test]
    fn next_item_on_an_empty_store_is_none() {
        let dir = TempDir::new().unwrap();
        let config = TrainerConfig { data_dir: dir.path().to_path_buf(), ..Default::default() };
        let trainer = Trainer::open(config).unwrap();
        assert!(trainer.next_item().is_none());
    }
}
