//! Pronunciation audio, cache-fronted.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheError, CacheValue, ContentCache, PayloadStorage, Result as CacheResult};

/// Synthesized audio for one text and voice pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl CacheValue for AudioClip {
    const STORAGE: PayloadStorage = PayloadStorage::File { extension: "mp3" };

    fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        Ok(Self { bytes: bytes.to_vec() })
    }
}

/// External text-to-speech backend.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Produce audio bytes for `text` spoken in `voice`.
    async fn synthesize(&self, text: &str, voice: &str) -> anyhow::Result<Vec<u8>>;
}

/// Errors from the speech service.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("audio cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[source] anyhow::Error),
}

/// Cache-fronted pronunciation service. The voice doubles as the cache
/// category, so the same text spoken by two voices is cached twice.
pub struct SpeechService<S: Synthesizer> {
    synthesizer: S,
    cache: Arc<ContentCache<AudioClip>>,
}

impl<S: Synthesizer> SpeechService<S> {
    pub fn new(synthesizer: S, cache: Arc<ContentCache<AudioClip>>) -> Self {
        Self { synthesizer, cache }
    }

    /// Fetch audio for `text`, synthesizing on a miss and writing the result
    /// through the cache.
    pub async fn pronounce(&self, text: &str, voice: &str) -> Result<AudioClip, SpeechError> {
        if let Some(clip) = self.cache.get(text, voice)? {
            return Ok(clip);
        }

        debug!(voice, "synthesizing audio");
        let bytes = self
            .synthesizer
            .synthesize(text, voice)
            .await
            .map_err(SpeechError::Synthesis)?;
        let clip = AudioClip::new(bytes);
        self.cache.put(text, voice, &clip)?;
        Ok(clip)
    }

    /// Warm the cache for every text not already present. Returns how many
    /// clips were synthesized.
    pub async fn preload(&self, texts: &[String], voice: &str) -> Result<usize, SpeechError> {
        let mut produced = 0;
        for text in texts {
            if self.cache.get(text, voice)?.is_none() {
                let bytes = self
                    .synthesizer
                    .synthesize(text, voice)
                    .await
                    .map_err(SpeechError::Synthesis)?;
                self.cache.put(text, voice, &AudioClip::new(bytes))?;
                produced += 1;
            }
        }
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use vocab_core::ManualClock;

    #[derive(Clone)]
    struct CountingSynth {
        calls: Arc<AtomicUsize>,
    }

    impl CountingSynth {
        fn new() -> Self {
            Self { calls: Arc::new(AtomicUsize::new(0)) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Synthesizer for CountingSynth {
        async fn synthesize(&self, text: &str, voice: &str) -> anyhow::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{voice}:{text}").into_bytes())
        }
    }

    struct FailingSynth;

    #[async_trait]
    impl Synthesizer for FailingSynth {
        async fn synthesize(&self, _text: &str, _voice: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("tts backend unreachable")
        }
    }

    fn audio_cache(dir: &TempDir) -> Arc<ContentCache<AudioClip>> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        Arc::new(
            ContentCache::open(dir.path(), CacheConfig { name: "audio", ttl: None }, clock)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn second_pronounce_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let synth = CountingSynth::new();
        let service = SpeechService::new(synth.clone(), audio_cache(&dir));

        let first = service.pronounce("hello", "en-US").await.unwrap();
        let second = service.pronounce("hello", "en-US").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(synth.calls(), 1);
    }

    #[tokio::test]
    async fn different_voices_synthesize_separately() {
        let dir = TempDir::new().unwrap();
        let synth = CountingSynth::new();
        let service = SpeechService::new(synth.clone(), audio_cache(&dir));

        service.pronounce("hello", "en-US").await.unwrap();
        service.pronounce("hello", "en-GB").await.unwrap();

        assert_eq!(synth.calls(), 2);
    }

    #[tokio::test]
    async fn preload_skips_already_cached_texts() {
        let dir = TempDir::new().unwrap();
        let synth = CountingSynth::new();
        let service = SpeechService::new(synth.clone(), audio_cache(&dir));

        service.pronounce("apple", "en-US").await.unwrap();

        let texts = vec!["apple".to_string(), "pear".to_string(), "plum".to_string()];
        let produced = service.preload(&texts, "en-US").await.unwrap();

        assert_eq!(produced, 2);
        assert_eq!(synth.calls(), 3);
    }

    #[tokio::test]
    async fn synthesis_failure_surfaces() {
        let dir = TempDir::new().unwrap();
        let service = SpeechService::new(FailingSynth, audio_cache(&dir));

        let err = service.pronounce("hello", "en-US").await.unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis(_)));
    }
}
