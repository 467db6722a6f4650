//! AI explanations, cache-fronted.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheError, CacheValue, ContentCache, PayloadStorage, Result as CacheResult};

/// What kind of content an explanation describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationKind {
    Word,
    Sentence,
}

impl ExplanationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplanationKind::Word => "word",
            ExplanationKind::Sentence => "sentence",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "word" => Some(ExplanationKind::Word),
            "sentence" => Some(ExplanationKind::Sentence),
            _ => None,
        }
    }
}

/// A word worth calling out inside a sentence explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyWordNote {
    pub word: String,
    pub meaning: String,
    pub usage: String,
}

/// Structured explanation produced by an [`Explainer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Explanation {
    Word {
        word: String,
        meanings: Vec<String>,
        examples: Vec<String>,
        synonyms: Vec<String>,
        pronunciation: String,
        word_class: String,
    },
    Sentence {
        sentence: String,
        translation: String,
        grammar_points: Vec<String>,
        key_words: Vec<KeyWordNote>,
        difficulty_level: u8,
    },
}

impl Explanation {
    pub fn kind(&self) -> ExplanationKind {
        match self {
            Explanation::Word { .. } => ExplanationKind::Word,
            Explanation::Sentence { .. } => ExplanationKind::Sentence,
        }
    }
}

impl CacheValue for Explanation {
    const STORAGE: PayloadStorage = PayloadStorage::Inline;

    fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// External explanation backend, typically an LLM behind some transport.
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(&self, content: &str, kind: ExplanationKind) -> anyhow::Result<Explanation>;
}

/// Errors from the explanation service.
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("explanation cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("explanation failed: {0}")]
    Provider(#[source] anyhow::Error),
}

/// Cache-fronted explanation service. The kind tag doubles as the cache
/// category, so a string explained as a word and as a sentence is cached
/// twice.
pub struct ExplainService<E: Explainer> {
    explainer: E,
    cache: Arc<ContentCache<Explanation>>,
}

impl<E: Explainer> ExplainService<E> {
    pub fn new(explainer: E, cache: Arc<ContentCache<Explanation>>) -> Self {
        Self { explainer, cache }
    }

    /// Fetch an explanation for `content`, querying the backend on a miss
    /// and writing the result through the cache.
    pub async fn explain(
        &self,
        content: &str,
        kind: ExplanationKind,
    ) -> Result<Explanation, ExplainError> {
        if let Some(explanation) = self.cache.get(content, kind.as_str())? {
            return Ok(explanation);
        }

        debug!(kind = kind.as_str(), "requesting explanation");
        let explanation = self
            .explainer
            .explain(content, kind)
            .await
            .map_err(ExplainError::Provider)?;
        self.cache.put(content, kind.as_str(), &explanation)?;
        Ok(explanation)
    }

    /// Warm the cache for every content string not already present. Returns
    /// how many explanations were fetched.
    pub async fn preload(
        &self,
        contents: &[String],
        kind: ExplanationKind,
    ) -> Result<usize, ExplainError> {
        let mut fetched = 0;
        for content in contents {
            if self.cache.get(content, kind.as_str())?.is_none() {
                let explanation = self
                    .explainer
                    .explain(content, kind)
                    .await
                    .map_err(ExplainError::Provider)?;
                self.cache.put(content, kind.as_str(), &explanation)?;
                fetched += 1;
            }
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use vocab_core::ManualClock;

    #[derive(Clone)]
    struct CountingExplainer {
        calls: Arc<AtomicUsize>,
    }

    impl CountingExplainer {
        fn new() -> Self {
            Self { calls: Arc::new(AtomicUsize::new(0)) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Explainer for CountingExplainer {
        async fn explain(
            &self,
            content: &str,
            kind: ExplanationKind,
        ) -> anyhow::Result<Explanation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match kind {
                ExplanationKind::Word => Explanation::Word {
                    word: content.to_string(),
                    meanings: vec!["a meaning".into()],
                    examples: vec![format!("{content} in context")],
                    synonyms: vec![],
                    pronunciation: "ˈsʌmθɪŋ".into(),
                    word_class: "noun".into(),
                },
                ExplanationKind::Sentence => Explanation::Sentence {
                    sentence: content.to_string(),
                    translation: "a translation".into(),
                    grammar_points: vec!["present simple".into()],
                    key_words: vec![KeyWordNote {
                        word: "key".into(),
                        meaning: "important".into(),
                        usage: "as an adjective".into(),
                    }],
                    difficulty_level: 2,
                },
            })
        }
    }

    fn explanation_cache(
        dir: &TempDir,
        ttl: Option<Duration>,
        clock: Arc<ManualClock>,
    ) -> Arc<ContentCache<Explanation>> {
        Arc::new(
            ContentCache::open(dir.path(), CacheConfig { name: "explanations", ttl }, clock)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn repeated_explain_hits_the_cache() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = CountingExplainer::new();
        let service =
            ExplainService::new(backend.clone(), explanation_cache(&dir, None, clock));

        let first = service.explain("run", ExplanationKind::Word).await.unwrap();
        let second = service.explain("run", ExplanationKind::Word).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn kinds_are_cached_separately() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = CountingExplainer::new();
        let service =
            ExplainService::new(backend.clone(), explanation_cache(&dir, None, clock));

        let as_word = service.explain("run", ExplanationKind::Word).await.unwrap();
        let as_sentence = service.explain("run", ExplanationKind::Sentence).await.unwrap();

        assert_eq!(as_word.kind(), ExplanationKind::Word);
        assert_eq!(as_sentence.kind(), ExplanationKind::Sentence);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn expired_explanation_is_fetched_again() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = CountingExplainer::new();
        let cache = explanation_cache(&dir, Some(Duration::days(7)), clock.clone());
        let service = ExplainService::new(backend.clone(), cache);

        service.explain("run", ExplanationKind::Word).await.unwrap();
        clock.advance(Duration::days(8));
        service.explain("run", ExplanationKind::Word).await.unwrap();

        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn preload_fetches_only_missing_contents() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = CountingExplainer::new();
        let service =
            ExplainService::new(backend.clone(), explanation_cache(&dir, None, clock));

        service.explain("apple", ExplanationKind::Word).await.unwrap();

        let contents = vec!["apple".to_string(), "pear".to_string()];
        let fetched = service.preload(&contents, ExplanationKind::Word).await.unwrap();

        assert_eq!(fetched, 1);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn explanation_json_round_trips_with_kind_tag() {
        let explanation = Explanation::Word {
            word: "run".into(),
            meanings: vec!["to move fast".into()],
            examples: vec![],
            synonyms: vec!["sprint".into()],
            pronunciation: "rʌn".into(),
            word_class: "verb".into(),
        };

        let json = serde_json::to_string(&explanation).unwrap();
        assert!(json.contains("\"kind\":\"word\""));
        let back: Explanation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, explanation);
    }
}
