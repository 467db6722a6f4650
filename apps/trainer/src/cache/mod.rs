//! Content-addressed TTL cache for expensive external payloads.
//!
//! Each cache pairs a small SQLite index with payload storage chosen by the
//! value type: audio clips land as files next to the index, structured
//! explanations are stored inline in the row. Keys are derived from the
//! normalized content plus a category, so the same text never pays for
//! synthesis or explanation twice.

pub mod schema;
pub mod sweeper;

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use vocab_core::Clock;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("cache payload I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid cache data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Where payload bytes for a value type live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStorage {
    /// Serialized into the index row itself.
    Inline,
    /// Written to a file beside the index; the row stores a relative path.
    File { extension: &'static str },
}

/// A value type that can live in a [`ContentCache`].
pub trait CacheValue: Sized {
    const STORAGE: PayloadStorage;

    fn to_bytes(&self) -> Result<Vec<u8>>;
    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

/// Cache construction parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Short name, used for the index filename and the payload directory.
    pub name: &'static str,
    /// Entry lifetime measured from creation. `None` keeps entries forever.
    pub ttl: Option<Duration>,
}

/// Per-category slice of the cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub entries: usize,
    pub size_bytes: u64,
    pub avg_hits: f64,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub by_category: BTreeMap<String, CategoryStats>,
}

/// Derive the content-addressed key for a lookup.
///
/// Case and whitespace runs are normalized away so formatting differences do
/// not create duplicate entries. The category participates in the hash, so
/// the same text cached under two voices yields two entries.
pub fn cache_key(category: &str, content: &str) -> String {
    let normalized = normalize_content(content);
    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

enum IndexRow {
    Live(String),
    Expired(String),
}

/// One cache instance: a SQLite index plus payload storage.
///
/// Lookups hold the index lock only for row operations; payload file reads
/// and writes happen outside the critical section.
pub struct ContentCache<V: CacheValue> {
    conn: Mutex<Connection>,
    data_dir: PathBuf,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    _marker: PhantomData<fn() -> V>,
}

impl<V: CacheValue> ContentCache<V> {
    /// Open (or create) a cache under `data_dir`.
    pub fn open(data_dir: &Path, config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        if let PayloadStorage::File { .. } = V::STORAGE {
            std::fs::create_dir_all(data_dir.join(config.name))?;
        }
        let conn = Connection::open(data_dir.join(format!("{}_cache.db", config.name)))?;
        Self::from_connection(conn, data_dir, config, clock)
    }

    /// Open with an in-memory index. Payload files still go under `data_dir`.
    pub fn open_in_memory(data_dir: &Path, config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        if let PayloadStorage::File { .. } = V::STORAGE {
            std::fs::create_dir_all(data_dir.join(config.name))?;
        }
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, data_dir, config, clock)
    }

    fn from_connection(
        conn: Connection,
        data_dir: &Path,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        conn.execute_batch(schema::SCHEMA)?;
        conn.execute_batch(schema::INIT_SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
            data_dir: data_dir.to_path_buf(),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }

    /// Short name this cache was configured with.
    pub fn name(&self) -> &'static str {
        self.config.name
    }

    fn lock_index(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("cache index lock")
    }

    /// Look up `content` under `category`.
    ///
    /// Expired entries are deleted on the spot and reported as misses. An
    /// index row whose payload file has vanished is dropped the same way, so
    /// the index heals itself instead of failing the lookup.
    pub fn get(&self, content: &str, category: &str) -> Result<Option<V>> {
        let key = cache_key(category, content);
        let now = self.clock.now();

        let row = {
            let conn = self.lock_index();
            let found = conn
                .query_row(
                    "SELECT payload, created_at FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            match found {
                None => None,
                Some((payload, created_at)) => {
                    let created = parse_timestamp(&created_at)?;
                    let expired = match self.config.ttl {
                        Some(ttl) => now - created >= ttl,
                        None => false,
                    };
                    if expired {
                        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                        Some(IndexRow::Expired(payload))
                    } else {
                        conn.execute(
                            "UPDATE cache_entries
                             SET last_accessed_at = ?1, hit_count = hit_count + 1
                             WHERE key = ?2",
                            params![now.to_rfc3339(), key],
                        )?;
                        Some(IndexRow::Live(payload))
                    }
                }
            }
        };

        match row {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Some(IndexRow::Expired(payload)) => {
                self.remove_payload(&payload);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(cache = self.config.name, category, "entry expired on read");
                Ok(None)
            }
            Some(IndexRow::Live(payload)) => match self.read_payload(&payload)? {
                Some(bytes) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Ok(Some(V::from_bytes(&bytes)?))
                }
                None => {
                    {
                        let conn = self.lock_index();
                        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                    }
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        cache = self.config.name,
                        category, "removed index entry with missing payload file"
                    );
                    Ok(None)
                }
            },
        }
    }

    /// Store `value` under `content` and `category`, replacing any previous
    /// entry. Replacement restarts the entry's TTL.
    pub fn put(&self, content: &str, category: &str, value: &V) -> Result<()> {
        let key = cache_key(category, content);
        let bytes = value.to_bytes()?;
        let size = bytes.len() as i64;

        let payload = match V::STORAGE {
            PayloadStorage::Inline => String::from_utf8(bytes)
                .map_err(|_| CacheError::InvalidData("inline payload is not UTF-8".into()))?,
            PayloadStorage::File { extension } => {
                let relative = format!("{}/{}.{}", self.config.name, key, extension);
                std::fs::write(self.data_dir.join(&relative), &bytes)?;
                relative
            }
        };

        let now = self.clock.now().to_rfc3339();
        let conn = self.lock_index();
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (key, description, category, payload, created_at, last_accessed_at, hit_count, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![key, content, category, payload, now, now, size],
        )?;
        Ok(())
    }

    /// Delete every entry older than the TTL. Returns how many were removed.
    ///
    /// Candidates are snapshotted first and then deleted one at a time, so
    /// concurrent lookups interleave with the sweep instead of stalling
    /// behind it.
    pub fn sweep_expired(&self) -> Result<usize> {
        let ttl = match self.config.ttl {
            Some(ttl) => ttl,
            None => return Ok(0),
        };
        let cutoff = (self.clock.now() - ttl).to_rfc3339();

        let candidates: Vec<(String, String)> = {
            let conn = self.lock_index();
            let mut stmt =
                conn.prepare("SELECT key, payload FROM cache_entries WHERE created_at <= ?1")?;
            let rows = stmt
                .query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut removed = 0;
        for (key, payload) in candidates {
            self.remove_payload(&payload);
            let conn = self.lock_index();
            removed += conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        }

        if removed > 0 {
            debug!(cache = self.config.name, removed, "swept expired entries");
        }
        Ok(removed)
    }

    /// Aggregate statistics over the index plus the process-local hit and
    /// miss counters.
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock_index();

        let (entries, total_size_bytes) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM cache_entries",
            [],
            |row| Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as u64)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*), COALESCE(SUM(size_bytes), 0), AVG(hit_count)
             FROM cache_entries GROUP BY category",
        )?;
        let by_category = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    CategoryStats {
                        entries: row.get::<_, i64>(1)? as usize,
                        size_bytes: row.get::<_, i64>(2)? as u64,
                        avg_hits: row.get::<_, f64>(3)?,
                    },
                ))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        Ok(CacheStats {
            entries,
            total_size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            by_category,
        })
    }

    fn read_payload(&self, payload: &str) -> Result<Option<Vec<u8>>> {
        match V::STORAGE {
            PayloadStorage::Inline => Ok(Some(payload.as_bytes().to_vec())),
            PayloadStorage::File { .. } => {
                let path = self.data_dir.join(payload);
                match std::fs::read(&path) {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn remove_payload(&self, payload: &str) {
        if let PayloadStorage::File { .. } = V::STORAGE {
            let path = self.data_dir.join(payload);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        cache = self.config.name,
                        path = %path.display(),
                        error = %e,
                        "failed to remove payload file"
                    );
                }
            }
        }
    }
}
