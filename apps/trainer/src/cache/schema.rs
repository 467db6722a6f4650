//! SQLite schema for the cache index.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for one cache index database.
pub const SCHEMA: &str = r#"
-- One row per cached entry. `payload` is either the serialized value
-- itself or a path to a payload file, relative to the data directory.
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    size_bytes INTEGER NOT NULL DEFAULT 0
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_cache_entries_category ON cache_entries(category);
CREATE INDEX IF NOT EXISTS idx_cache_entries_created ON cache_entries(created_at);
"#;

/// Record the schema version if not already present.
pub const INIT_SCHEMA_VERSION: &str = r#"
INSERT OR IGNORE INTO schema_version (version) VALUES (1);
"#;
