//! SQLite schema and pool management
//!
//! Foreign keys are ON for every connection. Schema version is tracked
//! in `PRAGMA user_version` plus a `schema_migrations` audit row; the
//! codec catalog is seeded into `compression_types` on first open.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use super::StorageError;
use super::compression::Codec;

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    host TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_urls_host ON urls(host);

CREATE TABLE IF NOT EXISTS compression_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    algorithm TEXT NOT NULL,
    level INTEGER NOT NULL,
    memory_mb INTEGER NOT NULL DEFAULT 0,
    window_bits INTEGER NOT NULL DEFAULT 0,
    block_bits INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS compression_buckets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket_type TEXT NOT NULL,
    compression_type_id INTEGER NOT NULL REFERENCES compression_types(id),
    content_count INTEGER NOT NULL,
    uncompressed_size INTEGER NOT NULL,
    compressed_size INTEGER NOT NULL,
    bucket_blob BLOB NOT NULL,
    index_json TEXT NOT NULL,
    finalized_at INTEGER
);

CREATE TABLE IF NOT EXISTS content_storage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    storage_type TEXT NOT NULL,
    compression_type_id INTEGER NOT NULL REFERENCES compression_types(id),
    content_blob BLOB,
    content_sha256 TEXT NOT NULL UNIQUE,
    uncompressed_size INTEGER NOT NULL,
    compressed_size INTEGER NOT NULL,
    compression_ratio REAL NOT NULL,
    bucket_id INTEGER REFERENCES compression_buckets(id),
    bucket_entry_key TEXT
);

CREATE TABLE IF NOT EXISTS http_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    fetched_at INTEGER NOT NULL,
    http_status INTEGER NOT NULL,
    content_sha256 TEXT,
    elapsed_ms INTEGER NOT NULL,
    bytes_downloaded INTEGER NOT NULL,
    etag TEXT,
    last_modified TEXT
);
CREATE INDEX IF NOT EXISTS idx_http_responses_url ON http_responses(url_id, fetched_at);

CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    title TEXT,
    body TEXT,
    host TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_articles_host ON articles(host);

CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    src_url_id INTEGER NOT NULL REFERENCES urls(id),
    dst_url_id INTEGER NOT NULL REFERENCES urls(id),
    UNIQUE(src_url_id, dst_url_id)
);

CREATE TABLE IF NOT EXISTS planning_heuristics (
    domain TEXT PRIMARY KEY,
    patterns TEXT NOT NULL,
    confidence REAL NOT NULL,
    sample_size INTEGER NOT NULL,
    avg_lookahead REAL NOT NULL,
    branching_factor REAL NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS pattern_performance (
    pattern TEXT PRIMARY KEY,
    success_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    avg_value REAL NOT NULL DEFAULT 0,
    last_used INTEGER
);

CREATE TABLE IF NOT EXISTS crawl_jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    ended_at INTEGER,
    config TEXT,
    url_id INTEGER REFERENCES urls(id)
);

CREATE TABLE IF NOT EXISTS queue_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES crawl_jobs(id),
    event_type TEXT NOT NULL,
    data TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
";

/// Open (creating if needed) the content database at `path`
pub async fn open_pool(path: &Path) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database, for tests and dry runs
pub async fn open_memory_pool() -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    // A single pinned connection keeps the in-memory database alive
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    sqlx::raw_sql(SCHEMA).execute(pool).await?;

    let now = chrono::Utc::now().timestamp();
    for spec in Codec::catalog() {
        sqlx::query(
            "INSERT OR IGNORE INTO compression_types \
             (id, name, algorithm, level, memory_mb, window_bits, block_bits) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(spec.id)
        .bind(&spec.name)
        .bind(spec.algorithm)
        .bind(spec.level)
        .bind(spec.memory_mb)
        .bind(spec.window_bits)
        .bind(spec.block_bits)
        .execute(pool)
        .await?;
    }

    sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?, ?)")
        .bind(SCHEMA_VERSION)
        .bind(now)
        .execute(pool)
        .await?;
    sqlx::raw_sql(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
        .execute(pool)
        .await?;
    log::info!("content database schema at version {SCHEMA_VERSION}");
    Ok(())
}
