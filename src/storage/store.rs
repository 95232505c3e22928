//! Content-addressed persistence
//!
//! Fetched bodies are stored once per sha256. An incoming result whose
//! hash is already present is attached by reference; no second blob is
//! written. Individual records compress per the selection policy; an
//! explicit archival pass promotes cold records into bucket archives.

use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use crate::config::{CrawlConfig, UseCase};
use crate::crawl_engine::crawl_types::{CacheValidators, FetchResult};

use super::StorageError;
use super::bucket::{BucketCache, BucketIndex, build_bucket_tar, extract_entry};
use super::compression::Codec;
use super::db;

/// Result of persisting one fetch
#[derive(Debug, Clone, Copy)]
pub struct SaveOutcome {
    pub url_id: i64,
    pub content_id: i64,
    /// The body hash was already stored; no new blob written
    pub deduplicated: bool,
}

pub struct ContentStore {
    pool: SqlitePool,
    use_case: UseCase,
    bucket_cache: BucketCache,
}

impl ContentStore {
    /// Open the store at the configured database path
    pub async fn open(config: &CrawlConfig) -> Result<Self, StorageError> {
        let pool = db::open_pool(config.db_path()).await?;
        Ok(Self {
            pool,
            use_case: config.use_case(),
            bucket_cache: BucketCache::new(config.bucket_cache_capacity()),
        })
    }

    /// Open against a specific path with defaults (archival passes, tools)
    pub async fn open_at(path: &Path, use_case: UseCase) -> Result<Self, StorageError> {
        let pool = db::open_pool(path).await?;
        Ok(Self {
            pool,
            use_case,
            bucket_cache: BucketCache::new(10),
        })
    }

    /// In-memory store for tests
    pub async fn open_in_memory(use_case: UseCase) -> Result<Self, StorageError> {
        let pool = db::open_memory_pool().await?;
        Ok(Self {
            pool,
            use_case,
            bucket_cache: BucketCache::new(10),
        })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ---- URLs ----------------------------------------------------------

    /// Insert or touch a URL row; returns its id
    pub async fn upsert_url(&self, url: &str, host: &str) -> Result<i64, StorageError> {
        let now = chrono::Utc::now().timestamp();
        let row = sqlx::query(
            "INSERT INTO urls (url, host, created_at, last_seen_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(url) DO UPDATE SET last_seen_at = excluded.last_seen_at \
             RETURNING id",
        )
        .bind(url)
        .bind(host)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    // ---- Fetch persistence ---------------------------------------------

    /// Persist a fetch result: content blob (deduplicated by sha256) plus
    /// an `http_responses` row referencing it
    pub async fn save_fetch(&self, result: &FetchResult, host: &str) -> Result<SaveOutcome, StorageError> {
        let url_id = self.upsert_url(&result.url, host).await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM content_storage WHERE content_sha256 = ?")
                .bind(&result.content_sha256)
                .fetch_optional(&self.pool)
                .await?;

        let (content_id, deduplicated) = match existing {
            Some(id) => (id, true),
            None => {
                let codec = Codec::select(result.body.len(), self.use_case);
                let blob = codec.compress_off_thread(result.body.clone()).await?;
                let storage_type = if codec == Codec::None {
                    "inline"
                } else {
                    "db-compressed"
                };
                let ratio = if blob.is_empty() {
                    1.0
                } else {
                    result.body.len() as f64 / blob.len() as f64
                };
                // The UNIQUE constraint makes concurrent saves of the same
                // hash resolve to a single row.
                sqlx::query(
                    "INSERT INTO content_storage \
                     (storage_type, compression_type_id, content_blob, content_sha256, \
                      uncompressed_size, compressed_size, compression_ratio) \
                     VALUES (?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(content_sha256) DO NOTHING",
                )
                .bind(storage_type)
                .bind(codec.id())
                .bind(&blob)
                .bind(&result.content_sha256)
                .bind(result.body.len() as i64)
                .bind(blob.len() as i64)
                .bind(ratio)
                .execute(&self.pool)
                .await?;
                let id: i64 =
                    sqlx::query_scalar("SELECT id FROM content_storage WHERE content_sha256 = ?")
                        .bind(&result.content_sha256)
                        .fetch_one(&self.pool)
                        .await?;
                (id, false)
            }
        };

        sqlx::query(
            "INSERT INTO http_responses \
             (url_id, fetched_at, http_status, content_sha256, elapsed_ms, bytes_downloaded, \
              etag, last_modified) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(url_id)
        .bind(chrono::Utc::now().timestamp())
        .bind(i64::from(result.http_status))
        .bind(&result.content_sha256)
        .bind(result.elapsed_ms as i64)
        .bind(result.bytes_downloaded as i64)
        .bind(&result.cache_validators.etag)
        .bind(&result.cache_validators.last_modified)
        .execute(&self.pool)
        .await?;

        Ok(SaveOutcome {
            url_id,
            content_id,
            deduplicated,
        })
    }

    /// Record an article row for planner profiling and downstream readers
    pub async fn save_article(
        &self,
        url_id: i64,
        host: &str,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<i64, StorageError> {
        let row = sqlx::query(
            "INSERT INTO articles (url_id, title, body, host, fetched_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(url_id)
        .bind(title)
        .bind(body)
        .bind(host)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Record one edge of the referential link graph
    pub async fn record_link(&self, src_url_id: i64, dst_url_id: i64) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR IGNORE INTO links (src_url_id, dst_url_id) VALUES (?, ?)",
        )
        .bind(src_url_id)
        .bind(dst_url_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Cache lookups -------------------------------------------------

    /// Latest validators seen for a URL
    pub async fn validators_for(&self, url: &str) -> Result<Option<CacheValidators>, StorageError> {
        let row = sqlx::query(
            "SELECT hr.etag, hr.last_modified FROM http_responses hr \
             JOIN urls u ON u.id = hr.url_id \
             WHERE u.url = ? AND hr.http_status BETWEEN 200 AND 299 \
             ORDER BY hr.fetched_at DESC LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| CacheValidators {
            etag: r.get("etag"),
            last_modified: r.get("last_modified"),
        }))
    }

    /// Most recent stored body for a URL, regardless of age
    pub async fn cached_body(&self, url: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.cached_body_since(url, 0).await
    }

    /// Body for a URL fetched within the last `freshness_hours`
    pub async fn fresh_cached_body(
        &self,
        url: &str,
        freshness_hours: i64,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let cutoff = chrono::Utc::now().timestamp() - freshness_hours * 3600;
        self.cached_body_since(url, cutoff).await
    }

    async fn cached_body_since(
        &self,
        url: &str,
        cutoff: i64,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let sha: Option<String> = sqlx::query_scalar(
            "SELECT hr.content_sha256 FROM http_responses hr \
             JOIN urls u ON u.id = hr.url_id \
             WHERE u.url = ? AND hr.fetched_at >= ? \
               AND hr.http_status BETWEEN 200 AND 299 \
               AND hr.content_sha256 IS NOT NULL \
             ORDER BY hr.fetched_at DESC LIMIT 1",
        )
        .bind(url)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        match sha {
            Some(sha) => self.retrieve_by_sha(&sha).await,
            None => Ok(None),
        }
    }

    // ---- Retrieval -----------------------------------------------------

    /// Retrieve and decompress by content id
    pub async fn retrieve(&self, content_id: i64) -> Result<Vec<u8>, StorageError> {
        let row = sqlx::query(
            "SELECT storage_type, compression_type_id, content_blob, content_sha256, \
                    bucket_id, bucket_entry_key \
             FROM content_storage WHERE id = ?",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(content_id.to_string()))?;
        self.materialize(&row).await
    }

    /// Retrieve and decompress by content hash
    pub async fn retrieve_by_sha(&self, sha256: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query(
            "SELECT storage_type, compression_type_id, content_blob, content_sha256, \
                    bucket_id, bucket_entry_key \
             FROM content_storage WHERE content_sha256 = ?",
        )
        .bind(sha256)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.materialize(&row).await?)),
            None => Ok(None),
        }
    }

    async fn materialize(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Vec<u8>, StorageError> {
        let storage_type: String = row.get("storage_type");
        let sha: String = row.get("content_sha256");
        let body = match storage_type.as_str() {
            "bucket-compressed" => {
                let bucket_id: i64 = row.get("bucket_id");
                let key: String = row.get("bucket_entry_key");
                self.bucket_retrieve(bucket_id, &key).await?
            }
            _ => {
                let codec_id: i64 = row.get("compression_type_id");
                let blob: Vec<u8> = row.get("content_blob");
                Codec::decompress_with_id(codec_id, &blob)?
            }
        };
        let actual = crate::crawl_engine::fetch::sha256_hex(&body);
        if actual != sha {
            return Err(StorageError::ShaMismatch(sha));
        }
        Ok(body)
    }

    // ---- Buckets -------------------------------------------------------

    /// Promote the given hashes into one bucket archive
    ///
    /// Bodies are read, tarred raw, compressed as a whole, and the
    /// individual rows are flipped to `bucket-compressed` references.
    /// Run from an archival pass, not the fetch loop.
    pub async fn archive_into_bucket(
        &self,
        bucket_type: &str,
        sha256s: &[String],
    ) -> Result<i64, StorageError> {
        let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(sha256s.len());
        for sha in sha256s {
            let body = self
                .retrieve_by_sha(sha)
                .await?
                .ok_or_else(|| StorageError::NotFound(sha.clone()))?;
            entries.push((sha.clone(), body));
        }

        let (tar_bytes, index) = build_bucket_tar(&entries)?;
        let uncompressed: u64 = index.values().map(|e| e.size).sum();
        let codec = Codec::for_bucket(self.use_case);
        // Bucket tars routinely reach tens of MB at brotli-11; never
        // compress them on an async worker thread.
        let blob = codec.compress_off_thread(tar_bytes).await?;
        let index_json = serde_json::to_string(&index)
            .map_err(|e| StorageError::Other(format!("bucket index encode: {e}")))?;

        let row = sqlx::query(
            "INSERT INTO compression_buckets \
             (bucket_type, compression_type_id, content_count, uncompressed_size, \
              compressed_size, bucket_blob, index_json, finalized_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(bucket_type)
        .bind(codec.id())
        .bind(entries.len() as i64)
        .bind(uncompressed as i64)
        .bind(blob.len() as i64)
        .bind(&blob)
        .bind(&index_json)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        let bucket_id: i64 = row.get("id");

        for sha in sha256s {
            sqlx::query(
                "UPDATE content_storage SET storage_type = 'bucket-compressed', \
                 content_blob = NULL, bucket_id = ?, bucket_entry_key = ? \
                 WHERE content_sha256 = ?",
            )
            .bind(bucket_id)
            .bind(sha)
            .bind(sha)
            .execute(&self.pool)
            .await?;
        }

        log::info!(
            "bucket {bucket_id} sealed: {} entries, {} -> {} bytes",
            entries.len(),
            uncompressed,
            blob.len()
        );
        Ok(bucket_id)
    }

    /// Fetch one entry out of a bucket archive
    pub async fn bucket_retrieve(&self, bucket_id: i64, key: &str) -> Result<Vec<u8>, StorageError> {
        let tar_bytes = match self.bucket_cache.get(bucket_id) {
            Some(cached) => cached,
            None => {
                let row = sqlx::query(
                    "SELECT compression_type_id, bucket_blob, index_json \
                     FROM compression_buckets WHERE id = ?",
                )
                .bind(bucket_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StorageError::BucketNotFound(bucket_id))?;
                let codec_id: i64 = row.get("compression_type_id");
                let blob: Vec<u8> = row.get("bucket_blob");
                let tar = Arc::new(Codec::decompress_with_id(codec_id, &blob)?);
                self.bucket_cache.put(bucket_id, Arc::clone(&tar));
                tar
            }
        };

        let index = self.bucket_index(bucket_id).await?;
        if !index.contains_key(key) {
            return Err(StorageError::EntryNotFound(key.to_string()));
        }
        match extract_entry(&tar_bytes, key)? {
            Some(body) => Ok(body),
            // Indexed but missing from the archive: the bucket is damaged,
            // but the stored blob is left alone for forensics.
            None => Err(StorageError::CorruptBucket(bucket_id)),
        }
    }

    async fn bucket_index(&self, bucket_id: i64) -> Result<BucketIndex, StorageError> {
        let index_json: Option<String> =
            sqlx::query_scalar("SELECT index_json FROM compression_buckets WHERE id = ?")
                .bind(bucket_id)
                .fetch_optional(&self.pool)
                .await?;
        let index_json = index_json.ok_or(StorageError::BucketNotFound(bucket_id))?;
        serde_json::from_str(&index_json)
            .map_err(|e| StorageError::Other(format!("bucket index decode: {e}")))
    }

    // ---- Jobs ----------------------------------------------------------

    pub async fn record_job(
        &self,
        job_id: &str,
        status: &str,
        config_json: &str,
        url_id: Option<i64>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO crawl_jobs (id, status, started_at, config, url_id) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET status = excluded.status",
        )
        .bind(job_id)
        .bind(status)
        .bind(chrono::Utc::now().timestamp())
        .bind(config_json)
        .bind(url_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn finish_job(&self, job_id: &str, status: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE crawl_jobs SET status = ?, ended_at = ? WHERE id = ?")
            .bind(status)
            .bind(chrono::Utc::now().timestamp())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_queue_event(
        &self,
        job_id: &str,
        event_type: &str,
        data: &serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO queue_events (job_id, event_type, data, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(event_type)
        .bind(data.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
