//! Content storage engine: codecs, buckets, SQLite persistence

pub mod bucket;
pub mod compression;
pub mod db;
pub mod store;

pub use bucket::{BucketCache, BucketIndex, BucketIndexEntry};
pub use compression::{Codec, CodecSpec, CompressionError};
pub use store::{ContentStore, SaveOutcome};

/// Storage-layer errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Compression(#[from] CompressionError),
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("bucket {0} not found")]
    BucketNotFound(i64),
    #[error("entry-not-found: {0}")]
    EntryNotFound(String),
    #[error("bucket {0} index does not match its archive")]
    CorruptBucket(i64),
    #[error("stored content failed sha256 verification: {0}")]
    ShaMismatch(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}
