//! Bucket archives: many small records tarred and compressed together
//!
//! Cold records with shared vocabulary compress an order of magnitude
//! better as one archive than individually. A bucket is a tar of raw
//! entries compressed as a whole, with a JSON index of
//! `entry key -> {size, sha256}` kept alongside the blob. Retrieval
//! decompresses the archive (via a small LRU of decompressed tars) and
//! scans for the key.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::StorageError;

/// Index entry for one record inside a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketIndexEntry {
    pub size: u64,
    pub sha256: String,
}

pub type BucketIndex = BTreeMap<String, BucketIndexEntry>;

/// Build a tar archive from `(key, bytes)` entries plus its index
pub fn build_bucket_tar(
    entries: &[(String, Vec<u8>)],
) -> Result<(Vec<u8>, BucketIndex), StorageError> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut index = BucketIndex::new();

    for (key, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, key, data.as_slice())?;
        index.insert(
            key.clone(),
            BucketIndexEntry {
                size: data.len() as u64,
                sha256: crate::crawl_engine::fetch::sha256_hex(data),
            },
        );
    }

    let tar_bytes = builder.into_inner()?;
    Ok((tar_bytes, index))
}

/// Scan a decompressed tar for one entry
pub fn extract_entry(tar_bytes: &[u8], key: &str) -> Result<Option<Vec<u8>>, StorageError> {
    let mut archive = tar::Archive::new(tar_bytes);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let matches = entry
            .path()
            .ok()
            .is_some_and(|p| p.to_string_lossy() == key);
        if matches {
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            return Ok(Some(data));
        }
    }
    Ok(None)
}

/// LRU of decompressed bucket tars, keyed by bucket id
///
/// Eviction drops only the in-memory tar buffer; the stored bucket blob
/// is untouched.
pub struct BucketCache {
    cache: Mutex<LruCache<i64, Arc<Vec<u8>>>>,
}

impl BucketCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    #[must_use]
    pub fn get(&self, bucket_id: i64) -> Option<Arc<Vec<u8>>> {
        self.cache.lock().get(&bucket_id).cloned()
    }

    pub fn put(&self, bucket_id: i64, tar_bytes: Arc<Vec<u8>>) {
        self.cache.lock().put(bucket_id, tar_bytes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tar_roundtrip_by_key() {
        let entries = vec![
            ("a".to_string(), b"alpha body".to_vec()),
            ("b".to_string(), b"beta body".to_vec()),
        ];
        let (tar_bytes, index) = build_bucket_tar(&entries).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index["a"].size, 10);

        let a = extract_entry(&tar_bytes, "a").unwrap().unwrap();
        assert_eq!(a, b"alpha body");
        let b = extract_entry(&tar_bytes, "b").unwrap().unwrap();
        assert_eq!(b, b"beta body");
    }

    #[test]
    fn missing_key_is_none_not_error() {
        let entries = vec![("only".to_string(), b"x".to_vec())];
        let (tar_bytes, _) = build_bucket_tar(&entries).unwrap();
        assert!(extract_entry(&tar_bytes, "absent").unwrap().is_none());
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = BucketCache::new(2);
        cache.put(1, Arc::new(vec![1]));
        cache.put(2, Arc::new(vec![2]));
        cache.put(3, Arc::new(vec![3]));
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_some());
    }
}
