//! Compression codec catalog
//!
//! Every stored blob references a codec by stable numeric id, persisted
//! in the `compression_types` table. Deflate is gzip-wrapped; brotli
//! levels 10 and 11 use a 16 MB window and block. Zstd is available
//! behind the `zstd` cargo feature.

use std::io::{Read, Write};
use std::time::Duration;

use crate::config::UseCase;

/// Payloads at or above this size compress on the blocking thread pool
const BLOCKING_COMPRESSION_THRESHOLD: usize = 1_048_576;

/// Timeout for offloaded compression work
const BLOCKING_COMPRESSION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("unknown compression type id {0}")]
    UnknownCodec(i64),
    #[error("codec {0} is not enabled in this build")]
    CodecDisabled(&'static str),
    #[error("compression timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A concrete compression algorithm + level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    /// Gzip-wrapped deflate, levels 1, 3, 6, 9
    Deflate(u32),
    /// Brotli levels 0-11
    Brotli(u32),
    /// Zstd levels 3 and 19 (feature-gated)
    #[cfg(feature = "zstd")]
    Zstd(i32),
}

/// Catalog row, mirrored into `compression_types`
#[derive(Debug, Clone)]
pub struct CodecSpec {
    pub id: i64,
    pub name: String,
    pub algorithm: &'static str,
    pub level: i64,
    pub memory_mb: i64,
    pub window_bits: i64,
    pub block_bits: i64,
}

impl Codec {
    /// Stable identifier used in the database
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::None => 1,
            Self::Deflate(1) => 2,
            Self::Deflate(3) => 3,
            Self::Deflate(6) => 4,
            Self::Deflate(_) => 5,
            Self::Brotli(level) => 6 + i64::from((*level).min(11)),
            #[cfg(feature = "zstd")]
            Self::Zstd(3) => 18,
            #[cfg(feature = "zstd")]
            Self::Zstd(_) => 19,
        }
    }

    /// Inverse of [`id`](Self::id)
    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::None),
            2 => Some(Self::Deflate(1)),
            3 => Some(Self::Deflate(3)),
            4 => Some(Self::Deflate(6)),
            5 => Some(Self::Deflate(9)),
            6..=17 => Some(Self::Brotli((id - 6) as u32)),
            #[cfg(feature = "zstd")]
            18 => Some(Self::Zstd(3)),
            #[cfg(feature = "zstd")]
            19 => Some(Self::Zstd(19)),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Deflate(level) => format!("deflate-{level}"),
            Self::Brotli(level) => format!("brotli-{level}"),
            #[cfg(feature = "zstd")]
            Self::Zstd(level) => format!("zstd-{level}"),
        }
    }

    /// Window size exponent (base-2); brotli 10-11 widen to 16 MB
    fn lgwin(&self) -> i32 {
        match self {
            Self::Brotli(level) if *level >= 10 => 24,
            Self::Brotli(_) => 22,
            _ => 0,
        }
    }

    fn lgblock(&self) -> i32 {
        match self {
            Self::Brotli(level) if *level >= 10 => 24,
            _ => 0,
        }
    }

    /// Pick a codec from payload size and the configured use case
    #[must_use]
    pub fn select(size: usize, use_case: UseCase) -> Self {
        if size < 1_024 {
            return Self::None;
        }
        if size < 10_240 {
            return match use_case {
                UseCase::Archival => Self::Brotli(6),
                _ => Self::Deflate(6),
            };
        }
        if size < 102_400 {
            return match use_case {
                UseCase::Realtime => Self::Deflate(3),
                UseCase::Standard => Self::Brotli(6),
                UseCase::High => Self::Brotli(9),
                UseCase::Archival => Self::Brotli(11),
            };
        }
        match use_case {
            UseCase::Realtime => Self::Deflate(1),
            UseCase::Standard => Self::Brotli(4),
            UseCase::High => Self::Brotli(9),
            UseCase::Archival => Self::Brotli(11),
        }
    }

    /// Codec used when whole buckets are compressed
    #[must_use]
    pub fn for_bucket(use_case: UseCase) -> Self {
        match use_case {
            UseCase::Realtime => Self::Brotli(6),
            UseCase::Standard | UseCase::High => Self::Brotli(9),
            UseCase::Archival => Self::Brotli(11),
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Deflate(level) => {
                let mut encoder = flate2::write::GzEncoder::new(
                    Vec::with_capacity(data.len() / 2),
                    flate2::Compression::new(*level),
                );
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Self::Brotli(level) => {
                let params = brotli::enc::BrotliEncoderParams {
                    quality: *level as i32,
                    lgwin: self.lgwin(),
                    lgblock: self.lgblock(),
                    ..Default::default()
                };
                let mut out = Vec::with_capacity(data.len() / 2);
                brotli::BrotliCompress(&mut &data[..], &mut out, &params)?;
                Ok(out)
            }
            #[cfg(feature = "zstd")]
            Self::Zstd(level) => Ok(zstd::stream::encode_all(data, *level)?),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Deflate(_) => {
                let mut decoder = flate2::read::GzDecoder::new(data);
                let mut out = Vec::with_capacity(data.len() * 4);
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
            Self::Brotli(_) => {
                let mut out = Vec::with_capacity(data.len() * 4);
                brotli::BrotliDecompress(&mut &data[..], &mut out)?;
                Ok(out)
            }
            #[cfg(feature = "zstd")]
            Self::Zstd(_) => Ok(zstd::stream::decode_all(data)?),
        }
    }

    /// Decompress by stored codec id
    pub fn decompress_with_id(id: i64, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let codec = Self::from_id(id).ok_or(CompressionError::UnknownCodec(id))?;
        codec.decompress(data)
    }

    /// Compress, offloading large payloads to the blocking thread pool
    ///
    /// Small payloads compress inline for lower overhead; anything at or
    /// above the 1 MB threshold moves to `spawn_blocking` so CPU-bound
    /// codec work never holds an async worker thread. Offloaded work is
    /// bounded by a 30 s timeout.
    pub async fn compress_off_thread(self, data: Vec<u8>) -> Result<Vec<u8>, CompressionError> {
        if data.len() < BLOCKING_COMPRESSION_THRESHOLD {
            return self.compress(&data);
        }
        let input_len = data.len();
        let task = tokio::task::spawn_blocking(move || self.compress(&data));
        match tokio::time::timeout(BLOCKING_COMPRESSION_TIMEOUT, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CompressionError::Io(std::io::Error::other(format!(
                "blocking compression task failed: {join_error}"
            )))),
            Err(_) => {
                log::warn!(
                    "{} compression of {input_len} bytes timed out after {BLOCKING_COMPRESSION_TIMEOUT:?}",
                    self.name()
                );
                Err(CompressionError::Timeout)
            }
        }
    }

    /// All codecs this build supports, for the `compression_types` table
    #[must_use]
    pub fn catalog() -> Vec<CodecSpec> {
        let mut specs = vec![CodecSpec {
            id: 1,
            name: "none".to_string(),
            algorithm: "none",
            level: 0,
            memory_mb: 0,
            window_bits: 0,
            block_bits: 0,
        }];
        for level in [1u32, 3, 6, 9] {
            let codec = Codec::Deflate(level);
            specs.push(CodecSpec {
                id: codec.id(),
                name: codec.name(),
                algorithm: "deflate",
                level: i64::from(level),
                memory_mb: 1,
                window_bits: 15,
                block_bits: 0,
            });
        }
        for level in 0u32..=11 {
            let codec = Codec::Brotli(level);
            specs.push(CodecSpec {
                id: codec.id(),
                name: codec.name(),
                algorithm: "brotli",
                level: i64::from(level),
                memory_mb: if level >= 10 { 256 } else { 16 },
                window_bits: i64::from(codec.lgwin()),
                block_bits: i64::from(codec.lgblock()),
            });
        }
        #[cfg(feature = "zstd")]
        for level in [3i32, 19] {
            let codec = Codec::Zstd(level);
            specs.push(CodecSpec {
                id: codec.id(),
                name: codec.name(),
                algorithm: "zstd",
                level: i64::from(level),
                memory_mb: if level >= 19 { 128 } else { 8 },
                window_bits: 0,
                block_bits: 0,
            });
        }
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        // Compressible but not trivial
        "the quick brown fox jumps over the lazy dog. "
            .repeat(200)
            .into_bytes()
    }

    #[test]
    fn roundtrip_every_cataloged_codec() {
        let data = sample();
        for spec in Codec::catalog() {
            let codec = Codec::from_id(spec.id).expect("catalog ids resolve");
            let compressed = codec.compress(&data).expect("compress");
            let restored = Codec::decompress_with_id(spec.id, &compressed).expect("decompress");
            assert_eq!(restored, data, "codec {} round trip", spec.name);
        }
    }

    #[test]
    fn id_mapping_is_bijective() {
        for spec in Codec::catalog() {
            let codec = Codec::from_id(spec.id).unwrap();
            assert_eq!(codec.id(), spec.id);
            assert_eq!(codec.name(), spec.name);
        }
        assert!(Codec::from_id(999).is_none());
    }

    #[test]
    fn selection_policy_by_size_and_tier() {
        assert_eq!(Codec::select(100, UseCase::Standard), Codec::None);
        assert_eq!(Codec::select(5_000, UseCase::Standard), Codec::Deflate(6));
        assert_eq!(Codec::select(5_000, UseCase::Archival), Codec::Brotli(6));
        assert_eq!(Codec::select(50_000, UseCase::Realtime), Codec::Deflate(3));
        assert_eq!(Codec::select(50_000, UseCase::High), Codec::Brotli(9));
        assert_eq!(Codec::select(50_000, UseCase::Archival), Codec::Brotli(11));
        assert_eq!(Codec::select(500_000, UseCase::Realtime), Codec::Deflate(1));
        assert_eq!(Codec::select(500_000, UseCase::Standard), Codec::Brotli(4));
    }

    #[test]
    fn brotli_high_levels_use_wide_window() {
        assert_eq!(Codec::Brotli(11).lgwin(), 24);
        assert_eq!(Codec::Brotli(6).lgwin(), 22);
    }

    #[tokio::test]
    async fn off_thread_compression_round_trips_large_payloads() {
        // Above the 1 MB threshold, so this exercises the spawn_blocking path
        let data = "bucket entries share vocabulary. ".repeat(40_000).into_bytes();
        assert!(data.len() >= 1_048_576);

        let codec = Codec::Brotli(4);
        let compressed = codec.compress_off_thread(data.clone()).await.unwrap();
        let restored = codec.decompress(&compressed).unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn small_payloads_compress_inline() {
        let data = b"small enough to stay on the async thread".to_vec();
        let codec = Codec::Deflate(6);
        let compressed = codec.compress_off_thread(data.clone()).await.unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }
}
