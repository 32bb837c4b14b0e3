//! Chunked, ordered download of the source recording.
//!
//! The recording is pulled with repeated ranged reads of a fixed chunk size
//! and written to the sink in order. Total length is only known once the
//! first response's `Content-Range` arrives; every later range is clamped to
//! it. No partial resume: a failed download fails the whole job and a fresh
//! job starts over.

use async_trait::async_trait;
use awsio::error::ServiceError;
use awsio::s3::{RangedChunk, S3Client};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Ranged read access to the recording store.
#[async_trait]
pub trait ObjectRangeStore: Send + Sync {
    async fn fetch_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> std::result::Result<RangedChunk, ServiceError>;
}

#[async_trait]
impl ObjectRangeStore for S3Client {
    async fn fetch_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> std::result::Result<RangedChunk, ServiceError> {
        self.get_object_range(bucket, key, start, end).await
    }
}

/// Downloads an object in fixed-size contiguous ranges.
#[derive(Debug, Clone)]
pub struct ChunkedFetcher {
    chunk_size: u64,
}

impl Default for ChunkedFetcher {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Download `bucket`/`key` into `sink`. Returns the number of bytes
    /// written.
    pub async fn download_to<S, W>(
        &self,
        store: &S,
        bucket: &str,
        key: &str,
        sink: &mut W,
    ) -> Result<u64>
    where
        S: ObjectRangeStore + ?Sized,
        W: AsyncWrite + Unpin + Send,
    {
        let mut start = 0u64;
        let mut total_length: Option<u64> = None;
        let mut written = 0u64;
        let mut requests = 0u64;

        loop {
            let mut end = start + self.chunk_size - 1;
            if let Some(total) = total_length {
                end = end.min(total - 1);
            }

            let chunk = store
                .fetch_range(bucket, key, start, end)
                .await
                .map_err(|e| Error::transfer(bucket, key, e.to_string()))?;
            requests += 1;

            let (served_end, total) = parse_content_range(&chunk.content_range)
                .ok_or_else(|| {
                    Error::transfer(
                        bucket,
                        key,
                        format!("unparsable Content-Range `{}`", chunk.content_range),
                    )
                })?;
            if served_end < start || total == 0 {
                return Err(Error::transfer(
                    bucket,
                    key,
                    format!("non-advancing Content-Range `{}`", chunk.content_range),
                ));
            }
            total_length = Some(total);

            sink.write_all(&chunk.body).await?;
            written += chunk.body.len() as u64;

            if served_end >= total - 1 {
                break;
            }
            start = served_end + 1;
        }

        sink.flush().await?;
        debug!(bucket, key, bytes = written, requests, "download complete");
        Ok(written)
    }
}

/// Parse `bytes <start>-<end>/<total>`. Stores that answer with an unknown
/// total (`*`) are treated as malformed; this loop cannot terminate without
/// a concrete length.
fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (_, end) = range.split_once('-')?;
    Some((end.trim().parse().ok()?, total.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rstest::rstest;
    use std::sync::Mutex;

    /// In-memory store that serves ranges out of a byte vector and records
    /// every requested range.
    struct FakeStore {
        object: Vec<u8>,
        requests: Mutex<Vec<(u64, u64)>>,
    }

    impl FakeStore {
        fn new(len: usize) -> Self {
            let object = (0..len).map(|i| (i % 251) as u8).collect();
            Self {
                object,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<(u64, u64)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectRangeStore for FakeStore {
        async fn fetch_range(
            &self,
            _bucket: &str,
            _key: &str,
            start: u64,
            end: u64,
        ) -> std::result::Result<RangedChunk, ServiceError> {
            self.requests.lock().unwrap().push((start, end));
            let total = self.object.len() as u64;
            let served_end = end.min(total.saturating_sub(1));
            let body = Bytes::copy_from_slice(
                &self.object[start as usize..=served_end as usize],
            );
            Ok(RangedChunk {
                body,
                content_range: format!("bytes {start}-{served_end}/{total}"),
            })
        }
    }

    #[tokio::test]
    async fn two_and_a_half_mib_object_takes_three_requests() {
        let store = FakeStore::new(2_621_440);
        let fetcher = ChunkedFetcher::new();
        let mut sink = Vec::new();

        let written = fetcher
            .download_to(&store, "recordings", "call.wav", &mut sink)
            .await
            .unwrap();

        assert_eq!(written, 2_621_440);
        assert_eq!(sink, store.object);
        assert_eq!(
            store.requested(),
            vec![
                (0, 1_048_575),
                (1_048_576, 2_097_151),
                (2_097_152, 2_621_439),
            ]
        );
    }

    #[rstest]
    #[case(1, 1024, 1)]
    #[case(1024, 1024, 1)]
    #[case(1025, 1024, 2)]
    #[case(10_000, 1000, 10)]
    #[case(10_001, 1000, 11)]
    #[tokio::test]
    async fn request_count_is_length_over_chunk_rounded_up(
        #[case] len: usize,
        #[case] chunk: u64,
        #[case] expected_requests: usize,
    ) {
        let store = FakeStore::new(len);
        let fetcher = ChunkedFetcher::new().with_chunk_size(chunk);
        let mut sink = Vec::new();

        fetcher
            .download_to(&store, "recordings", "call.wav", &mut sink)
            .await
            .unwrap();

        let requested = store.requested();
        assert_eq!(requested.len(), expected_requests);
        assert_eq!(sink.len(), len);

        // Contiguous and non-overlapping, ending at len - 1.
        let mut expected_start = 0u64;
        for (start, _) in &requested {
            assert_eq!(*start, expected_start);
            expected_start = start + chunk;
        }
        assert_eq!(
            requested.last().unwrap().1.min(len as u64 - 1),
            len as u64 - 1
        );
    }

    #[tokio::test]
    async fn unparsable_content_range_is_a_transfer_error() {
        struct BrokenStore;

        #[async_trait]
        impl ObjectRangeStore for BrokenStore {
            async fn fetch_range(
                &self,
                _bucket: &str,
                _key: &str,
                _start: u64,
                _end: u64,
            ) -> std::result::Result<RangedChunk, ServiceError> {
                Ok(RangedChunk {
                    body: Bytes::from_static(b"data"),
                    content_range: "bytes 0-3/*".to_string(),
                })
            }
        }

        let fetcher = ChunkedFetcher::new();
        let mut sink = Vec::new();
        let err = fetcher
            .download_to(&BrokenStore, "recordings", "call.wav", &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
    }

    #[tokio::test]
    async fn store_failure_is_a_transfer_error() {
        struct FailingStore;

        #[async_trait]
        impl ObjectRangeStore for FailingStore {
            async fn fetch_range(
                &self,
                _bucket: &str,
                _key: &str,
                _start: u64,
                _end: u64,
            ) -> std::result::Result<RangedChunk, ServiceError> {
                Err(ServiceError::missing_field("GetObject", "Content-Range"))
            }
        }

        let fetcher = ChunkedFetcher::new();
        let mut sink = Vec::new();
        let err = fetcher
            .download_to(&FailingStore, "recordings", "call.wav", &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { bucket, .. } if bucket == "recordings"));
    }
}
