//! In-process `SourceStore` holding buckets and objects in memory.

use super::{ObjectStream, SourceError, SourceStore};
use crate::models::{bucket::SourceBucket, object::SourceObject};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{
    collections::BTreeMap,
    ops::Range,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio_util::sync::CancellationToken;

type Objects = BTreeMap<String, BTreeMap<String, Bytes>>;

/// Buckets are kept sorted by name and objects by key, which is the order
/// an S3 listing returns them in.
#[derive(Clone, Default)]
pub struct MemorySource {
    buckets: Arc<Mutex<Objects>>,
    range_reads: Arc<AtomicUsize>,
    stalled: Arc<Mutex<Vec<String>>>,
    failing_listings: Arc<Mutex<Vec<String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().entry(bucket.to_string()).or_default();
    }

    pub fn put_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// Every range read of `key` returns no bytes.
    pub fn stall_object(&self, key: &str) {
        if let Ok(mut stalled) = self.stalled.lock() {
            stalled.push(key.to_string());
        }
    }

    /// Listing `bucket` yields an error after its first entry.
    pub fn fail_listing(&self, bucket: &str) {
        if let Ok(mut failing) = self.failing_listings.lock() {
            failing.push(bucket.to_string());
        }
    }

    /// Number of `get_range` calls served so far.
    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Objects> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn list_buckets(&self) -> Result<Vec<SourceBucket>, SourceError> {
        Ok(self.lock().keys().map(SourceBucket::new).collect())
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        cancel: CancellationToken,
    ) -> ObjectStream {
        let mut items: Vec<Result<SourceObject, SourceError>> = match self.lock().get(bucket) {
            Some(objects) => objects
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .filter(|(key, _)| recursive || !key[prefix.len()..].contains('/'))
                .map(|(key, data)| Ok(SourceObject::new(bucket, key, data.len() as u64)))
                .collect(),
            None => vec![Err(SourceError::BucketNotFound(bucket.to_string()))],
        };
        let failing = self
            .failing_listings
            .lock()
            .map(|f| f.iter().any(|b| b == bucket))
            .unwrap_or(false);
        if failing {
            items.truncate(1);
            items.push(Err(SourceError::List(format!("listing of `{bucket}` interrupted"))));
        }
        Box::pin(stream::iter(items).take_until(cancel.cancelled_owned()))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        range: Range<u64>,
    ) -> Result<Bytes, SourceError> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        let stalled = self
            .stalled
            .lock()
            .map(|s| s.iter().any(|k| k == key))
            .unwrap_or(false);
        if stalled {
            return Ok(Bytes::new());
        }
        let guard = self.lock();
        let data = guard
            .get(bucket)
            .ok_or_else(|| SourceError::BucketNotFound(bucket.to_string()))?
            .get(key)
            .ok_or_else(|| SourceError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        let len = data.len() as u64;
        let start = range.start.min(len) as usize;
        let end = range.end.min(len) as usize;
        Ok(data.slice(start..end.max(start)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn non_recursive_listing_skips_nested_keys() {
        let source = MemorySource::new();
        source.put_object("docs", "top.txt", &b"a"[..]);
        source.put_object("docs", "nested/deep.txt", &b"b"[..]);

        let keys: Vec<String> = source
            .list_objects("docs", "", false, CancellationToken::new())
            .map(|o| o.map(|o| o.key).unwrap_or_default())
            .collect()
            .await;
        assert_eq!(keys, vec!["top.txt".to_string()]);
    }

    #[tokio::test]
    async fn cancelled_listing_yields_nothing() {
        let source = MemorySource::new();
        source.put_object("docs", "a.txt", &b"a"[..]);
        let token = CancellationToken::new();
        token.cancel();
        let count = source.list_objects("docs", "", true, token).count().await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn range_past_end_is_truncated() {
        let source = MemorySource::new();
        source.put_object("docs", "a.txt", &b"hello"[..]);
        let bytes = source.get_range("docs", "a.txt", 3..100).await.unwrap();
        assert_eq!(&bytes[..], b"lo");
        let empty = source.get_range("docs", "a.txt", 10..20).await.unwrap();
        assert!(empty.is_empty());
    }
}
