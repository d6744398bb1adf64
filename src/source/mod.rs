//! Source store collaborator: the S3-compatible store objects are migrated from.
//!
//! The pipeline only needs three things from it: the bucket list, a lazy
//! cancellable object listing per bucket, and bounded range reads.

use crate::models::{bucket::SourceBucket, object::SourceObject};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::{ops::Range, pin::Pin};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod memory;
pub mod s3;

pub use memory::MemorySource;
pub use s3::{S3Source, S3SourceConfig};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("client error: {0}")]
    Client(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("list error: {0}")]
    List(String),
    #[error("get error: {0}")]
    Get(String),
}

/// Lazily produced listing entries. Each item is a descriptor or the error
/// that ended the listing.
pub type ObjectStream = Pin<Box<dyn Stream<Item = Result<SourceObject, SourceError>> + Send>>;

#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<SourceBucket>, SourceError>;

    /// List objects under `prefix`. The stream ends early once `cancel` fires.
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        cancel: CancellationToken,
    ) -> ObjectStream;

    /// Read the bytes of `key` in `range`; a range past the end is truncated.
    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>)
    -> Result<Bytes, SourceError>;

    fn name(&self) -> &'static str;
}
