//! Enumerates source buckets and, per bucket, a lazy recursive object listing.
//!
//! All listings share one cancellation token owned by the lister. The token
//! is cancelled when the lister is dropped, so every exit path of the caller
//! (completion, `?` on a fatal error, panic unwind) stops the enumeration.

use crate::{
    errors::{ErrorContext, TransferError, TransferResult},
    models::{bucket::SourceBucket, object::SourceObject},
    source::SourceStore,
};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::{CancellationToken, DropGuard};

pub type ObjectListing = Pin<Box<dyn Stream<Item = TransferResult<SourceObject>> + Send>>;

pub struct SourceLister<'a, S: SourceStore + ?Sized> {
    source: &'a S,
    done: CancellationToken,
    _guard: DropGuard,
}

impl<'a, S: SourceStore + ?Sized> SourceLister<'a, S> {
    pub fn new(source: &'a S) -> Self {
        let done = CancellationToken::new();
        let guard = done.clone().drop_guard();
        Self {
            source,
            done,
            _guard: guard,
        }
    }

    /// The token listings stop on. Clones observe the cancellation on drop.
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    pub async fn list_buckets(&self) -> TransferResult<Vec<SourceBucket>> {
        self.source
            .list_buckets()
            .await
            .map_err(|e| TransferError::connection(ErrorContext::new("list source buckets"), e))
    }

    /// Every object in `bucket`, recursively. The first error ends the run.
    pub fn list_objects(&self, bucket: &str) -> ObjectListing {
        let bucket_name = bucket.to_string();
        let objects = self
            .source
            .list_objects(bucket, "", true, self.done.child_token())
            .map(move |item| {
                item.map_err(|e| {
                    TransferError::listing(
                        ErrorContext::with_key("list source objects", bucket_name.clone()),
                        e,
                    )
                })
            });
        Box::pin(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[tokio::test]
    async fn lists_every_object_recursively() {
        let source = MemorySource::new();
        source.put_object("docs", "a.txt", &b"1"[..]);
        source.put_object("docs", "nested/deep/b.txt", &b"22"[..]);
        let lister = SourceLister::new(&source);

        let buckets = lister.list_buckets().await.unwrap();
        assert_eq!(buckets, vec![SourceBucket::new("docs")]);

        let objects: Vec<SourceObject> = lister
            .list_objects("docs")
            .map(|o| o.unwrap())
            .collect()
            .await;
        assert_eq!(
            objects,
            vec![
                SourceObject::new("docs", "a.txt", 1),
                SourceObject::new("docs", "nested/deep/b.txt", 2),
            ]
        );
    }

    #[tokio::test]
    async fn listing_error_surfaces_as_listing_error() {
        let source = MemorySource::new();
        source.put_object("docs", "a.txt", &b"1"[..]);
        source.put_object("docs", "b.txt", &b"1"[..]);
        source.fail_listing("docs");
        let lister = SourceLister::new(&source);

        let items: Vec<_> = lister.list_objects("docs").collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(TransferError::Listing { .. })));
    }

    #[tokio::test]
    async fn dropping_the_lister_cancels_enumeration() {
        let source = MemorySource::new();
        source.put_object("docs", "a.txt", &b"1"[..]);
        let lister = SourceLister::new(&source);
        let done = lister.done();
        let mut objects = lister.list_objects("docs");

        let early: TransferResult<()> = async {
            let _first = objects.next().await.transpose()?;
            Err(TransferError::upload(ErrorContext::new("test"), "boom"))
        }
        .await;
        assert!(early.is_err());
        assert!(!done.is_cancelled());

        drop(lister);
        assert!(done.is_cancelled());
        assert!(objects.next().await.is_none());
    }
}
