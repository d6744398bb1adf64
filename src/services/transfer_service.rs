//! src/services/transfer_service.rs
//!
//! The pipelines behind the `parse`, `test` and `store` commands. Objects
//! are transferred strictly one after another: every chunk of an object is
//! read and uploaded before the next object is listed.

use crate::{
    destination::DestinationBucket,
    errors::TransferResult,
    models::{
        object::SourceObject,
        session::{SessionRecord, TransferSession},
    },
    services::{
        chunk_reader::ChunkReader, path_encoder, source_lister::SourceLister, uploader::Uploader,
    },
    source::SourceStore,
};
use bytes::Bytes;
use chrono::NaiveDate;
use futures::StreamExt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Name and payload of the connectivity probe uploaded by `test`.
pub const SAMPLE_NAME: &str = "testdata";
pub const SAMPLE_PAYLOAD: &[u8] = b"test";

#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub upload_path: String,
    pub window: u64,
    pub debug: bool,
}

#[derive(Debug)]
pub struct StoreReport {
    pub buckets: usize,
    pub objects: usize,
    pub chunks: u64,
    pub bytes: u64,
    pub session: TransferSession,
}

/// Buckets of the source store with the keys found in each.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub buckets: Vec<(String, Vec<String>)>,
}

/// List every bucket and object of the source store. With `debug` the
/// bucket creation dates and object sizes are echoed as well.
pub async fn parse<S: SourceStore + ?Sized>(source: &S, debug: bool) -> TransferResult<ParseReport> {
    let lister = SourceLister::new(source);
    let buckets = lister.list_buckets().await?;
    info!(source = source.name(), "Successfully connected to Zenko!");

    let mut report = ParseReport::default();
    for bucket in buckets {
        info!("Reading All files from the Zenko Orbit Bucket {}...", bucket.name);
        if debug {
            match bucket.created_at {
                Some(created) => debug!("Bucket {} created {}", bucket.name, created),
                None => debug!("Bucket {} has no creation date", bucket.name),
            }
        }
        let mut keys = Vec::new();
        let mut objects = lister.list_objects(&bucket.name);
        while let Some(object) = objects.next().await {
            let object = object?;
            info!("{}", object.key);
            if debug {
                debug!("{} ({} bytes)", object.key, object.size);
            }
            keys.push(object.key);
        }
        report.buckets.push((bucket.name, keys));
    }
    info!("Reading ALL files from the Zenko Orbit Bucket...Complete!");
    Ok(report)
}

/// Transfer every object of every source bucket into `bucket`.
pub async fn store<S, B>(
    source: &S,
    bucket: &B,
    session: TransferSession,
    opts: &StoreOptions,
) -> TransferResult<StoreReport>
where
    S: SourceStore + ?Sized,
    B: DestinationBucket + ?Sized,
{
    let lister = SourceLister::new(source);
    let buckets = lister.list_buckets().await?;
    info!(source = source.name(), "Successfully connected to Zenko!");

    let mut uploader = Uploader::new(bucket, &opts.upload_path, opts.debug);
    let mut report = StoreReport {
        buckets: buckets.len(),
        objects: 0,
        chunks: 0,
        bytes: 0,
        session,
    };

    for source_bucket in &buckets {
        let mut objects = lister.list_objects(&source_bucket.name);
        while let Some(object) = objects.next().await {
            let object = object?;
            info!("Reading content from the file : {}", object.key);
            let (chunks, bytes) =
                transfer_object(source, &mut uploader, &object, &mut report.session, opts.window)
                    .await?;
            report.objects += 1;
            report.chunks += chunks;
            report.bytes += bytes;
        }
    }

    report.session.uploaded_keys = uploader.into_uploaded();
    info!(
        buckets = report.buckets,
        objects = report.objects,
        chunks = report.chunks,
        bytes = report.bytes,
        session = %report.session.timestamp,
        "transfer complete"
    );
    Ok(report)
}

/// Chunk one object and upload each chunk. Records the object in the
/// session once at least one chunk landed; returns `(chunks, bytes)`.
pub async fn transfer_object<S, B>(
    source: &S,
    uploader: &mut Uploader<'_, B>,
    object: &SourceObject,
    session: &mut TransferSession,
    window: u64,
) -> TransferResult<(u64, u64)>
where
    S: SourceStore + ?Sized,
    B: DestinationBucket + ?Sized,
{
    let mut reader = ChunkReader::new(source, object, window);
    let mut last_key = None;
    let mut bytes = 0u64;

    while let Some(chunk) = reader.next_chunk().await? {
        let key = path_encoder::encode(&object.bucket, &object.key, &session.timestamp, chunk.index);
        bytes += chunk.len() as u64;
        uploader.upload(&key.to_string(), chunk.data).await?;
        info!("Uploading object to Storj bucket: Completed!");
        last_key = Some(key);
    }

    match last_key {
        Some(key) => {
            let chunks = key.index + 1;
            session.record(SessionRecord {
                prefix: key.prefix(),
                extension: key.extension,
                chunks,
            });
            Ok((chunks, bytes))
        }
        None => {
            info!("{} is empty; nothing to upload", object.key);
            Ok((0, 0))
        }
    }
}

/// Outcome of the `test` command.
#[derive(Debug, PartialEq, Eq)]
pub struct SampleUpload {
    /// Key the payload was written under, relative to the upload path.
    pub name: String,
    /// Local copy of the payload, written in debug mode.
    pub local_copy: Option<PathBuf>,
}

/// Upload the fixed probe payload. In debug mode the payload is named after
/// `today` and a local copy is written beside the working directory.
pub async fn upload_sample<B: DestinationBucket + ?Sized>(
    bucket: &B,
    upload_path: &str,
    debug: bool,
    today: NaiveDate,
    local_dir: &std::path::Path,
) -> TransferResult<SampleUpload> {
    let mut local_copy = None;
    let name = if debug {
        let name = format!("uploaddata_{}.txt", today.format("%Y-%m-%d"));
        let path = local_dir.join(&name);
        match tokio::fs::write(&path, SAMPLE_PAYLOAD).await {
            Ok(()) => local_copy = Some(path),
            Err(e) => warn!("Error while writing to file {}: {}", path.display(), e),
        }
        name
    } else {
        SAMPLE_NAME.to_string()
    };

    let mut uploader = Uploader::new(bucket, upload_path, debug);
    uploader
        .upload(&name, Bytes::from_static(SAMPLE_PAYLOAD))
        .await?;
    info!("Upload \"testdata\" on Storj: Successful!");
    Ok(SampleUpload { name, local_copy })
}
