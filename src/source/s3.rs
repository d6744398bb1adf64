//! `SourceStore` backed by an S3-compatible endpoint (Zenko, MinIO, AWS).

use super::{ObjectStream, SourceError, SourceStore};
use crate::models::{bucket::SourceBucket, object::SourceObject};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region, SharedCredentialsProvider};
use aws_sdk_s3::{Client, Config};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::{StreamExt, stream};
use std::ops::Range;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Connection settings for the S3 client.
#[derive(Debug, Clone)]
pub struct S3SourceConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Clone)]
pub struct S3Source {
    client: Client,
}

/// Pagination state for one `list_objects_v2` walk.
enum ListState {
    Start,
    Next(String),
    Done,
}

impl S3Source {
    pub fn new(cfg: &S3SourceConfig) -> Self {
        let creds = Credentials::new(
            &cfg.access_key_id,
            &cfg.secret_access_key,
            None,
            None,
            "zenko",
        );
        let mut builder = Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(creds))
            .force_path_style(true);
        if !cfg.endpoint.is_empty() {
            builder = builder.endpoint_url(normalize_endpoint(&cfg.endpoint));
        }
        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// Zenko configs usually carry a bare `host:port`; the SDK wants a URL.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

#[async_trait]
impl SourceStore for S3Source {
    async fn list_buckets(&self) -> Result<Vec<SourceBucket>, SourceError> {
        let out = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| SourceError::Client(e.to_string()))?;
        Ok(out
            .buckets()
            .iter()
            .filter_map(|b| {
                let name = b.name()?;
                Some(SourceBucket {
                    name: name.to_string(),
                    created_at: b
                        .creation_date()
                        .and_then(|d| Utc.timestamp_opt(d.secs(), 0).single()),
                })
            })
            .collect())
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        cancel: CancellationToken,
    ) -> ObjectStream {
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();

        let pages = stream::unfold(ListState::Start, move |state| {
            let client = client.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            async move {
                let token = match state {
                    ListState::Done => return None,
                    ListState::Start => None,
                    ListState::Next(token) => Some(token),
                };
                let mut req = client.list_objects_v2().bucket(&bucket);
                if !prefix.is_empty() {
                    req = req.prefix(&prefix);
                }
                if !recursive {
                    req = req.delimiter("/");
                }
                if let Some(token) = token {
                    req = req.continuation_token(token);
                }
                match req.send().await {
                    Ok(out) => {
                        let items: Vec<Result<SourceObject, SourceError>> = out
                            .contents()
                            .iter()
                            .filter_map(|o| {
                                let key = o.key()?;
                                let size = o.size().unwrap_or(0).max(0) as u64;
                                Some(Ok(SourceObject::new(&bucket, key, size)))
                            })
                            .collect();
                        let next = match out.next_continuation_token() {
                            Some(t) if out.is_truncated().unwrap_or(false) => {
                                ListState::Next(t.to_string())
                            }
                            _ => ListState::Done,
                        };
                        debug!(bucket = %bucket, count = items.len(), "S3 list page");
                        Some((stream::iter(items), next))
                    }
                    Err(e) => {
                        let s = e.to_string();
                        warn!(bucket = %bucket, error = %s, "S3 list failed");
                        Some((stream::iter(vec![Err(SourceError::List(s))]), ListState::Done))
                    }
                }
            }
        })
        .flatten();

        Box::pin(pages.take_until(cancel.cancelled_owned()))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        range: Range<u64>,
    ) -> Result<Bytes, SourceError> {
        if range.start >= range.end {
            return Ok(Bytes::new());
        }
        let range_header = format!("bytes={}-{}", range.start, range.end - 1);
        let start = Instant::now();
        let out = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(&range_header)
            .send()
            .await
            .map_err(|e| {
                let s = e.to_string();
                warn!(key, range_start = range.start, range_end = range.end, error = %s, "S3 GET failed");
                SourceError::Get(s)
            })?;
        let body = out
            .body
            .collect()
            .await
            .map_err(|e| SourceError::Get(e.to_string()))?;
        debug!(
            key,
            range_start = range.start,
            range_end = range.end,
            latency_ms = start.elapsed().as_millis(),
            "S3 GET ok"
        );
        Ok(body.into_bytes())
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_endpoint_gets_https_scheme() {
        assert_eq!(normalize_endpoint("zenko.local:8000"), "https://zenko.local:8000");
        assert_eq!(normalize_endpoint("http://127.0.0.1:9000"), "http://127.0.0.1:9000");
    }
}
