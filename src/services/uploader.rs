//! Writes chunks to the destination bucket under the configured upload path.

use crate::{
    destination::{DestinationBucket, UploadedObject},
    errors::{ErrorContext, TransferError, TransferResult},
};
use bytes::Bytes;
use tracing::{debug, info};

/// Ensure a non-empty upload path ends with `/`. An empty path means the
/// bucket root.
pub fn normalize_upload_path(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

pub struct Uploader<'a, B: DestinationBucket + ?Sized> {
    bucket: &'a B,
    upload_path: String,
    debug: bool,
    uploaded: Vec<String>,
}

impl<'a, B: DestinationBucket + ?Sized> Uploader<'a, B> {
    pub fn new(bucket: &'a B, upload_path: &str, debug: bool) -> Self {
        Self {
            bucket,
            upload_path: normalize_upload_path(upload_path),
            debug,
            uploaded: Vec::new(),
        }
    }

    /// Upload one payload at `upload_path + key`. Any failure is fatal to the run.
    pub async fn upload(&mut self, key: &str, data: Bytes) -> TransferResult<UploadedObject> {
        let full_key = format!("{}{}", self.upload_path, key);
        info!("Upload Object Path: {}", full_key);
        let object = self
            .bucket
            .upload_object(&full_key, data)
            .await
            .map_err(|e| TransferError::upload(ErrorContext::with_key("upload object", &full_key), e))?;
        debug!(key = %object.key, size = object.size, etag = %object.etag, "uploaded");
        if self.debug {
            self.uploaded.push(key.to_string());
        }
        Ok(object)
    }

    /// Keys uploaded so far; only collected in debug mode.
    pub fn into_uploaded(self) -> Vec<String> {
        self.uploaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_path_gains_trailing_separator() {
        assert_eq!(normalize_upload_path("zenko"), "zenko/");
        assert_eq!(normalize_upload_path("zenko/"), "zenko/");
        assert_eq!(normalize_upload_path("a/b"), "a/b/");
        assert_eq!(normalize_upload_path(""), "");
    }
}
