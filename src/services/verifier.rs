//! Diagnostic pass: download every chunk a session uploaded and append them,
//! in index order, into a local copy of each object.
//!
//! Failures here are logged and skipped; they never abort a run.

use crate::{
    destination::{DestinationBucket, ListOptions},
    errors::{ErrorContext, TransferError, TransferResult},
    models::{key::chunk_name, session::SessionRecord},
    services::uploader::normalize_upload_path,
};
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Objects with at least one chunk appended to their local copy.
    pub objects: usize,
    pub chunks: usize,
    pub bytes: u64,
    /// Local files written, one per verified object.
    pub files: Vec<PathBuf>,
    /// Non-fatal faults met along the way.
    pub failures: Vec<TransferError>,
}

impl VerifyReport {
    fn fail(&mut self, err: TransferError) {
        warn!(error = %err, "verification step skipped");
        self.failures.push(err);
    }
}

pub struct Verifier<'a, B: DestinationBucket + ?Sized> {
    bucket: &'a B,
    upload_path: String,
    output_root: PathBuf,
}

impl<'a, B: DestinationBucket + ?Sized> Verifier<'a, B> {
    pub fn new(bucket: &'a B, upload_path: &str, output_root: impl Into<PathBuf>) -> Self {
        Self {
            bucket,
            upload_path: normalize_upload_path(upload_path),
            output_root: output_root.into(),
        }
    }

    /// Local file a record is reconstituted into:
    /// `output_root/{upload_path}{prefix}.{extension}`.
    pub fn local_path(&self, record: &SessionRecord) -> PathBuf {
        self.output_root.join(format!(
            "{}{}.{}",
            self.upload_path, record.prefix, record.extension
        ))
    }

    pub async fn verify(&self, records: &[SessionRecord]) -> VerifyReport {
        let mut report = VerifyReport::default();
        for record in records {
            self.verify_record(record, &mut report).await;
        }
        info!(
            objects = report.objects,
            chunks = report.chunks,
            bytes = report.bytes,
            failures = report.failures.len(),
            "verification complete"
        );
        report
    }

    async fn verify_record(&self, record: &SessionRecord, report: &mut VerifyReport) {
        let prefix = format!("{}{}/", self.upload_path, record.prefix);
        info!("Downloading Object {} from bucket : Initiated...", prefix);

        let listed = match self
            .bucket
            .list_objects(&ListOptions {
                prefix: prefix.clone(),
                recursive: false,
            })
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                report.fail(TransferError::verify(
                    ErrorContext::with_key("list chunks", &prefix),
                    e,
                ));
                return;
            }
        };

        let mut indices: Vec<u64> = listed
            .iter()
            .filter(|o| !o.is_prefix)
            .filter_map(|o| chunk_index(&o.key[prefix.len().min(o.key.len())..], &record.extension))
            .collect();
        indices.sort_unstable();

        let local = self.local_path(record);
        if let Err(e) = prepare_local_file(&local).await {
            report.fail(TransferError::verify(
                ErrorContext::with_key("create local file", local.display().to_string()),
                e,
            ));
            return;
        }

        let mut appended = 0;
        for index in indices {
            let key = format!("{prefix}{}", chunk_name(index, &record.extension));
            match self.fetch(&key).await {
                Ok(content) => {
                    if let Err(e) = append(&local, &content).await {
                        report.fail(TransferError::verify(
                            ErrorContext::with_key("append local file", local.display().to_string()),
                            e,
                        ));
                        continue;
                    }
                    info!("{} bytes of Object from bucket!", content.len());
                    appended += 1;
                    report.chunks += 1;
                    report.bytes += content.len() as u64;
                }
                Err(e) => report.fail(e),
            }
        }
        if appended > 0 {
            report.objects += 1;
            report.files.push(local);
        }
    }

    async fn fetch(&self, key: &str) -> TransferResult<Vec<u8>> {
        let mut stream = self
            .bucket
            .download(key)
            .await
            .map_err(|e| TransferError::verify(ErrorContext::with_key("download chunk", key), e))?;
        let mut content = Vec::new();
        stream
            .read_to_end(&mut content)
            .await
            .map_err(|e| TransferError::verify(ErrorContext::with_key("read chunk", key), e))?;
        Ok(content)
    }
}

/// Parse `{index}.{extension}` back into the index.
fn chunk_index(name: &str, extension: &str) -> Option<u64> {
    name.strip_suffix(extension)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// Create parent directories and start the local copy empty.
async fn prepare_local_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, b"").await
}

async fn append(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path).await?;
    file.write_all(content).await?;
    file.flush().await
}
