//! src/destination/local.rs
//!
//! LocalNetwork: a destination network whose satellites, buckets and
//! objects live on the local filesystem under
//! `root/{satellite}/{bucket}/{key}`. Capabilities carried by the API key
//! and encryption access are enforced on every bucket operation.

use super::{
    ApiKey, DestinationBucket, DestinationNetwork, DestinationProject, DownloadStream,
    EncryptionAccess, EncryptionKey, ListOptions, ListedObject, NetworkError, NetworkResult,
    USER_AGENT, UploadedObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const TMP_PREFIX: &str = ".tmp-";

#[derive(Clone, Debug)]
pub struct LocalNetwork {
    root: PathBuf,
    user_agent: String,
}

impl LocalNetwork {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Directory name for a satellite address such as `us1.storj.io:7777`.
fn satellite_dir(satellite: &str) -> String {
    satellite
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl DestinationNetwork for LocalNetwork {
    type Project = LocalProject;

    async fn open_project(&self, satellite: &str, api_key: &ApiKey) -> NetworkResult<LocalProject> {
        if satellite.trim().is_empty() {
            return Err(NetworkError::Unreachable {
                satellite: satellite.to_string(),
                reason: "empty satellite address".into(),
            });
        }
        if api_key.head().is_empty() {
            return Err(NetworkError::InvalidApiKey("empty key head".into()));
        }
        let dir = self.root.join(satellite_dir(satellite));
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| NetworkError::Unreachable {
                satellite: satellite.to_string(),
                reason: e.to_string(),
            })?;
        debug!(satellite, user_agent = %self.user_agent, "opened project");
        Ok(LocalProject {
            dir,
            satellite: satellite.to_string(),
            api_key: api_key.clone(),
        })
    }
}

pub struct LocalProject {
    dir: PathBuf,
    satellite: String,
    api_key: ApiKey,
}

impl LocalProject {
    /// Stable per-project salt: every key derived from the same root key on
    /// the same satellite shares it.
    fn salt(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.satellite.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.api_key.head().as_bytes());
        hasher.finalize().into()
    }

    fn bucket_root(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl DestinationProject for LocalProject {
    type Bucket = LocalBucket;

    async fn salted_key_from_passphrase(&self, passphrase: &str) -> NetworkResult<EncryptionKey> {
        Ok(EncryptionKey::derive(passphrase, &self.salt())?)
    }

    async fn open_bucket(&self, name: &str, access: &EncryptionAccess) -> NetworkResult<LocalBucket> {
        ensure_bucket_name_safe(name)?;
        let root = self.bucket_root(name);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(LocalBucket {
                root,
                name: name.to_string(),
                api_key: self.api_key.clone(),
                access: access.clone(),
            }),
            Ok(_) => Err(NetworkError::BucketNotFound(name.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(NetworkError::BucketNotFound(name.to_string()))
            }
            Err(err) => Err(NetworkError::Io(err)),
        }
    }

    async fn create_bucket(&self, name: &str) -> NetworkResult<()> {
        ensure_bucket_name_safe(name)?;
        if !self.api_key.permissions().write {
            return Err(NetworkError::PermissionDenied(format!(
                "create bucket `{name}`"
            )));
        }
        let root = self.bucket_root(name);
        if fs::metadata(&root).await.is_ok() {
            return Err(NetworkError::BucketAlreadyExists(name.to_string()));
        }
        fs::create_dir_all(&root).await?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum Action {
    Read,
    Write,
    List,
}

pub struct LocalBucket {
    root: PathBuf,
    name: String,
    api_key: ApiKey,
    access: EncryptionAccess,
}

impl LocalBucket {
    fn authorize(&self, action: Action, key: &str) -> NetworkResult<()> {
        let perms = self.api_key.permissions();
        let allowed = match action {
            Action::Read => perms.read,
            Action::Write => perms.write,
            Action::List => perms.list,
        };
        if !allowed {
            return Err(NetworkError::PermissionDenied(format!(
                "{action:?} on `{key}` in bucket `{}`",
                self.name
            )));
        }
        if !self.api_key.allows_path(&self.name, key) || !self.access.allows_path(&self.name, key)
        {
            return Err(NetworkError::PermissionDenied(format!(
                "`{key}` is outside the paths granted for bucket `{}`",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DestinationBucket for LocalBucket {
    fn name(&self) -> &str {
        &self.name
    }

    /// Write to a temp file beside the target, fsync, then rename into place.
    async fn upload_object(&self, key: &str, data: Bytes) -> NetworkResult<UploadedObject> {
        ensure_key_safe(key)?;
        self.authorize(Action::Write, key)?;

        let file_path = self.root.join(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            NetworkError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!("{TMP_PREFIX}{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        if let Err(err) = write_all_synced(&mut file, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(NetworkError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(NetworkError::Io(err));
            }
        }

        Ok(UploadedObject {
            key: key.to_string(),
            size: data.len() as u64,
            etag: format!("{:x}", md5::compute(&data)),
        })
    }

    async fn list_objects(&self, opts: &ListOptions) -> NetworkResult<Vec<ListedObject>> {
        self.authorize(Action::List, &opts.prefix)?;
        if !opts.prefix.is_empty() {
            ensure_key_safe(&opts.prefix)?;
        }

        // Split `a/b/c` into the directory part `a/b/` and the name filter `c`.
        let (dir_key, name_filter) = match opts.prefix.rfind('/') {
            Some(pos) => opts.prefix.split_at(pos + 1),
            None => ("", opts.prefix.as_str()),
        };

        let mut out = Vec::new();
        let mut pending = vec![(dir_key.to_string(), true)];
        while let Some((dir_key, top)) = pending.pop() {
            let mut entries = match fs::read_dir(self.root.join(&dir_key)).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(NetworkError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(TMP_PREFIX) || (top && !name.starts_with(name_filter)) {
                    continue;
                }
                let meta = entry.metadata().await?;
                let key = format!("{dir_key}{name}");
                if meta.is_dir() {
                    if opts.recursive {
                        pending.push((format!("{key}/"), false));
                    } else {
                        out.push(ListedObject {
                            key: format!("{key}/"),
                            is_prefix: true,
                            size: 0,
                        });
                    }
                } else {
                    out.push(ListedObject {
                        key,
                        is_prefix: false,
                        size: meta.len(),
                    });
                }
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn download(&self, key: &str) -> NetworkResult<DownloadStream> {
        ensure_key_safe(key)?;
        self.authorize(Action::Read, key)?;
        let file = File::open(self.root.join(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                NetworkError::ObjectNotFound(key.to_string())
            } else {
                NetworkError::Io(err)
            }
        })?;
        Ok(Box::pin(file))
    }
}

async fn write_all_synced(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Basic key validation to avoid trivial path traversal vectors.
fn ensure_key_safe(key: &str) -> NetworkResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.split('/').any(|segment| segment == "..")
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if invalid {
        return Err(NetworkError::InvalidObjectKey(key.to_string()));
    }
    Ok(())
}

/// Validate bucket name format.
///
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
fn ensure_bucket_name_safe(name: &str) -> NetworkResult<()> {
    let reject = |reason: &str| {
        Err(NetworkError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return reject("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return reject("allowed characters are lowercase letters, digits, dots, and hyphens");
    }
    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return reject("must start and end with a lowercase letter or digit");
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return reject("cannot contain consecutive dots or dot-hyphen combinations");
    }
    if is_ipv4_like(name) {
        return reject("must not be formatted like an IP address");
    }
    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
