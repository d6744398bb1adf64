//! Destination network collaborator: projects opened against a satellite,
//! buckets inside a project, and object upload/list/download within a bucket.

use async_trait::async_trait;
use bytes::Bytes;
use std::{io, pin::Pin};
use thiserror::Error;
use tokio::io::AsyncRead;

pub mod access;
pub mod local;

pub use access::{
    AccessError, ApiKey, Caveat, EncryptionAccess, EncryptionKey, EncryptionRestriction,
    Permissions, Scope,
};
pub use local::LocalNetwork;

/// User agent the connector presents to the network.
pub const USER_AGENT: &str = "Zenko";

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid api key: {0}")]
    InvalidApiKey(String),
    #[error("satellite `{satellite}` unreachable: {reason}")]
    Unreachable { satellite: String, reason: String },
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Result of a single object upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedObject {
    pub key: String,
    pub size: u64,
    pub etag: String,
}

/// One entry of a bucket listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    /// True for the collapsed "directories" of a non-recursive listing.
    pub is_prefix: bool,
    pub size: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    pub prefix: String,
    pub recursive: bool,
}

pub type DownloadStream = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait DestinationNetwork: Send + Sync {
    type Project: DestinationProject;

    async fn open_project(&self, satellite: &str, api_key: &ApiKey)
    -> NetworkResult<Self::Project>;
}

#[async_trait]
pub trait DestinationProject: Send + Sync {
    type Bucket: DestinationBucket;

    /// Derive the project's encryption key from a passphrase and the
    /// project salt.
    async fn salted_key_from_passphrase(&self, passphrase: &str) -> NetworkResult<EncryptionKey>;

    async fn open_bucket(
        &self,
        name: &str,
        access: &EncryptionAccess,
    ) -> NetworkResult<Self::Bucket>;

    async fn create_bucket(&self, name: &str) -> NetworkResult<()>;
}

#[async_trait]
pub trait DestinationBucket: Send + Sync {
    fn name(&self) -> &str;

    async fn upload_object(&self, key: &str, data: Bytes) -> NetworkResult<UploadedObject>;

    async fn list_objects(&self, opts: &ListOptions) -> NetworkResult<Vec<ListedObject>>;

    /// Open a reader over the full content of `key`.
    async fn download(&self, key: &str) -> NetworkResult<DownloadStream>;
}
