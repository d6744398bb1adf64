//! Represents an object (file) read from a source bucket, and the chunks it is cut into.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single object within a source bucket.
///
/// Only the descriptor is kept here; the payload is fetched chunk by chunk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SourceObject {
    /// Name of the bucket the object lives in.
    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size: u64,
}

impl SourceObject {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
        }
    }
}

/// A bounded, contiguous window of a source object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk within its object, starting at 0.
    pub index: u64,

    /// Byte offset of the first byte of `data` within the object.
    pub offset: u64,

    /// Payload; at most one window long.
    pub data: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Exclusive end offset of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}
