//! Represents a source bucket, the top-level container enumerated by the lister.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bucket in the S3-compatible source store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SourceBucket {
    /// Bucket name as reported by the source store.
    pub name: String,

    /// When the source store says the bucket was created, if it says.
    pub created_at: Option<DateTime<Utc>>,
}

impl SourceBucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: None,
        }
    }
}
