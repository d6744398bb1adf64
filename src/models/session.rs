//! Bookkeeping for one `store` run.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp layout embedded in every destination key of a session.
pub const SESSION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// One uploaded object as the verifier needs to find it again.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    /// Destination prefix the object's chunks were written under.
    pub prefix: String,

    /// Extension shared by every chunk of the object.
    pub extension: String,

    /// Number of chunks uploaded for the object.
    pub chunks: u64,
}

/// State carried across a whole transfer run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TransferSession {
    /// Rendered session timestamp.
    pub timestamp: String,

    /// One entry per source object that produced at least one chunk.
    pub records: Vec<SessionRecord>,

    /// Every destination key uploaded, collected only in debug mode.
    pub uploaded_keys: Vec<String>,
}

impl TransferSession {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            records: Vec::new(),
            uploaded_keys: Vec::new(),
        }
    }

    /// Start a session stamped with the given local time.
    pub fn started_at(now: DateTime<Local>) -> Self {
        Self::new(now.format(SESSION_TIMESTAMP_FORMAT).to_string())
    }

    pub fn record(&mut self, record: SessionRecord) {
        self.records.push(record);
    }
}
