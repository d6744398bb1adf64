//! Error taxonomy for the transfer pipeline.
//!
//! Every variant carries the operation that failed, the key it was working
//! on (when there is one) and the underlying cause, so the boundary can log
//! a complete line before deciding to abort.

use std::fmt;
use thiserror::Error;

/// Where an error happened: the operation name and, optionally, the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub operation: &'static str,
    pub key: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            key: None,
        }
    }

    pub fn with_key(operation: &'static str, key: impl Into<String>) -> Self {
        Self {
            operation,
            key: Some(key.into()),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} `{}`", self.operation, key),
            None => write!(f, "{}", self.operation),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("config error during {ctx}: {cause}")]
    Config { ctx: ErrorContext, cause: String },
    #[error("connection error during {ctx}: {cause}")]
    Connection { ctx: ErrorContext, cause: String },
    #[error("scope error during {ctx}: {cause}")]
    Scope { ctx: ErrorContext, cause: String },
    #[error("listing error during {ctx}: {cause}")]
    Listing { ctx: ErrorContext, cause: String },
    #[error("chunk read error during {ctx}: {cause}")]
    ChunkRead { ctx: ErrorContext, cause: String },
    #[error("upload error during {ctx}: {cause}")]
    Upload { ctx: ErrorContext, cause: String },
    #[error("verify error during {ctx}: {cause}")]
    Verify { ctx: ErrorContext, cause: String },
}

pub type TransferResult<T> = Result<T, TransferError>;

impl TransferError {
    pub fn config(ctx: ErrorContext, cause: impl fmt::Display) -> Self {
        Self::Config {
            ctx,
            cause: cause.to_string(),
        }
    }

    pub fn connection(ctx: ErrorContext, cause: impl fmt::Display) -> Self {
        Self::Connection {
            ctx,
            cause: cause.to_string(),
        }
    }

    pub fn scope(ctx: ErrorContext, cause: impl fmt::Display) -> Self {
        Self::Scope {
            ctx,
            cause: cause.to_string(),
        }
    }

    pub fn listing(ctx: ErrorContext, cause: impl fmt::Display) -> Self {
        Self::Listing {
            ctx,
            cause: cause.to_string(),
        }
    }

    pub fn chunk_read(ctx: ErrorContext, cause: impl fmt::Display) -> Self {
        Self::ChunkRead {
            ctx,
            cause: cause.to_string(),
        }
    }

    pub fn upload(ctx: ErrorContext, cause: impl fmt::Display) -> Self {
        Self::Upload {
            ctx,
            cause: cause.to_string(),
        }
    }

    pub fn verify(ctx: ErrorContext, cause: impl fmt::Display) -> Self {
        Self::Verify {
            ctx,
            cause: cause.to_string(),
        }
    }

    /// Verification faults are diagnostic; everything else aborts the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Verify { .. })
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { ctx, .. }
            | Self::Connection { ctx, .. }
            | Self::Scope { ctx, .. }
            | Self::Listing { ctx, .. }
            | Self::ChunkRead { ctx, .. }
            | Self::Upload { ctx, .. }
            | Self::Verify { ctx, .. } => ctx,
        }
    }
}
