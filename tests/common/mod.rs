#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zenko_storj::{
    config::{AccessOptions, DestinationConfig},
    models::session::TransferSession,
    services::commands::StoreRun,
    source::MemorySource,
};

pub const SATELLITE: &str = "us1.storj.io:7777";
pub const SATELLITE_DIR: &str = "us1.storj.io_7777";
pub const BUCKET: &str = "backup";
pub const UPLOAD_PATH: &str = "zenko";
pub const TIMESTAMP: &str = "2024-03-01_09_30_00";

pub fn destination() -> DestinationConfig {
    DestinationConfig {
        api_key: "13Yqe3oHi5dcnGhMu2ru3cmePC9iEYv6nDrYMbLRh4wre".into(),
        satellite: SATELLITE.into(),
        bucket: BUCKET.into(),
        upload_path: UPLOAD_PATH.into(),
        encryption_passphrase: "correct horse battery staple".into(),
        disallow_reads: "false".into(),
        disallow_writes: "false".into(),
        disallow_deletes: "false".into(),
        ..DestinationConfig::default()
    }
}

pub fn fresh(restrict: bool, debug: bool) -> AccessOptions {
    AccessOptions {
        derive_fresh: true,
        restrict,
        debug,
    }
}

pub fn store_run(access: AccessOptions, debug_dir: &Path) -> StoreRun {
    StoreRun {
        access,
        window: 32 * 1024,
        debug_dir: debug_dir.to_path_buf(),
    }
}

pub fn session() -> TransferSession {
    TransferSession::new(TIMESTAMP)
}

/// Deterministic, non-repeating-per-window payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A source with one 70000-byte object at `docs/reports/q1.pdf`.
pub fn docs_source() -> (MemorySource, Vec<u8>) {
    let source = MemorySource::new();
    let data = payload(70_000);
    source.put_object("docs", "reports/q1.pdf", data.clone());
    (source, data)
}

/// On-disk location of `key` inside the destination bucket.
pub fn stored(root: &TempDir, key: &str) -> PathBuf {
    root.path().join(SATELLITE_DIR).join(BUCKET).join(key)
}
