//! Maps a source object key to the destination keys of its chunks.
//!
//! `reports/2020/q1.tar.gz` in bucket `docs`, chunk 2, session `T` becomes
//! `docs_T/reports/2020/q1/2.tar.gz`.

use crate::models::key::DestinationKey;

/// Split a base file name into `(stem, extension)`.
///
/// With more than two dot-separated parts the extension is the last two
/// parts (`tar.gz`); otherwise it is the last part alone. The stem is the
/// remaining leading parts joined by `.`. A name without any dot is its own
/// stem and its own extension.
pub fn split_extension(file_name: &str) -> (String, String) {
    let parts: Vec<&str> = file_name.split('.').collect();
    let ext_parts = if parts.len() > 2 { 2 } else { 1 };
    let stem_parts = if parts.len() > ext_parts {
        &parts[..parts.len() - ext_parts]
    } else {
        &parts[..]
    };
    let extension = parts[parts.len() - ext_parts..].join(".");
    (stem_parts.join("."), extension)
}

/// Split `key` into its parent directory (empty, or ending in `/`) and base name.
pub fn split_key(key: &str) -> (&str, &str) {
    match key.rfind('/') {
        Some(pos) => key.split_at(pos + 1),
        None => ("", key),
    }
}

/// Destination key of chunk `index` of `source_key`. Pure; no I/O.
pub fn encode(source_bucket: &str, source_key: &str, timestamp: &str, index: u64) -> DestinationKey {
    let (relative_dir, file_name) = split_key(source_key);
    let (stem, extension) = split_extension(file_name);
    DestinationKey {
        session_root: format!("{source_bucket}_{timestamp}"),
        relative_dir: relative_dir.to_string(),
        stem,
        index,
        extension,
    }
}
