//! Destination addressing for uploaded chunks.

use std::fmt;

/// The computed destination address of one chunk.
///
/// Renders as `{session_root}/{relative_dir}{stem}/{index}.{extension}`, where
/// `session_root` is `{source_bucket}_{timestamp}` and `relative_dir` is either
/// empty or ends with `/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    pub session_root: String,
    pub relative_dir: String,
    pub stem: String,
    pub index: u64,
    pub extension: String,
}

impl DestinationKey {
    /// Everything before the trailing `/{index}.{extension}`.
    pub fn prefix(&self) -> String {
        format!("{}/{}{}", self.session_root, self.relative_dir, self.stem)
    }

    /// File name of the chunk under its prefix.
    pub fn chunk_name(&self) -> String {
        chunk_name(self.index, &self.extension)
    }
}

/// `{index}.{extension}`, shared by the encoder and the verifier.
pub fn chunk_name(index: u64, extension: &str) -> String {
    format!("{index}.{extension}")
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix(), self.chunk_name())
    }
}
