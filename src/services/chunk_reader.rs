//! Cuts one source object into fixed-size windows.
//!
//! Every window is fetched with its own bounded range read, so no stream is
//! held open between chunks.

use crate::{
    errors::{ErrorContext, TransferError, TransferResult},
    models::object::{Chunk, SourceObject},
    source::SourceStore,
};
use tracing::debug;

/// Window size used when none is configured (32 KiB).
pub const DEFAULT_WINDOW_SIZE: u64 = 32 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    Start,
    Reading { offset: u64 },
    Done,
}

pub struct ChunkReader<'a, S: SourceStore + ?Sized> {
    source: &'a S,
    object: &'a SourceObject,
    window: u64,
    state: ReadState,
    next_index: u64,
}

impl<'a, S: SourceStore + ?Sized> ChunkReader<'a, S> {
    /// A `window` of 0 falls back to [`DEFAULT_WINDOW_SIZE`].
    pub fn new(source: &'a S, object: &'a SourceObject, window: u64) -> Self {
        Self {
            source,
            object,
            window: if window == 0 { DEFAULT_WINDOW_SIZE } else { window },
            state: ReadState::Start,
            next_index: 0,
        }
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Read the next window. Returns `None` once the object is exhausted.
    pub async fn next_chunk(&mut self) -> TransferResult<Option<Chunk>> {
        let offset = match self.state {
            ReadState::Done => return Ok(None),
            ReadState::Start if self.object.size == 0 => {
                self.state = ReadState::Done;
                return Ok(None);
            }
            ReadState::Start => 0,
            ReadState::Reading { offset } => offset,
        };

        let end = offset.saturating_add(self.window).min(self.object.size);
        let object = self.object;
        let ctx = || ErrorContext::with_key("read chunk", object.key.clone());
        let mut data = self
            .source
            .get_range(&self.object.bucket, &self.object.key, offset..end)
            .await
            .map_err(|e| TransferError::chunk_read(ctx(), e))?;

        if data.is_empty() {
            self.state = ReadState::Done;
            return Err(TransferError::chunk_read(
                ctx(),
                format!(
                    "no bytes returned at offset {offset} of {}",
                    self.object.size
                ),
            ));
        }
        if data.len() as u64 > end - offset {
            data.truncate((end - offset) as usize);
        }

        let chunk = Chunk {
            index: self.next_index,
            offset,
            data,
        };
        self.next_index += 1;
        let next = chunk.end();
        self.state = if next >= self.object.size {
            ReadState::Done
        } else {
            ReadState::Reading { offset: next }
        };
        debug!(
            key = %self.object.key,
            index = chunk.index,
            offset = chunk.offset,
            len = chunk.len(),
            "read chunk"
        );
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn read_all(source: &MemorySource, object: &SourceObject, window: u64) -> Vec<Chunk> {
        let mut reader = ChunkReader::new(source, object, window);
        let mut out = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            out.push(chunk);
        }
        assert_eq!(reader.state(), ReadState::Done);
        out
    }

    #[tokio::test]
    async fn chunk_count_and_sizes_follow_window() {
        let source = MemorySource::new();
        for size in [1usize, 9, 10, 11, 25] {
            let key = format!("obj-{size}");
            source.put_object("b", &key, payload(size));
            let object = SourceObject::new("b", &key, size as u64);
            let chunks = read_all(&source, &object, 10).await;

            let expected = size.div_ceil(10);
            assert_eq!(chunks.len(), expected, "size {size}");
            assert_eq!(chunks.last().unwrap().len(), size - (expected - 1) * 10);

            let mut covered = 0u64;
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, i as u64);
                assert_eq!(chunk.offset, covered);
                covered = chunk.end();
            }
            assert_eq!(covered, size as u64);

            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.to_vec()).collect();
            assert_eq!(joined, payload(size));
        }
    }

    #[tokio::test]
    async fn each_chunk_is_a_separate_range_read() {
        let source = MemorySource::new();
        source.put_object("b", "k", payload(70_000));
        let object = SourceObject::new("b", "k", 70_000);
        let chunks = read_all(&source, &object, DEFAULT_WINDOW_SIZE).await;
        let sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![32_768, 32_768, 4_464]);
        assert_eq!(source.range_reads(), 3);
    }

    #[tokio::test]
    async fn empty_object_yields_no_chunks_and_no_reads() {
        let source = MemorySource::new();
        source.put_object("b", "empty", Vec::new());
        let object = SourceObject::new("b", "empty", 0);
        assert!(read_all(&source, &object, 10).await.is_empty());
        assert_eq!(source.range_reads(), 0);
    }

    #[tokio::test]
    async fn stalled_read_is_fatal() {
        let source = MemorySource::new();
        source.put_object("b", "stuck", payload(20));
        source.stall_object("stuck");
        let object = SourceObject::new("b", "stuck", 20);
        let mut reader = ChunkReader::new(&source, &object, 10);
        let err = reader.next_chunk().await.unwrap_err();
        assert!(matches!(err, TransferError::ChunkRead { .. }));
        assert!(err.is_fatal());
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn object_shorter_than_listed_size_is_fatal() {
        let source = MemorySource::new();
        source.put_object("b", "shrunk", payload(5));
        let object = SourceObject::new("b", "shrunk", 20);
        let mut reader = ChunkReader::new(&source, &object, 10);
        assert_eq!(reader.next_chunk().await.unwrap().unwrap().len(), 5);
        assert!(reader.next_chunk().await.is_err());
    }

    #[tokio::test]
    async fn huge_window_after_short_read_does_not_overflow() {
        let source = MemorySource::new();
        source.put_object("b", "shrunk", payload(5));
        let object = SourceObject::new("b", "shrunk", 20);
        let mut reader = ChunkReader::new(&source, &object, u64::MAX);
        let first = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!((first.offset, first.len()), (0, 5));
        assert_eq!(reader.state(), ReadState::Reading { offset: 5 });
        assert!(matches!(
            reader.next_chunk().await,
            Err(TransferError::ChunkRead { .. })
        ));
    }

    #[tokio::test]
    async fn missing_object_is_a_read_error() {
        let source = MemorySource::new();
        source.create_bucket("b");
        let object = SourceObject::new("b", "gone", 10);
        let mut reader = ChunkReader::new(&source, &object, 0);
        assert_eq!(reader.window(), DEFAULT_WINDOW_SIZE);
        assert!(matches!(
            reader.next_chunk().await,
            Err(TransferError::ChunkRead { .. })
        ));
    }
}
