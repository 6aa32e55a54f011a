//! Byte-range sources for basket payloads.
//!
//! The engine opens one [`ByteRangeSource`] per file touched by a chunk
//! request and drops it when the request completes.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::{DataLocation, RangeReader, StorageResult};

/// An open file that serves byte ranges.
#[async_trait]
pub trait ByteRangeSource: Send {
    /// Read each `[start, stop)` range, returning chunks in request order.
    async fn read_ranges(&mut self, ranges: &[(u64, u64)]) -> StorageResult<Vec<Bytes>>;
}

/// Opens [`ByteRangeSource`]s by path.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    /// Open the file at `path` (a full path rebuilt from the index).
    async fn open(&self, path: &str) -> StorageResult<Box<dyn ByteRangeSource>>;
}

/// Opens files on the local filesystem.
///
/// Relative paths are resolved against the configured location; absolute
/// paths are used as-is.
#[derive(Clone, Debug, Default)]
pub struct LocalFileOpener {
    location: DataLocation,
}

impl LocalFileOpener {
    /// Opener resolving relative paths against `location`.
    pub fn new(location: DataLocation) -> Self {
        Self { location }
    }
}

struct LocalFileSource {
    reader: RangeReader,
}

#[async_trait]
impl ByteRangeSource for LocalFileSource {
    async fn read_ranges(&mut self, ranges: &[(u64, u64)]) -> StorageResult<Vec<Bytes>> {
        let mut out = Vec::with_capacity(ranges.len());
        for &(start, stop) in ranges {
            let buf = self.reader.read_range(start, stop).await?;
            out.push(Bytes::from(buf));
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceOpener for LocalFileOpener {
    async fn open(&self, path: &str) -> StorageResult<Box<dyn ByteRangeSource>> {
        let reader = RangeReader::open(&self.location, Path::new(path)).await?;
        Ok(Box::new(LocalFileSource { reader }))
    }
}
