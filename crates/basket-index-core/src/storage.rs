//! Local filesystem backend.
//!
//! Every byte this crate moves to or from disk goes through here:
//!
//! - Persisted index arrays written by [`crate::store::LocalStore`]
//!   (write-then-rename so readers never observe a torn file).
//! - Whole-file reads when a stored array is opened.
//! - Byte-range reads issued while routing basket chunks to the source
//!   files they live in.
//!
//! Paths handed to these helpers are resolved against a [`DataLocation`].
//! Absolute paths replace the root entirely, which is how the lookup engine
//! addresses source files whose full paths were reconstructed from a prefix
//! and a suffix.

use snafu::{Backtrace, prelude::*};
use std::{
    error::Error,
    fmt,
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root that relative paths are resolved against.
#[derive(Clone, Debug)]
pub enum DataLocation {
    /// A directory on the local filesystem.
    Local(PathBuf),
}

impl DataLocation {
    /// Creates a new `DataLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        DataLocation::Local(root.into())
    }
}

impl Default for DataLocation {
    /// The process working directory; absolute paths are unaffected by it.
    fn default() -> Self {
        DataLocation::Local(PathBuf::from("."))
    }
}

/// Errors produced by the storage backend implementation.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// An I/O error occurred on the local filesystem.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A byte range was requested with `start > stop`.
    #[snafu(display("Invalid byte range [{start}, {stop}) for {path}"))]
    InvalidRange {
        /// The file the range was requested from.
        path: String,
        /// First byte requested.
        start: u64,
        /// One past the last byte requested.
        stop: u64,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

fn join_local(location: &DataLocation, rel: &Path) -> PathBuf {
    match location {
        DataLocation::Local(root) => root.join(rel),
    }
}

fn classify(e: io::Error, path: String) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound {
            path,
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        }
    } else {
        StorageError::OtherIo {
            path,
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        }
    }
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Write `contents` to `rel_path` inside `location` using an atomic write.
///
/// The payload goes to a temporary sibling first, is synced, and is then
/// renamed over the target. Parent directories are created as needed.
pub async fn write_atomic(
    location: &DataLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    create_parent_dir(&abs).await?;

    let tmp_path = abs.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.write_all(contents)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.sync_all()
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;
    }

    fs::rename(&tmp_path, &abs)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })?;

    guard.disarm();
    Ok(())
}

/// Read the full contents of the file at `rel_path` within `location`.
///
/// Errors:
/// - If the file does not exist this returns `StorageError::NotFound`.
/// - On any other I/O error this returns `StorageError::OtherIo`.
pub async fn read_all_bytes(location: &DataLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let abs = join_local(location, rel_path);
    fs::read(&abs)
        .await
        .map_err(|e| classify(e, abs.display().to_string()))
}

/// An open local file that serves byte-range reads.
///
/// Keeping the handle open across several ranges avoids reopening the file
/// once per basket.
#[derive(Debug)]
pub struct RangeReader {
    path: String,
    file: fs::File,
}

impl RangeReader {
    /// Open `rel_path` within `location` for range reads.
    pub async fn open(location: &DataLocation, rel_path: &Path) -> StorageResult<Self> {
        let abs = join_local(location, rel_path);
        let path = abs.display().to_string();
        let file = fs::File::open(&abs)
            .await
            .map_err(|e| classify(e, path.clone()))?;
        Ok(Self { path, file })
    }

    /// Read exactly the bytes in `[start, stop)`.
    ///
    /// A range that runs past the end of the file is an `OtherIo` error
    /// (unexpected EOF), never a short read.
    pub async fn read_range(&mut self, start: u64, stop: u64) -> StorageResult<Vec<u8>> {
        ensure!(
            start <= stop,
            InvalidRangeSnafu {
                path: self.path.clone(),
                start,
                stop,
            }
        );

        self.file
            .seek(SeekFrom::Start(start))
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: self.path.clone(),
            })?;

        let len = usize::try_from(stop - start)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: self.path.clone(),
            })?;

        let mut buf = vec![0u8; len];
        self.file
            .read_exact(&mut buf)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: self.path.clone(),
            })?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    async fn read_range(
        location: &DataLocation,
        rel_path: &Path,
        start: u64,
        stop: u64,
    ) -> StorageResult<Vec<u8>> {
        let mut reader = RangeReader::open(location, rel_path).await?;
        reader.read_range(start, stop).await
    }

    #[tokio::test]
    async fn write_atomic_creates_parent_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let location = DataLocation::local(tmp.path());

        let rel_path = Path::new("nested/deep/index.json");
        write_atomic(&location, rel_path, b"[]").await?;

        let abs = tmp.path().join(rel_path);
        assert_eq!(tokio::fs::read(&abs).await?, b"[]");
        assert!(!tmp.path().join("nested/deep/index.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn write_atomic_overwrites_existing_file() -> TestResult {
        let tmp = TempDir::new()?;
        let location = DataLocation::local(tmp.path());
        let rel_path = Path::new("overwrite.json");

        write_atomic(&location, rel_path, b"original").await?;
        write_atomic(&location, rel_path, b"updated").await?;

        let read_back = read_all_bytes(&location, rel_path).await?;
        assert_eq!(read_back, b"updated");
        Ok(())
    }

    #[tokio::test]
    async fn read_all_bytes_reports_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let location = DataLocation::local(tmp.path());

        let err = read_all_bytes(&location, Path::new("missing.json"))
            .await
            .expect_err("expected NotFound");
        assert!(matches!(err, StorageError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn read_range_returns_requested_slice() -> TestResult {
        let tmp = TempDir::new()?;
        let location = DataLocation::local(tmp.path());
        tokio::fs::write(tmp.path().join("data.bin"), b"0123456789").await?;

        let bytes = read_range(&location, Path::new("data.bin"), 3, 7).await?;
        assert_eq!(bytes, b"3456");

        let empty = read_range(&location, Path::new("data.bin"), 5, 5).await?;
        assert!(empty.is_empty());

        // One open handle serves several ranges, in any order.
        let mut reader = RangeReader::open(&location, Path::new("data.bin")).await?;
        assert_eq!(reader.read_range(8, 10).await?, b"89");
        assert_eq!(reader.read_range(0, 2).await?, b"01");
        Ok(())
    }

    #[tokio::test]
    async fn read_range_resolves_absolute_paths_outside_root() -> TestResult {
        let data_dir = TempDir::new()?;
        let other_root = TempDir::new()?;
        let abs = data_dir.path().join("abs.bin");
        tokio::fs::write(&abs, b"abcdef").await?;

        let location = DataLocation::local(other_root.path());
        let bytes = read_range(&location, &abs, 1, 3).await?;
        assert_eq!(bytes, b"bc");
        Ok(())
    }

    #[tokio::test]
    async fn read_range_past_eof_is_an_error() -> TestResult {
        let tmp = TempDir::new()?;
        let location = DataLocation::local(tmp.path());
        tokio::fs::write(tmp.path().join("short.bin"), b"abc").await?;

        let err = read_range(&location, Path::new("short.bin"), 1, 10)
            .await
            .expect_err("expected EOF error");
        assert!(matches!(err, StorageError::OtherIo { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn reversed_range_is_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let location = DataLocation::local(tmp.path());
        tokio::fs::write(tmp.path().join("r.bin"), b"abc").await?;

        let err = read_range(&location, Path::new("r.bin"), 2, 1)
            .await
            .expect_err("expected InvalidRange");
        assert!(matches!(err, StorageError::InvalidRange { .. }));
        Ok(())
    }
}
