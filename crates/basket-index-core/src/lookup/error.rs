//! Error types for the lookup engine.

use snafu::prelude::*;

use crate::storage::StorageError;
use crate::store::StoreError;

/// Errors raised while resolving entry ranges against a stored index.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LookupError {
    /// A slice of the stored index could not be fetched.
    #[snafu(display("Cannot fetch {what} from the index: {source}"))]
    Store {
        /// Part of the index being fetched.
        what: String,
        /// Underlying store error.
        source: StoreError,
    },

    /// A fetched slice does not have the shape of an index array.
    #[snafu(display("Index field {what} is malformed: {source}"))]
    CorruptIndex {
        /// Part of the index being decoded.
        what: String,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// A file index beyond the collected files was requested.
    #[snafu(display("File index {index} is out of range for {num_files} files"))]
    FileIndex {
        /// Requested file index.
        index: usize,
        /// Number of collected files.
        num_files: usize,
    },

    /// A stored decoding descriptor could not be decoded.
    #[snafu(display("Descriptor of branch {branch} in era {era} is invalid: {source}"))]
    Decode {
        /// Branch whose descriptor failed.
        branch: String,
        /// Era holding it.
        era: usize,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// Two files in one entry range decode a branch differently.
    #[snafu(display(
        "Branch {branch} is decoded as {found} in {file} but as {expected} in earlier files; \
         use entry_stop <= {entry_stop} to stay before the change"
    ))]
    InterpretationConflict {
        /// Branch being resolved.
        branch: String,
        /// First file whose descriptor disagrees.
        file: String,
        /// First global entry of that file.
        entry_stop: u64,
        /// Type name in the files before it.
        expected: String,
        /// Type name in the disagreeing file.
        found: String,
    },

    /// A file in the entry range has no branch with that name.
    ///
    /// The file's own entries are `[file_start, file_stop)`; a range ending
    /// at or before `file_start` or starting at or after `file_stop` avoids
    /// it.
    #[snafu(display(
        "Branch {branch} does not exist in {file} (entries {file_start}..{file_stop}); \
         use entry_stop <= {file_start} or entry_start >= {file_stop} to avoid it"
    ))]
    BranchMissing {
        /// Branch being resolved.
        branch: String,
        /// File lacking it.
        file: String,
        /// First global entry of that file.
        file_start: u64,
        /// One past the last global entry of that file.
        file_stop: u64,
    },

    /// No era defines the branch.
    #[snafu(display("Unknown branch {branch}"))]
    UnknownBranch {
        /// Requested branch.
        branch: String,
    },

    /// The index has no eras, so there is no tree to describe.
    #[snafu(display("Index array is empty"))]
    EmptyIndex,

    /// Branch selection other than "all branches" was requested.
    #[snafu(display("Branch filter {filter} is not supported; only all branches can be listed"))]
    UnsupportedFilter {
        /// Rendered filter.
        filter: String,
    },

    /// A source file could not be opened or read.
    #[snafu(display("Cannot read baskets from {path}: {source}"))]
    Chunk {
        /// Source file path.
        path: String,
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// A byte-range source answered with the wrong number of chunks.
    #[snafu(display("{path} returned {returned} chunks for {requested} ranges"))]
    ChunkCount {
        /// Source file path.
        path: String,
        /// Ranges requested.
        requested: usize,
        /// Chunks returned.
        returned: usize,
    },
}
