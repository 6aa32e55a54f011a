//! Error types for metadata collection.

use snafu::prelude::*;

/// Errors that abort collection.
///
/// Unreadable files and missing trees are **not** represented here: the
/// collector treats them as contributing zero entries.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CollectError {
    /// Collection options are out of range.
    #[snafu(display("Invalid collect options: {msg}"))]
    InvalidOptions {
        /// What is wrong with the options.
        msg: String,
    },

    /// A path has fewer components than the configured prefix depth.
    #[snafu(display(
        "Path {path} has {components} components, fewer than prefix_depth={prefix_depth}"
    ))]
    PathTooShallow {
        /// The offending path.
        path: String,
        /// Number of separator-delimited components found.
        components: usize,
        /// Configured prefix depth.
        prefix_depth: usize,
    },

    /// The reader's basket boundaries disagree with its entry count.
    ///
    /// This indicates a broken [`TreeReader`](crate::collect::TreeReader)
    /// rather than bad input.
    #[snafu(display(
        "Basket layout of branch {branch} in {path} ends at entry {last_stop}, but the tree has {num_entries} entries"
    ))]
    BasketLayoutMismatch {
        /// File being collected.
        path: String,
        /// Branch whose last basket is inconsistent.
        branch: String,
        /// Cumulative stop of the last basket.
        last_stop: u64,
        /// Entry count reported by the tree.
        num_entries: u64,
    },

    /// The seek, entry and byte arrays of a branch have different lengths.
    #[snafu(display(
        "Branch {branch} in {path} has {seeks} seeks, {stops} entry boundaries and {sizes} sizes"
    ))]
    RaggedBaskets {
        /// File being collected.
        path: String,
        /// Offending branch.
        branch: String,
        /// Number of seek offsets.
        seeks: usize,
        /// Number of entry boundaries.
        stops: usize,
        /// Number of byte sizes.
        sizes: usize,
    },

    /// A branch interpretation could not be encoded into a descriptor blob.
    #[snafu(display("Failed to encode interpretation of {branch} in {path}: {source}"))]
    EncodeDescriptor {
        /// File being collected.
        path: String,
        /// Branch whose interpretation failed to encode.
        branch: String,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// The worker pool for parallel collection could not be built.
    #[snafu(display("Failed to build collection thread pool: {source}"))]
    ThreadPool {
        /// Underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },
}
