//! The seam between the collector and a file-format parser.
//!
//! The collector never parses files itself. A [`TreeReader`] opens one file,
//! locates the named tree and reports, per (recursively flattened) branch,
//! the decoding rule and the physical basket layout.

use std::io;
use std::path::Path;

use snafu::{Backtrace, prelude::*};

use crate::metadata::Interpretation;

/// Basket layout of one branch as reported by the parser.
///
/// The three basket arrays are positionally aligned, one element per basket.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchLayout {
    /// Fully qualified branch name.
    pub name: String,
    /// Decoding rule for this branch.
    pub interpretation: Interpretation,
    /// Byte offset of each basket.
    pub basket_seek: Vec<u64>,
    /// Cumulative local entry count at the end of each basket.
    pub basket_entry: Vec<u64>,
    /// Byte length of each basket.
    pub basket_bytes: Vec<u64>,
}

impl BranchLayout {
    /// Number of baskets.
    pub fn num_baskets(&self) -> usize {
        self.basket_seek.len()
    }
}

/// Everything the collector needs from one tree.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeLayout {
    /// Number of entries in the tree.
    pub num_entries: u64,
    /// Branches in the parser's natural order.
    pub branches: Vec<BranchLayout>,
}

/// Failures a reader may report.
///
/// The collector handles all of these the same way: the file contributes
/// zero entries.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TreeReadError {
    /// The file could not be opened.
    #[snafu(display("Cannot open {path}: {source}"))]
    Open {
        /// File that failed to open.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Diagnostic backtrace for this error.
        backtrace: Backtrace,
    },

    /// The file opened but its format-level metadata could not be decoded.
    #[snafu(display("Cannot decode tree metadata in {path}: {source}"))]
    Decode {
        /// File being read.
        path: String,
        /// Error reported by the format library.
        source: Box<dyn std::error::Error + Send + Sync>,
        /// Diagnostic backtrace for this error.
        backtrace: Backtrace,
    },

    /// The file has no tree with the requested name.
    #[snafu(display("No tree named {tree} in {path} (found {found})"))]
    TreeNotFound {
        /// File being read.
        path: String,
        /// Requested tree name.
        tree: String,
        /// Name of the tree that the file does contain.
        found: String,
    },
}

/// Opens files and reports their tree layouts.
///
/// Implementations must be callable from several threads at once.
pub trait TreeReader: Send + Sync {
    /// Read the layout of tree `tree` in the file at `path`.
    fn read_tree(&self, path: &Path, tree: &str) -> Result<TreeLayout, TreeReadError>;
}

impl<R: TreeReader + ?Sized> TreeReader for &R {
    fn read_tree(&self, path: &Path, tree: &str) -> Result<TreeLayout, TreeReadError> {
        (**self).read_tree(path, tree)
    }
}

impl<R: TreeReader + ?Sized> TreeReader for std::sync::Arc<R> {
    fn read_tree(&self, path: &Path, tree: &str) -> Result<TreeLayout, TreeReadError> {
        (**self).read_tree(path, tree)
    }
}
