//! Metadata collection.
//!
//! A [`Collector`] scans source files once through a [`TreeReader`], keeps
//! deduplicated era and prefix registries, and accumulates one
//! [`FileRow`](crate::metadata::FileRow) per non-empty file together with
//! the running entry offsets. Parsing runs outside any lock; only the
//! commit of a finished file is serialized.

pub mod collector;
pub mod error;
pub mod options;
pub mod paths;
pub mod registry;
pub mod tree_reader;

pub use collector::Collector;
pub use error::CollectError;
pub use options::CollectOptions;
pub use paths::{SplitPath, split_path};
pub use registry::DenseRegistry;
pub use tree_reader::{BranchLayout, TreeLayout, TreeReadError, TreeReader};
