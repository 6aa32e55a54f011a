//! Entry-range lookup over a stored index array.
//!
//! [`IndexedTree`] is the read side of the crate. It is built over an
//! [`ArrayHandle`](crate::store::ArrayHandle) and resolves global entry
//! ranges to the files and byte ranges that hold them. Basket payloads are
//! read through a [`SourceOpener`], one source per touched file.

pub mod cache;
pub mod chunks;
pub mod engine;
pub mod error;
pub mod options;
pub mod ranges;

pub use cache::{CachedEra, CachedFile, LookupCache};
pub use chunks::{ByteRangeSource, LocalFileOpener, SourceOpener};
pub use engine::{BranchFilter, IndexedTree};
pub use error::LookupError;
pub use options::LookupOptions;
pub use ranges::{file_index_range, overlapping_baskets};
