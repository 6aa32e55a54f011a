//! Basket-level index for columnar tree files.
//!
//! This crate collects the physical layout of many source files once and
//! answers entry-range reads from that index afterwards:
//!
//! - A [`Collector`](collect::Collector) scans files through a pluggable
//!   [`TreeReader`](collect::TreeReader), deduplicates schemas ("eras") and
//!   path prefixes, and produces one [`IndexArray`](metadata::IndexArray)
//!   (`collect` and `metadata` modules).
//! - Index arrays are persisted by name in a
//!   [`MetadataStore`](store::MetadataStore) that can return partial slices
//!   (`store` module).
//! - An [`IndexedTree`](lookup::IndexedTree) maps global entry ranges back to
//!   files and byte ranges, fetching index slices lazily (`lookup` module),
//!   and serves them through the [`ColumnarSource`](source::ColumnarSource)
//!   contract used by [`extract::read_baskets`].
//! - Filesystem access lives in `storage`; a Parquet reader in
//!   `helpers::parquet`.
//!
//! Decompressing and decoding basket payloads is left to the caller.
#![deny(missing_docs)]
pub mod collect;
pub mod extract;
pub mod helpers;
pub mod lookup;
pub mod metadata;
pub mod source;
pub mod storage;
pub mod store;
