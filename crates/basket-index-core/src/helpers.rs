//! Format-specific helpers.
//!
//! Current helpers:
//! - A Parquet [`TreeReader`](crate::collect::TreeReader) that derives basket
//!   layouts from footer metadata alone (no data pages are read).
pub mod parquet;
