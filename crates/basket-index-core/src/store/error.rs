//! Error types for the metadata store adapter.

use snafu::prelude::*;

use crate::metadata::IndexShapeError;
use crate::storage::StorageError;

/// Errors returned by [`MetadataStore`](crate::store::MetadataStore) and
/// [`ArrayHandle`](crate::store::ArrayHandle) implementations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// No array is stored under the requested name.
    #[snafu(display("No array named {name} in the store"))]
    ArrayNotFound {
        /// Requested array name.
        name: String,
    },

    /// Array names become file names and must stay inside the store root.
    #[snafu(display("Invalid array name {name:?}"))]
    InvalidName {
        /// Rejected name.
        name: String,
    },

    /// An index or range was applied to something that is not a list.
    #[snafu(display("Cannot index {found} at {at}"))]
    NotAList {
        /// Rendered path up to the failing step.
        at: String,
        /// JSON kind that was found.
        found: String,
    },

    /// A field selection was applied to something that is neither a record
    /// nor a list of records.
    #[snafu(display("Cannot select fields of {found} at {at}"))]
    NotARecord {
        /// Rendered path up to the failing step.
        at: String,
        /// JSON kind that was found.
        found: String,
    },

    /// An index fell outside the list.
    #[snafu(display("Index {index} out of bounds for list of {len} at {at}"))]
    IndexOutOfBounds {
        /// Rendered path up to the failing step.
        at: String,
        /// Requested index (possibly negative).
        index: i64,
        /// Length of the list.
        len: usize,
    },

    /// A record has no field with the requested name.
    #[snafu(display("No field {field} at {at}"))]
    MissingField {
        /// Rendered path up to the failing step.
        at: String,
        /// Requested field.
        field: String,
    },

    /// Backend storage failure.
    #[snafu(display("Storage error for array {name}: {source}"))]
    Storage {
        /// Array being read or written.
        name: String,
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// A stored array could not be parsed or encoded.
    #[snafu(display("Array {name} is not valid JSON: {source}"))]
    Json {
        /// Array being read or written.
        name: String,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// An index array could not be converted to its stored shape.
    #[snafu(display("Cannot store index array {name}: {source}"))]
    Shape {
        /// Array being written.
        name: String,
        /// Underlying shape error.
        source: IndexShapeError,
    },
}
