//! The index array and its rows.
//!
//! JSON layout of one stored dataset (the whole structure is wrapped in a
//! single-element outer list before it reaches the store):
//!
//! ```json
//! [{
//!   "offsets": [0, 100, 250],
//!   "file": [
//!     {"filename": "a.parquet", "era": 0, "prefix": 0,
//!      "tree": {"x": [{"seek": 4, "stop": 100, "bytes": 812}]}}
//!   ],
//!   "era": [{"treename": "Events", "names": ["x"], "interpretations": [[123, 34]]}],
//!   "prefix": ["/data/run1/"]
//! }]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::prelude::*;

use crate::metadata::interpretation::Descriptor;

/// Location of one basket inside its source file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BasketSeek {
    /// Byte offset of the basket in the file.
    pub seek: u64,
    /// Cumulative local entry count at the end of this basket.
    pub stop: u64,
    /// Byte length of the basket.
    pub bytes: u64,
}

impl BasketSeek {
    /// One past the last byte of the basket.
    pub fn byte_stop(&self) -> u64 {
        self.seek.saturating_add(self.bytes)
    }
}

/// One collected source file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRow {
    /// Path suffix: the last `prefix_depth` components.
    pub filename: String,
    /// Index into [`IndexArray::era`].
    pub era: usize,
    /// Index into [`IndexArray::prefix`].
    pub prefix: usize,
    /// Basket layout per branch name.
    pub tree: BTreeMap<String, Vec<BasketSeek>>,
}

/// One distinct tree schema.
///
/// `names` and `interpretations` are positionally aligned and keep the
/// branch order of the first file that registered the era.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EraRecord {
    /// Name of the logical tree inside the file.
    pub treename: String,
    /// Branch names.
    pub names: Vec<String>,
    /// Encoded decoding descriptors, one per name.
    pub interpretations: Vec<Descriptor>,
}

/// The consolidated index over a set of files.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexArray {
    /// Prefix sums of per-file entry counts, with a leading 0.
    pub offsets: Vec<u64>,
    /// One row per collected file, in commit order.
    pub file: Vec<FileRow>,
    /// Distinct schemas, indexed by [`FileRow::era`].
    pub era: Vec<EraRecord>,
    /// Distinct path prefixes, indexed by [`FileRow::prefix`].
    pub prefix: Vec<String>,
}

impl Default for IndexArray {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            file: Vec::new(),
            era: Vec::new(),
            prefix: Vec::new(),
        }
    }
}

/// Errors raised when an index array (or its stored form) is malformed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IndexShapeError {
    /// The stored value is not the expected single-element outer list.
    #[snafu(display("Stored index array must be a non-empty list, found {found}"))]
    NotWrapped {
        /// JSON kind that was found instead.
        found: String,
    },

    /// JSON (de)serialization failed.
    #[snafu(display("Index array JSON error: {source}"))]
    Json {
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// `offsets` must start at 0.
    #[snafu(display("offsets must start with 0, found {first:?}"))]
    OffsetsStart {
        /// First element, if any.
        first: Option<u64>,
    },

    /// `offsets` must have exactly one more element than `file`.
    #[snafu(display("offsets has {offsets} elements but there are {files} file rows"))]
    OffsetsLength {
        /// Number of offsets.
        offsets: usize,
        /// Number of file rows.
        files: usize,
    },

    /// `offsets` decreases at `index`.
    #[snafu(display("offsets decrease at position {index}"))]
    OffsetsNotMonotonic {
        /// Position of the first decreasing element.
        index: usize,
    },

    /// A file row references an era that does not exist.
    #[snafu(display("file row {file} references era {era}, but only {num_eras} exist"))]
    DanglingEra {
        /// File row index.
        file: usize,
        /// Referenced era.
        era: usize,
        /// Number of eras present.
        num_eras: usize,
    },

    /// A file row references a prefix that does not exist.
    #[snafu(display("file row {file} references prefix {prefix}, but only {num_prefixes} exist"))]
    DanglingPrefix {
        /// File row index.
        file: usize,
        /// Referenced prefix.
        prefix: usize,
        /// Number of prefixes present.
        num_prefixes: usize,
    },

    /// An era's names and interpretations are not aligned.
    #[snafu(display(
        "era {era} has {names} names but {interpretations} interpretations"
    ))]
    MisalignedEra {
        /// Era index.
        era: usize,
        /// Number of names.
        names: usize,
        /// Number of interpretations.
        interpretations: usize,
    },
}

impl IndexArray {
    /// Total number of entries across all files.
    pub fn num_entries(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Number of collected files.
    pub fn num_files(&self) -> usize {
        self.file.len()
    }

    /// Full path of file `index`, rebuilt from its prefix and suffix.
    pub fn full_path(&self, index: usize) -> Option<String> {
        let row = self.file.get(index)?;
        let prefix = self.prefix.get(row.prefix)?;
        Some(format!("{prefix}{}", row.filename))
    }

    /// Check the structural invariants that the lookup engine relies on.
    pub fn validate(&self) -> Result<(), IndexShapeError> {
        ensure!(
            self.offsets.first() == Some(&0),
            OffsetsStartSnafu {
                first: self.offsets.first().copied(),
            }
        );
        ensure!(
            self.offsets.len() == self.file.len() + 1,
            OffsetsLengthSnafu {
                offsets: self.offsets.len(),
                files: self.file.len(),
            }
        );
        if let Some(index) = self.offsets.windows(2).position(|w| w[1] < w[0]) {
            return OffsetsNotMonotonicSnafu { index: index + 1 }.fail();
        }
        for (file, row) in self.file.iter().enumerate() {
            ensure!(
                row.era < self.era.len(),
                DanglingEraSnafu {
                    file,
                    era: row.era,
                    num_eras: self.era.len(),
                }
            );
            ensure!(
                row.prefix < self.prefix.len(),
                DanglingPrefixSnafu {
                    file,
                    prefix: row.prefix,
                    num_prefixes: self.prefix.len(),
                }
            );
        }
        for (era, record) in self.era.iter().enumerate() {
            ensure!(
                record.names.len() == record.interpretations.len(),
                MisalignedEraSnafu {
                    era,
                    names: record.names.len(),
                    interpretations: record.interpretations.len(),
                }
            );
        }
        Ok(())
    }

    /// Encode as the single-element outer list expected by the store.
    pub fn to_stored(&self) -> Result<Value, IndexShapeError> {
        let inner = serde_json::to_value(self).context(JsonSnafu)?;
        Ok(Value::Array(vec![inner]))
    }

    /// Decode dataset `dataset` from the stored outer list.
    pub fn from_stored(value: Value, dataset: usize) -> Result<Self, IndexShapeError> {
        let found = json_kind(&value);
        let Value::Array(mut items) = value else {
            return NotWrappedSnafu { found }.fail();
        };
        if dataset >= items.len() {
            return NotWrappedSnafu {
                found: format!("list of {} datasets", items.len()),
            }
            .fail();
        }
        serde_json::from_value(items.swap_remove(dataset)).context(JsonSnafu)
    }
}

/// Short description of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("list of {}", items.len()),
        Value::Object(_) => "record".to_string(),
    }
}
