//! The contract between an indexed dataset and the code that extracts
//! columnar data from it.
//!
//! An extraction driver needs only five capabilities: the branch names, the
//! entry count, a branch's decoding rule over an entry range, the baskets
//! that cover that range, and the raw bytes of a set of baskets.
//! [`ColumnarSource`] names them explicitly so any backend (the lookup engine
//! over a stored index, or a direct file reader) can serve the same driver.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::lookup::LookupError;
use crate::metadata::Interpretation;

/// One basket selected for an entry range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasketRange {
    /// Index of the file the basket lives in.
    pub file_index: usize,
    /// First byte of the basket in that file.
    pub start: u64,
    /// One past the last byte.
    pub stop: u64,
    /// First global entry covered by the basket.
    pub entry_start: u64,
    /// One past the last global entry covered.
    pub entry_stop: u64,
}

impl BasketRange {
    /// Byte length.
    pub fn len(&self) -> u64 {
        self.stop - self.start
    }

    /// `true` for zero-length baskets.
    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Entries of this basket that fall inside `[entry_start, entry_stop)`,
    /// relative to the basket's first entry.
    pub fn local_entries(&self, entry_start: u64, entry_stop: u64) -> std::ops::Range<u64> {
        let lo = entry_start.clamp(self.entry_start, self.entry_stop);
        let hi = entry_stop.clamp(lo, self.entry_stop);
        (lo - self.entry_start)..(hi - self.entry_start)
    }
}

/// Anything with branches, baskets and byte-range chunk sources.
#[async_trait]
pub trait ColumnarSource: Send {
    /// All known branch names, in first-seen order.
    async fn branch_names(&mut self) -> Result<Vec<String>, LookupError>;

    /// Total number of entries.
    async fn num_entries(&mut self) -> Result<u64, LookupError>;

    /// Decoding rule of `branch`, checked for consistency over the range.
    async fn interpretation(
        &mut self,
        branch: &str,
        entry_start: u64,
        entry_stop: u64,
    ) -> Result<Interpretation, LookupError>;

    /// Baskets of `branch` overlapping the range, in file then basket order.
    async fn basket_ranges_for(
        &mut self,
        branch: &str,
        entry_start: u64,
        entry_stop: u64,
    ) -> Result<Vec<BasketRange>, LookupError>;

    /// Raw bytes of each range, in request order.
    async fn fetch_chunks(&mut self, ranges: &[BasketRange]) -> Result<Vec<Bytes>, LookupError>;
}
