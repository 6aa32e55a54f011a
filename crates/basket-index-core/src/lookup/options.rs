//! Lookup settings.

use serde::{Deserialize, Serialize};

/// Settings for an [`IndexedTree`](crate::lookup::IndexedTree).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LookupOptions {
    /// Which dataset of the stored outer list to read. Arrays written by
    /// [`publish`](crate::store::publish) hold exactly one.
    pub dataset: usize,
}

impl LookupOptions {
    /// Read dataset `dataset`.
    pub fn with_dataset(mut self, dataset: usize) -> Self {
        self.dataset = dataset;
        self
    }
}
