//! Per-engine caches of fetched index data.
//!
//! Everything here is append-only: once a file, era, prefix or basket list
//! has been fetched it is kept for the lifetime of the engine.

use std::collections::HashMap;
use std::sync::Arc;

use crate::metadata::{BasketSeek, Interpretation};

/// A file row with its prefix applied and its era resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedFile {
    /// Full path, `prefix + filename`.
    pub path: String,
    /// Era index.
    pub era: usize,
    /// The era itself, shared with [`LookupCache`].
    pub schema: Arc<CachedEra>,
}

/// One era with its descriptors decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedEra {
    /// Tree name.
    pub treename: String,
    /// Branch names and decoding rules, in stored order.
    pub branches: Vec<(String, Interpretation)>,
    by_name: HashMap<String, usize>,
}

impl CachedEra {
    pub(crate) fn new(treename: String, branches: Vec<(String, Interpretation)>) -> Self {
        let by_name = branches
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Self {
            treename,
            branches,
            by_name,
        }
    }

    /// Decoding rule of `branch` in this era.
    pub fn interpretation(&self, branch: &str) -> Option<&Interpretation> {
        self.by_name.get(branch).map(|&i| &self.branches[i].1)
    }

    /// Whether this era defines `branch`.
    pub fn contains(&self, branch: &str) -> bool {
        self.by_name.contains_key(branch)
    }
}

/// Caches owned by one [`IndexedTree`](crate::lookup::IndexedTree).
#[derive(Debug, Default)]
pub struct LookupCache {
    pub(crate) offsets: Option<Arc<[u64]>>,
    pub(crate) files: HashMap<usize, CachedFile>,
    pub(crate) eras: HashMap<usize, Arc<CachedEra>>,
    pub(crate) prefixes: HashMap<usize, String>,
    pub(crate) seeks: HashMap<(usize, String), Arc<[BasketSeek]>>,
    pub(crate) keys: Option<Arc<[String]>>,
    pub(crate) items: Option<Arc<[(String, Interpretation)]>>,
    pub(crate) treename: Option<String>,
}

impl LookupCache {
    /// Entry offsets, if fetched.
    pub fn offsets(&self) -> Option<&[u64]> {
        self.offsets.as_deref()
    }

    /// Cached file row `index`.
    pub fn file(&self, index: usize) -> Option<&CachedFile> {
        self.files.get(&index)
    }

    /// Cached era `index`.
    pub fn era(&self, index: usize) -> Option<&CachedEra> {
        self.eras.get(&index).map(Arc::as_ref)
    }

    /// Cached prefix string `index`.
    pub fn prefix(&self, index: usize) -> Option<&str> {
        self.prefixes.get(&index).map(String::as_str)
    }

    /// Cached baskets of `branch` in file `index`.
    pub fn seekdata(&self, index: usize, branch: &str) -> Option<&[BasketSeek]> {
        self.seeks.get(&(index, branch.to_string())).map(AsRef::as_ref)
    }

    /// Number of cached (file, branch) basket lists.
    pub fn num_cached_seekdata(&self) -> usize {
        self.seeks.len()
    }
}
