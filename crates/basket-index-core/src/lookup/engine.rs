//! The lookup engine.
//!
//! [`IndexedTree`] answers tree-like questions (branch names, entry count,
//! which baskets cover an entry range) from a stored index array, fetching
//! only the slices each question needs. Fetched slices go into a
//! [`LookupCache`] and are never fetched again.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use snafu::prelude::*;

use crate::lookup::cache::{CachedEra, CachedFile, LookupCache};
use crate::lookup::chunks::{LocalFileOpener, SourceOpener};
use crate::lookup::error::{
    BranchMissingSnafu, ChunkCountSnafu, ChunkSnafu, CorruptIndexSnafu, DecodeSnafu,
    EmptyIndexSnafu, FileIndexSnafu, InterpretationConflictSnafu, LookupError, StoreSnafu,
    UnknownBranchSnafu, UnsupportedFilterSnafu,
};
use crate::lookup::options::LookupOptions;
use crate::lookup::ranges;
use crate::metadata::{BasketSeek, Descriptor, EraRecord, Interpretation};
use crate::source::{BasketRange, ColumnarSource};
use crate::store::{ArrayHandle, MetadataStore, PathItem, StoreError};

/// Branch selection for [`IndexedTree::keys_matching`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchFilter {
    /// Every known branch.
    All,
    /// Branches whose name matches a pattern.
    Name(String),
    /// Branches whose type name matches a pattern.
    TypeName(String),
    /// Branches accepted by a named predicate.
    Branch(String),
}

impl fmt::Display for BranchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchFilter::All => f.write_str("all"),
            BranchFilter::Name(p) => write!(f, "name={p:?}"),
            BranchFilter::TypeName(p) => write!(f, "typename={p:?}"),
            BranchFilter::Branch(p) => write!(f, "branch={p:?}"),
        }
    }
}

#[derive(Deserialize)]
struct FileTriple {
    filename: String,
    era: usize,
    prefix: usize,
}

/// Read-only tree facade over one stored index array.
///
/// Methods take `&mut self` because every query may grow the cache. An
/// engine is meant for a single caller; use one engine per task.
pub struct IndexedTree<H, O = LocalFileOpener> {
    handle: H,
    opener: O,
    options: LookupOptions,
    cache: LookupCache,
}

impl<H: ArrayHandle> IndexedTree<H, LocalFileOpener> {
    /// Engine over `handle` reading source files from the local filesystem.
    pub fn new(handle: H) -> Self {
        Self::with_opener(handle, LocalFileOpener::default())
    }

    /// Open the array stored under `name`.
    pub async fn open<S>(store: &S, name: &str) -> Result<Self, LookupError>
    where
        S: MetadataStore<Handle = H> + ?Sized,
    {
        let handle = store.read(name).await.context(StoreSnafu {
            what: format!("array {name}"),
        })?;
        Ok(Self::new(handle))
    }
}

impl<H: ArrayHandle, O: SourceOpener> IndexedTree<H, O> {
    /// Engine over `handle` reading source files through `opener`.
    pub fn with_opener(handle: H, opener: O) -> Self {
        Self {
            handle,
            opener,
            options: LookupOptions::default(),
            cache: LookupCache::default(),
        }
    }

    /// Replace the options. Only meaningful before the first query.
    pub fn with_options(mut self, options: LookupOptions) -> Self {
        self.options = options;
        self
    }

    /// Current options.
    pub fn options(&self) -> &LookupOptions {
        &self.options
    }

    /// What has been fetched so far.
    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    fn path(&self, rest: Vec<PathItem>) -> Vec<PathItem> {
        let mut path = Vec::with_capacity(rest.len() + 1);
        path.push(PathItem::from(self.options.dataset));
        path.extend(rest);
        path
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        what: &str,
        path: Vec<PathItem>,
    ) -> Result<T, LookupError> {
        debug!("Fetching {what} from the index");
        let value = self.handle.slice(&path).await.context(StoreSnafu { what })?;
        serde_json::from_value(value).context(CorruptIndexSnafu { what })
    }

    async fn offsets(&mut self) -> Result<Arc<[u64]>, LookupError> {
        if let Some(offsets) = &self.cache.offsets {
            return Ok(Arc::clone(offsets));
        }
        let offsets: Vec<u64> = self
            .fetch("offsets", self.path(vec!["offsets".into()]))
            .await?;
        let offsets: Arc<[u64]> = offsets.into();
        self.cache.offsets = Some(Arc::clone(&offsets));
        Ok(offsets)
    }

    /// Total number of entries: the last offset.
    pub async fn num_entries(&mut self) -> Result<u64, LookupError> {
        Ok(self.offsets().await?.last().copied().unwrap_or(0))
    }

    /// Number of indexed files.
    pub async fn num_files(&mut self) -> Result<usize, LookupError> {
        Ok(self.offsets().await?.len().saturating_sub(1))
    }

    /// Files intersecting `[entry_start, entry_stop)`; see
    /// [`ranges::file_index_range`].
    pub async fn file_index_range(
        &mut self,
        entry_start: u64,
        entry_stop: u64,
    ) -> Result<(usize, usize), LookupError> {
        let offsets = self.offsets().await?;
        Ok(ranges::file_index_range(&offsets, entry_start, entry_stop))
    }

    /// Make sure file rows `[index_start, index_stop)` are cached, together
    /// with their prefixes and eras.
    ///
    /// Only rows not yet cached are fetched, as one contiguous slice.
    pub async fn fetch_filedata(
        &mut self,
        index_start: usize,
        index_stop: usize,
    ) -> Result<(), LookupError> {
        let num_files = self.num_files().await?;
        ensure!(
            index_stop <= num_files,
            FileIndexSnafu {
                index: index_stop.saturating_sub(1),
                num_files,
            }
        );

        let missing: Vec<usize> = (index_start..index_stop)
            .filter(|i| !self.cache.files.contains_key(i))
            .collect();
        let (Some(&first), Some(&last)) = (missing.first(), missing.last()) else {
            return Ok(());
        };

        let rows: Vec<FileTriple> = self
            .fetch(
                &format!("file rows {first}..{}", last + 1),
                self.path(vec![
                    "file".into(),
                    PathItem::range(first, last + 1),
                    PathItem::fields(["filename", "era", "prefix"]),
                ]),
            )
            .await?;

        for (index, row) in (first..).zip(rows) {
            if self.cache.files.contains_key(&index) {
                continue;
            }
            let prefix = self.prefix(row.prefix).await?;
            let schema = self.era(row.era).await?;
            self.cache.files.insert(
                index,
                CachedFile {
                    path: format!("{prefix}{}", row.filename),
                    era: row.era,
                    schema,
                },
            );
        }
        Ok(())
    }

    async fn prefix(&mut self, index: usize) -> Result<String, LookupError> {
        if let Some(prefix) = self.cache.prefixes.get(&index) {
            return Ok(prefix.clone());
        }
        let prefix: String = self
            .fetch(
                &format!("prefix {index}"),
                self.path(vec!["prefix".into(), index.into()]),
            )
            .await?;
        self.cache.prefixes.insert(index, prefix.clone());
        Ok(prefix)
    }

    async fn era(&mut self, index: usize) -> Result<Arc<CachedEra>, LookupError> {
        if let Some(era) = self.cache.eras.get(&index) {
            return Ok(Arc::clone(era));
        }
        let record: EraRecord = self
            .fetch(
                &format!("era {index}"),
                self.path(vec!["era".into(), index.into()]),
            )
            .await?;
        let era = Arc::new(decode_era(index, record)?);
        self.cache.eras.insert(index, Arc::clone(&era));
        Ok(era)
    }

    /// Make sure the baskets of every branch in `branches` are cached for
    /// files `[index_start, index_stop)`.
    ///
    /// Fails with [`LookupError::BranchMissing`] when a file's era has no
    /// such branch.
    pub async fn fetch_seekdata(
        &mut self,
        index_start: usize,
        index_stop: usize,
        branches: &[&str],
    ) -> Result<(), LookupError> {
        self.fetch_filedata(index_start, index_stop).await?;
        let offsets = self.offsets().await?;

        for &branch in branches {
            let mut missing = Vec::new();
            for index in index_start..index_stop {
                if self.cache.seeks.contains_key(&(index, branch.to_string())) {
                    continue;
                }
                let file = self.cached_file(index)?;
                ensure!(
                    file.schema.contains(branch),
                    BranchMissingSnafu {
                        branch,
                        file: file.path.clone(),
                        file_start: offsets[index],
                        file_stop: offsets[index + 1],
                    }
                );
                missing.push(index);
            }
            let (Some(&first), Some(&last)) = (missing.first(), missing.last()) else {
                continue;
            };

            let lists: Vec<Vec<BasketSeek>> = self
                .fetch(
                    &format!("baskets of {branch} in files {first}..{}", last + 1),
                    self.path(vec![
                        "file".into(),
                        PathItem::range(first, last + 1),
                        "tree".into(),
                        branch.into(),
                    ]),
                )
                .await?;
            for (index, list) in (first..).zip(lists) {
                self.cache
                    .seeks
                    .entry((index, branch.to_string()))
                    .or_insert_with(|| list.into());
            }
        }
        Ok(())
    }

    fn cached_file(&self, index: usize) -> Result<&CachedFile, LookupError> {
        let num_files = self
            .cache
            .offsets
            .as_ref()
            .map_or(0, |o| o.len().saturating_sub(1));
        self.cache
            .files
            .get(&index)
            .context(FileIndexSnafu { index, num_files })
    }

    /// Baskets of `branch` overlapping `[entry_start, entry_stop)`, in file
    /// order then basket order, each tagged with its file index.
    pub async fn entries_to_ranges_or_baskets(
        &mut self,
        branch: &str,
        entry_start: u64,
        entry_stop: u64,
    ) -> Result<Vec<BasketRange>, LookupError> {
        let (i0, i1) = self.file_index_range(entry_start, entry_stop).await?;
        self.fetch_seekdata(i0, i1, &[branch]).await?;
        let offsets = self.offsets().await?;

        let mut out = Vec::new();
        for index in i0..i1 {
            let Some(baskets) = self.cache.seeks.get(&(index, branch.to_string())) else {
                continue;
            };
            out.extend(ranges::overlapping_baskets(
                index,
                offsets[index],
                baskets,
                entry_start,
                entry_stop,
            ));
        }
        Ok(out)
    }

    /// Decoding rule of `branch` over `[entry_start, entry_stop)`.
    ///
    /// Every file in the range must agree on the rule's cache key. The first
    /// disagreeing file is reported together with its first entry, which is
    /// a safe `entry_stop` for the caller to retry with. An empty range
    /// falls back to the global view of [`items`](Self::items).
    pub async fn interpretation(
        &mut self,
        branch: &str,
        entry_start: u64,
        entry_stop: u64,
    ) -> Result<Interpretation, LookupError> {
        let (i0, i1) = self.file_index_range(entry_start, entry_stop).await?;
        if i0 == i1 {
            return self
                .items()
                .await?
                .into_iter()
                .find_map(|(name, interp)| (name == branch).then_some(interp))
                .context(UnknownBranchSnafu { branch });
        }

        self.fetch_filedata(i0, i1).await?;
        let offsets = self.offsets().await?;

        let mut expected: Option<&Interpretation> = None;
        for index in i0..i1 {
            let file = self.cached_file(index)?;
            let found = file.schema.interpretation(branch).context(BranchMissingSnafu {
                branch,
                file: file.path.clone(),
                file_start: offsets[index],
                file_stop: offsets[index + 1],
            })?;
            match expected {
                None => expected = Some(found),
                Some(first) => ensure!(
                    first.same_rule(found),
                    InterpretationConflictSnafu {
                        branch,
                        file: file.path.clone(),
                        entry_stop: offsets[index],
                        expected: first.typename.clone(),
                        found: found.typename.clone(),
                    }
                ),
            }
        }
        expected.cloned().context(UnknownBranchSnafu { branch })
    }

    /// Raw bytes of `ranges`, in request order.
    ///
    /// Ranges are grouped by file; each touched file is opened once and
    /// closed before the next one is opened.
    pub async fn fetch_chunks(&mut self, ranges: &[BasketRange]) -> Result<Vec<Bytes>, LookupError> {
        let mut by_file: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (pos, range) in ranges.iter().enumerate() {
            by_file.entry(range.file_index).or_default().push(pos);
        }

        let mut out = vec![Bytes::new(); ranges.len()];
        for (file_index, positions) in by_file {
            self.fetch_filedata(file_index, file_index + 1).await?;
            let path = self.cached_file(file_index)?.path.clone();
            let spans: Vec<(u64, u64)> = positions
                .iter()
                .map(|&p| (ranges[p].start, ranges[p].stop))
                .collect();

            let mut source = self
                .opener
                .open(&path)
                .await
                .context(ChunkSnafu { path: path.clone() })?;
            let chunks = source
                .read_ranges(&spans)
                .await
                .context(ChunkSnafu { path: path.clone() })?;
            ensure!(
                chunks.len() == spans.len(),
                ChunkCountSnafu {
                    path: path.clone(),
                    requested: spans.len(),
                    returned: chunks.len(),
                }
            );
            debug!("Read {} baskets from {path}", spans.len());

            for (pos, chunk) in positions.into_iter().zip(chunks) {
                out[pos] = chunk;
            }
        }
        Ok(out)
    }

    /// All branch names across every era, in first-seen order.
    ///
    /// Only the per-era name lists are fetched, never the descriptors.
    pub async fn keys(&mut self) -> Result<Vec<String>, LookupError> {
        if let Some(keys) = &self.cache.keys {
            return Ok(keys.to_vec());
        }
        let names: Vec<Vec<String>> = self
            .fetch("branch names", self.path(vec!["era".into(), "names".into()]))
            .await?;
        let keys = first_seen(names.iter().flatten());
        self.cache.keys = Some(keys.clone().into());
        Ok(keys)
    }

    /// Branch names with one decoding rule each, in [`keys`](Self::keys)
    /// order. When several eras define a name, the last of them wins; reads
    /// still check consistency per range.
    pub async fn items(&mut self) -> Result<Vec<(String, Interpretation)>, LookupError> {
        if let Some(items) = &self.cache.items {
            return Ok(items.to_vec());
        }
        let eras: Vec<EraBranches> = self
            .fetch(
                "branch descriptors",
                self.path(vec![
                    "era".into(),
                    PathItem::fields(["names", "interpretations"]),
                ]),
            )
            .await?;

        let mut decoded = Vec::with_capacity(eras.len());
        for (index, era) in eras.into_iter().enumerate() {
            decoded.push(decode_branches(index, era.names, &era.interpretations)?);
        }
        let keys = first_seen(decoded.iter().flatten().map(|(name, _)| name));
        let mut latest: HashMap<&str, &Interpretation> = HashMap::new();
        for (name, interp) in decoded.iter().flatten() {
            latest.insert(name.as_str(), interp);
        }
        let items: Vec<(String, Interpretation)> = keys
            .iter()
            .filter_map(|name| {
                let interp = latest.get(name.as_str()).map(|i| (*i).clone())?;
                Some((name.clone(), interp))
            })
            .collect();

        if self.cache.keys.is_none() {
            self.cache.keys = Some(keys.into());
        }
        self.cache.items = Some(items.clone().into());
        Ok(items)
    }

    /// Branch names selected by `filter`. Only [`BranchFilter::All`] is
    /// supported.
    pub async fn keys_matching(&mut self, filter: &BranchFilter) -> Result<Vec<String>, LookupError> {
        match filter {
            BranchFilter::All => self.keys().await,
            other => UnsupportedFilterSnafu {
                filter: other.to_string(),
            }
            .fail(),
        }
    }

    /// Name of the tree, taken from the last era.
    pub async fn name(&mut self) -> Result<String, LookupError> {
        if let Some(name) = &self.cache.treename {
            return Ok(name.clone());
        }
        let path = self.path(vec!["era".into(), (-1i64).into(), "treename".into()]);
        debug!("Fetching tree name from the index");
        let value = match self.handle.slice(&path).await {
            Ok(value) => value,
            Err(StoreError::IndexOutOfBounds { len: 0, .. }) => return EmptyIndexSnafu.fail(),
            Err(source) => {
                return Err(source).context(StoreSnafu { what: "tree name" });
            }
        };
        let name: String =
            serde_json::from_value(value).context(CorruptIndexSnafu { what: "tree name" })?;
        self.cache.treename = Some(name.clone());
        Ok(name)
    }
}

/// Descriptor columns of one era, without its tree name.
#[derive(Deserialize)]
struct EraBranches {
    names: Vec<String>,
    interpretations: Vec<Descriptor>,
}

fn first_seen<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

fn decode_branches(
    era: usize,
    names: Vec<String>,
    descriptors: &[Descriptor],
) -> Result<Vec<(String, Interpretation)>, LookupError> {
    let mut branches = Vec::with_capacity(names.len());
    for (name, descriptor) in names.into_iter().zip(descriptors) {
        let interp = descriptor.decode().context(DecodeSnafu {
            branch: name.clone(),
            era,
        })?;
        branches.push((name, interp));
    }
    Ok(branches)
}

fn decode_era(index: usize, record: EraRecord) -> Result<CachedEra, LookupError> {
    let branches = decode_branches(index, record.names, &record.interpretations)?;
    Ok(CachedEra::new(record.treename, branches))
}

#[async_trait]
impl<H: ArrayHandle, O: SourceOpener> ColumnarSource for IndexedTree<H, O> {
    async fn branch_names(&mut self) -> Result<Vec<String>, LookupError> {
        self.keys().await
    }

    async fn num_entries(&mut self) -> Result<u64, LookupError> {
        IndexedTree::num_entries(self).await
    }

    async fn interpretation(
        &mut self,
        branch: &str,
        entry_start: u64,
        entry_stop: u64,
    ) -> Result<Interpretation, LookupError> {
        IndexedTree::interpretation(self, branch, entry_start, entry_stop).await
    }

    async fn basket_ranges_for(
        &mut self,
        branch: &str,
        entry_start: u64,
        entry_stop: u64,
    ) -> Result<Vec<BasketRange>, LookupError> {
        self.entries_to_ranges_or_baskets(branch, entry_start, entry_stop)
            .await
    }

    async fn fetch_chunks(&mut self, ranges: &[BasketRange]) -> Result<Vec<Bytes>, LookupError> {
        IndexedTree::fetch_chunks(self, ranges).await
    }
}
