//! The collector: scans files and accumulates the index array state.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use rayon::prelude::*;
use snafu::prelude::*;

use crate::collect::error::{
    BasketLayoutMismatchSnafu, CollectError, EncodeDescriptorSnafu, RaggedBasketsSnafu,
    ThreadPoolSnafu,
};
use crate::collect::options::CollectOptions;
use crate::collect::paths::{SplitPath, split_path};
use crate::collect::registry::DenseRegistry;
use crate::collect::tree_reader::{TreeLayout, TreeReader};
use crate::metadata::{BasketSeek, Descriptor, EraRecord, FileRow, IndexArray};

/// Shared state mutated by [`Collector::collect`].
///
/// Append-only: nothing is ever removed or renumbered.
#[derive(Debug)]
struct CollectedState {
    eras: DenseRegistry<EraRecord>,
    prefixes: DenseRegistry<String>,
    entry_offsets: Vec<u64>,
    lookup_table: Vec<FileRow>,
}

impl Default for CollectedState {
    fn default() -> Self {
        Self {
            eras: DenseRegistry::new(),
            prefixes: DenseRegistry::new(),
            entry_offsets: vec![0],
            lookup_table: Vec::new(),
        }
    }
}

/// A parsed, validated file waiting for the commit step.
struct PendingFile {
    era_key: String,
    treename: String,
    names: Vec<String>,
    descriptors: Vec<Descriptor>,
    split: SplitPath,
    num_entries: u64,
    tree: BTreeMap<String, Vec<BasketSeek>>,
}

/// Collects basket layouts of many files into one index array.
///
/// `collect` may be called from several threads. File parsing runs
/// unsynchronized; registering the era and prefix, appending the offset and
/// appending the file row happen together under one lock, so every
/// committed file is visible either completely or not at all.
///
/// Era and prefix ids follow commit order, which under concurrency is not
/// the input order.
#[derive(Debug)]
pub struct Collector<R> {
    reader: R,
    options: CollectOptions,
    state: Mutex<CollectedState>,
}

impl<R: TreeReader> Collector<R> {
    /// Create a collector with default options.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            options: CollectOptions::default(),
            state: Mutex::new(CollectedState::default()),
        }
    }

    /// Create a collector with explicit options.
    pub fn with_options(reader: R, options: CollectOptions) -> Result<Self, CollectError> {
        options.validate()?;
        Ok(Self {
            reader,
            options,
            state: Mutex::new(CollectedState::default()),
        })
    }

    /// Options this collector was created with.
    pub fn options(&self) -> &CollectOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, CollectedState> {
        // State is only mutated after all fallible work is done, so a
        // poisoned lock still guards consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Collect tree `tree` of the file at `path`.
    ///
    /// Returns the number of entries the file contributed. Files that cannot
    /// be opened, lack the tree, or have no entries contribute 0 and leave no
    /// trace in the index.
    ///
    /// # Errors
    ///
    /// - [`CollectError::PathTooShallow`] when the path has fewer components
    ///   than `prefix_depth`.
    /// - [`CollectError::BasketLayoutMismatch`] / [`CollectError::RaggedBaskets`]
    ///   when the reader reports a self-inconsistent layout.
    pub fn collect(&self, path: impl AsRef<Path>, tree: &str) -> Result<u64, CollectError> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().into_owned();

        let layout = match self.reader.read_tree(path, tree) {
            Ok(layout) => layout,
            Err(e) => {
                warn!("skipping {path_str}: {e}");
                return Ok(0);
            }
        };

        if layout.num_entries == 0 {
            debug!("skipping {path_str}: tree {tree} has no entries");
            return Ok(0);
        }

        let pending = self.prepare(&path_str, tree, layout)?;
        let num_entries = pending.num_entries;
        self.commit(pending);

        Ok(num_entries)
    }

    /// Collect many `(path, tree)` pairs in parallel.
    ///
    /// Returns the total number of entries contributed. Stops at the first
    /// hard error; files committed before it stay committed.
    pub fn collect_all<P, T>(&self, inputs: &[(P, T)]) -> Result<u64, CollectError>
    where
        P: AsRef<Path> + Sync,
        T: AsRef<str> + Sync,
    {
        let run = || {
            inputs
                .par_iter()
                .map(|(path, tree)| self.collect(path, tree.as_ref()))
                .try_reduce(|| 0, |a, b| Ok(a + b))
        };

        match self.options.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .context(ThreadPoolSnafu)?;
                pool.install(run)
            }
            None => run(),
        }
    }

    /// Validate the layout and build everything the commit step needs.
    fn prepare(
        &self,
        path: &str,
        tree: &str,
        layout: TreeLayout,
    ) -> Result<PendingFile, CollectError> {
        let num_entries = layout.num_entries;
        let mut names = Vec::with_capacity(layout.branches.len());
        let mut descriptors = Vec::with_capacity(layout.branches.len());
        let mut key_lines = Vec::with_capacity(layout.branches.len());
        let mut baskets_by_name = BTreeMap::new();

        for branch in layout.branches {
            let (seeks, stops, sizes) = (
                branch.basket_seek.len(),
                branch.basket_entry.len(),
                branch.basket_bytes.len(),
            );
            ensure!(
                seeks == stops && stops == sizes,
                RaggedBasketsSnafu {
                    path,
                    branch: branch.name.clone(),
                    seeks,
                    stops,
                    sizes,
                }
            );

            if let Some(&last_stop) = branch.basket_entry.last() {
                ensure!(
                    last_stop == num_entries,
                    BasketLayoutMismatchSnafu {
                        path,
                        branch: branch.name.clone(),
                        last_stop,
                        num_entries,
                    }
                );
            }

            let descriptor =
                branch
                    .interpretation
                    .to_descriptor()
                    .context(EncodeDescriptorSnafu {
                        path,
                        branch: branch.name.clone(),
                    })?;

            let baskets = branch
                .basket_seek
                .iter()
                .zip(&branch.basket_entry)
                .zip(&branch.basket_bytes)
                .map(|((&seek, &stop), &bytes)| BasketSeek { seek, stop, bytes })
                .collect::<Vec<_>>();

            key_lines.push(format!(
                "{}\t{}",
                branch.name, branch.interpretation.cache_key
            ));
            baskets_by_name.insert(branch.name.clone(), baskets);
            names.push(branch.name);
            descriptors.push(descriptor);
        }

        key_lines.sort();
        let era_key = format!("{tree}\n{}", key_lines.join("\n"));

        let split = split_path(path, self.options.prefix_depth, self.options.separator)?;

        Ok(PendingFile {
            era_key,
            treename: tree.to_string(),
            names,
            descriptors,
            split,
            num_entries,
            tree: baskets_by_name,
        })
    }

    /// The critical section: everything here happens under one lock.
    fn commit(&self, pending: PendingFile) {
        let PendingFile {
            era_key,
            treename,
            names,
            descriptors,
            split,
            num_entries,
            tree,
        } = pending;

        let mut state = self.lock();

        let era = state.eras.get_or_insert_with(&era_key, || EraRecord {
            treename,
            names,
            interpretations: descriptors,
        });

        let running = state.entry_offsets.last().copied().unwrap_or(0);
        state.entry_offsets.push(running + num_entries);

        let SplitPath { prefix, suffix } = split;
        let prefix = state.prefixes.get_or_insert_with(&prefix, || prefix.clone());

        debug!(
            "committed file #{} ({suffix}): {num_entries} entries, era {era}, prefix {prefix}",
            state.lookup_table.len()
        );

        state.lookup_table.push(FileRow {
            filename: suffix,
            era,
            prefix,
            tree,
        });
    }

    /// Snapshot the collected state as an index array.
    ///
    /// Each call is independent and reflects every commit finished before it.
    pub fn to_array(&self) -> IndexArray {
        let state = self.lock();
        IndexArray {
            offsets: state.entry_offsets.clone(),
            file: state.lookup_table.clone(),
            era: state.eras.entries().to_vec(),
            prefix: state.prefixes.entries().to_vec(),
        }
    }

    /// Total entries committed so far.
    pub fn num_entries(&self) -> u64 {
        self.lock().entry_offsets.last().copied().unwrap_or(0)
    }

    /// Number of files committed so far.
    pub fn num_files(&self) -> usize {
        self.lock().lookup_table.len()
    }

    /// Distinct branch names across all eras, in first-seen order.
    pub fn keys(&self) -> Vec<String> {
        let state = self.lock();
        let mut seen = HashSet::new();
        state
            .eras
            .entries()
            .iter()
            .flat_map(|era| era.names.iter())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::collect::tree_reader::{BranchLayout, TreeReadError};
    use crate::metadata::Interpretation;

    /// Serves canned layouts keyed by path; unknown paths fail to open.
    #[derive(Default)]
    struct FakeReader {
        layouts: HashMap<PathBuf, (String, TreeLayout)>,
    }

    impl FakeReader {
        fn with(mut self, path: &str, tree: &str, layout: TreeLayout) -> Self {
            self.layouts
                .insert(PathBuf::from(path), (tree.to_string(), layout));
            self
        }
    }

    impl TreeReader for FakeReader {
        fn read_tree(&self, path: &Path, tree: &str) -> Result<TreeLayout, TreeReadError> {
            match self.layouts.get(path) {
                Some((name, layout)) if name == tree => Ok(layout.clone()),
                Some((name, _)) => Err(TreeReadError::TreeNotFound {
                    path: path.display().to_string(),
                    tree: tree.to_string(),
                    found: name.clone(),
                }),
                None if path.extension().is_some_and(|e| e == "bad") => {
                    Err(TreeReadError::Decode {
                        path: path.display().to_string(),
                        source: "footer magic mismatch".into(),
                        backtrace: snafu::Backtrace::capture(),
                    })
                }
                None => Err(TreeReadError::Open {
                    path: path.display().to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    backtrace: snafu::Backtrace::capture(),
                }),
            }
        }
    }

    fn branch(name: &str, key: &str, stops: &[u64]) -> BranchLayout {
        BranchLayout {
            name: name.to_string(),
            interpretation: Interpretation::new(key, key),
            basket_seek: stops.iter().map(|s| 1000 + s).collect(),
            basket_entry: stops.to_vec(),
            basket_bytes: stops.iter().map(|_| 10).collect(),
        }
    }

    fn layout(num_entries: u64, branches: Vec<BranchLayout>) -> TreeLayout {
        TreeLayout {
            num_entries,
            branches,
        }
    }

    #[test]
    fn unreadable_and_empty_files_are_skipped() {
        let reader = FakeReader::default()
            .with("/d/empty.root", "Events", layout(0, vec![]))
            .with("/d/ok.root", "Events", layout(5, vec![branch("x", "i8", &[5])]));
        let collector = Collector::new(reader);

        assert_eq!(collector.collect("/d/missing.root", "Events").unwrap(), 0);
        assert_eq!(collector.collect("/d/corrupt.bad", "Events").unwrap(), 0);
        assert_eq!(collector.collect("/d/ok.root", "Other").unwrap(), 0);
        assert_eq!(collector.collect("/d/empty.root", "Events").unwrap(), 0);
        assert_eq!(collector.collect("/d/ok.root", "Events").unwrap(), 5);

        let array = collector.to_array();
        assert_eq!(array.offsets, vec![0, 5]);
        assert_eq!(array.file.len(), 1);
        assert_eq!(array.era.len(), 1);
        assert_eq!(array.prefix, vec!["/d/".to_string()]);
    }

    #[test]
    fn branch_order_does_not_split_eras() {
        let reader = FakeReader::default()
            .with(
                "/d/a.root",
                "Events",
                layout(4, vec![branch("x", "i8", &[4]), branch("y", "f4", &[2, 4])]),
            )
            .with(
                "/e/b.root",
                "Events",
                layout(6, vec![branch("y", "f4", &[6]), branch("x", "i8", &[3, 6])]),
            );
        let collector = Collector::new(reader);
        collector.collect("/d/a.root", "Events").unwrap();
        collector.collect("/e/b.root", "Events").unwrap();

        let array = collector.to_array();
        assert_eq!(array.era.len(), 1);
        assert_eq!(array.era[0].names, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(array.prefix.len(), 2);
        assert_eq!(array.offsets, vec![0, 4, 10]);

        // Rows map baskets by the file's own branch names.
        let b = &array.file[1];
        assert_eq!(b.tree["x"].len(), 2);
        assert_eq!(b.tree["y"].len(), 1);
        assert_eq!(b.tree["x"][1].stop, 6);
    }

    #[test]
    fn descriptor_change_starts_a_new_era() {
        let reader = FakeReader::default()
            .with("/d/a.root", "Events", layout(4, vec![branch("x", "i8", &[4])]))
            .with("/d/b.root", "Events", layout(4, vec![branch("x", "f8", &[4])]));
        let collector = Collector::new(reader);
        collector.collect("/d/a.root", "Events").unwrap();
        collector.collect("/d/b.root", "Events").unwrap();

        let array = collector.to_array();
        assert_eq!(array.era.len(), 2);
        assert_eq!(array.file[1].era, 1);
        assert_eq!(array.file[1].prefix, 0);
        assert_eq!(collector.keys(), vec!["x".to_string()]);
    }

    #[test]
    fn inconsistent_basket_layout_is_a_hard_error() {
        let reader = FakeReader::default().with(
            "/d/bad.root",
            "Events",
            layout(10, vec![branch("x", "i8", &[4, 9])]),
        );
        let collector = Collector::new(reader);

        let err = collector.collect("/d/bad.root", "Events").unwrap_err();
        assert!(matches!(
            err,
            CollectError::BasketLayoutMismatch {
                last_stop: 9,
                num_entries: 10,
                ..
            }
        ));
        assert_eq!(collector.num_files(), 0);
        assert_eq!(collector.to_array(), IndexArray::default());
    }

    #[test]
    fn ragged_basket_arrays_are_rejected() {
        let mut ragged = branch("x", "i8", &[4]);
        ragged.basket_bytes.push(99);
        let reader =
            FakeReader::default().with("/d/r.root", "Events", layout(4, vec![ragged]));
        let collector = Collector::new(reader);

        let err = collector.collect("/d/r.root", "Events").unwrap_err();
        assert!(matches!(err, CollectError::RaggedBaskets { sizes: 2, .. }));
    }

    #[test]
    fn shallow_paths_are_rejected() {
        let reader =
            FakeReader::default().with("a.root", "Events", layout(3, vec![branch("x", "i8", &[3])]));
        let options = CollectOptions::default().with_prefix_depth(2);
        let collector = Collector::with_options(reader, options).unwrap();

        let err = collector.collect("a.root", "Events").unwrap_err();
        assert!(matches!(err, CollectError::PathTooShallow { .. }));
        assert_eq!(collector.num_entries(), 0);
    }

    #[test]
    fn branch_without_baskets_is_recorded_empty() {
        let reader = FakeReader::default().with(
            "/d/a.root",
            "Events",
            layout(3, vec![branch("x", "i8", &[3]), branch("e", "i8", &[])]),
        );
        let collector = Collector::new(reader);
        collector.collect("/d/a.root", "Events").unwrap();
        assert!(collector.to_array().file[0].tree["e"].is_empty());
    }

    #[test]
    fn parallel_collection_commits_every_file() {
        let mut reader = FakeReader::default();
        let mut inputs = Vec::new();
        for i in 0..32u64 {
            let path = format!("/d/{}/f{i}.root", i % 3);
            reader = reader.with(&path, "Events", layout(i + 1, vec![branch("x", "i8", &[i + 1])]));
            inputs.push((path, "Events".to_string()));
        }
        let options = CollectOptions::default().with_threads(4);
        let collector = Collector::with_options(reader, options).unwrap();

        let total = collector.collect_all(&inputs).unwrap();

        let array = collector.to_array();
        assert_eq!(total, (1..=32).sum::<u64>());
        assert_eq!(array.num_entries(), total);
        assert_eq!(array.offsets.len(), 33);
        assert_eq!(array.era.len(), 1);
        assert_eq!(array.prefix.len(), 3);
        array.validate().unwrap();

        // Whatever the commit order, each row's span matches its own basket layout.
        for (i, row) in array.file.iter().enumerate() {
            let span = array.offsets[i + 1] - array.offsets[i];
            assert_eq!(row.tree["x"][0].stop, span);
        }
    }

    mod proptest_collector {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn prop_offsets_count_only_files_with_entries(
                counts in proptest::collection::vec(0u64..50, 0..16)
            ) {
                let mut reader = FakeReader::default();
                for (i, &n) in counts.iter().enumerate() {
                    let branches = if n == 0 { vec![] } else { vec![branch("x", "i8", &[n])] };
                    reader = reader.with(&format!("/d/f{i}.root"), "Events", layout(n, branches));
                }
                let collector = Collector::new(reader);
                for i in 0..counts.len() {
                    collector.collect(format!("/d/f{i}.root"), "Events").unwrap();
                }

                let array = collector.to_array();
                let non_empty = counts.iter().filter(|&&n| n > 0).count();
                prop_assert_eq!(array.offsets.len(), 1 + non_empty);
                prop_assert_eq!(array.num_entries(), counts.iter().sum::<u64>());
            }
        }
    }
}
