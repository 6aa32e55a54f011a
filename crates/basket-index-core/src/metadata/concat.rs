//! Merging independently collected index arrays.

use crate::metadata::model::IndexArray;

/// Concatenate index arrays as if all their files had been collected by one
/// collector.
///
/// - Offsets are chained: each input's offsets, minus its leading 0, are
///   shifted by the running total.
/// - Era and prefix references in file rows are shifted by the number of
///   eras/prefixes already placed.
/// - Identical eras or prefixes coming from different inputs are **not**
///   merged; each input keeps its own records.
pub fn concatenate<'a, I>(arrays: I) -> IndexArray
where
    I: IntoIterator<Item = &'a IndexArray>,
{
    let mut out = IndexArray::default();

    for array in arrays {
        let base_entries = out.num_entries();
        let base_era = out.era.len();
        let base_prefix = out.prefix.len();

        out.offsets
            .extend(array.offsets.iter().skip(1).map(|o| base_entries + o));

        out.file.extend(array.file.iter().cloned().map(|mut row| {
            row.era += base_era;
            row.prefix += base_prefix;
            row
        }));

        out.era.extend(array.era.iter().cloned());
        out.prefix.extend(array.prefix.iter().cloned());
    }

    out
}
