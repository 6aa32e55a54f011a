//! Pure entry-range arithmetic over offsets and basket stops.

use crate::metadata::BasketSeek;
use crate::source::BasketRange;

/// Number of offsets `<= value` (Python's `bisect_right`).
fn bisect_right(offsets: &[u64], value: u64) -> usize {
    offsets.partition_point(|&o| o <= value)
}

/// Files whose entries intersect `[entry_start, entry_stop)`, as a half-open
/// range of file indices.
///
/// Both bounds are clamped to `[0, total]` first. An empty interval maps to
/// `(0, 0)`, and a stop that lands exactly on a file boundary does not pull
/// in the next file.
pub fn file_index_range(offsets: &[u64], entry_start: u64, entry_stop: u64) -> (usize, usize) {
    let total = offsets.last().copied().unwrap_or(0);
    let start = entry_start.min(total);
    let stop = entry_stop.min(total);
    if start >= stop {
        return (0, 0);
    }

    // offsets[0] == 0 <= start, so both searches return at least 1.
    let i_start = bisect_right(offsets, start).saturating_sub(1);
    let j = bisect_right(offsets, stop).saturating_sub(1);
    let i_stop = if offsets[j] == stop { j } else { j + 1 };
    (i_start, i_stop)
}

/// Baskets of one file that overlap `[entry_start, entry_stop)`.
///
/// `file_offset` is the global entry number of the file's first entry; local
/// basket stops are shifted by it.
pub fn overlapping_baskets(
    file_index: usize,
    file_offset: u64,
    baskets: &[BasketSeek],
    entry_start: u64,
    entry_stop: u64,
) -> Vec<BasketRange> {
    let mut out = Vec::new();
    let mut local_start = 0u64;
    for basket in baskets {
        let local_stop = basket.stop.max(local_start);
        let g0 = file_offset + local_start;
        let g1 = file_offset + local_stop;
        if g0 < entry_stop && g1 > entry_start {
            out.push(BasketRange {
                file_index,
                start: basket.seek,
                stop: basket.byte_stop(),
                entry_start: g0,
                entry_stop: g1,
            });
        }
        local_start = local_stop;
    }
    out
}
