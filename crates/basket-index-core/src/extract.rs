//! Generic basket extraction over any [`ColumnarSource`].
//!
//! This is the call path the source contract exists for: resolve each
//! requested branch's decoding rule and baskets for an entry range, then
//! fetch every payload in a single routed request. Decompression and
//! decoding of the payloads are left to the caller.

use bytes::Bytes;
use log::debug;
use snafu::prelude::*;

use crate::lookup::LookupError;
use crate::lookup::error::UnknownBranchSnafu;
use crate::metadata::Interpretation;
use crate::source::{BasketRange, ColumnarSource};

/// One basket with its compressed payload.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBasket {
    /// Where the basket lives and which entries it covers.
    pub range: BasketRange,
    /// Payload bytes, exactly `range.start..range.stop` of the file.
    pub data: Bytes,
}

/// Every basket of one branch needed for an entry range.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchBaskets {
    /// Branch name.
    pub name: String,
    /// Decoding rule, consistent across the range.
    pub interpretation: Interpretation,
    /// Baskets in entry order.
    pub baskets: Vec<RawBasket>,
}

/// Read the raw baskets of `branches` over `[entry_start, entry_stop)`.
///
/// Missing bounds default to the whole dataset and both are clamped to the
/// entry count. An empty `branches` slice selects every branch.
pub async fn read_baskets<S>(
    source: &mut S,
    branches: &[&str],
    entry_start: Option<u64>,
    entry_stop: Option<u64>,
) -> Result<Vec<BranchBaskets>, LookupError>
where
    S: ColumnarSource + ?Sized,
{
    let num_entries = source.num_entries().await?;
    let start = entry_start.unwrap_or(0).min(num_entries);
    let stop = entry_stop.unwrap_or(num_entries).clamp(start, num_entries);

    let known = source.branch_names().await?;
    let selected: Vec<String> = if branches.is_empty() {
        known
    } else {
        for branch in branches {
            ensure!(
                known.iter().any(|k| k.as_str() == *branch),
                UnknownBranchSnafu { branch: *branch }
            );
        }
        branches.iter().map(|b| b.to_string()).collect()
    };

    let mut resolved = Vec::with_capacity(selected.len());
    let mut all_ranges = Vec::new();
    for name in selected {
        let interpretation = source.interpretation(&name, start, stop).await?;
        let ranges = if start < stop {
            source.basket_ranges_for(&name, start, stop).await?
        } else {
            Vec::new()
        };
        all_ranges.extend_from_slice(&ranges);
        resolved.push((name, interpretation, ranges.len()));
    }

    let mut chunks = source.fetch_chunks(&all_ranges).await?.into_iter();
    let mut ranges = all_ranges.into_iter();
    let mut out = Vec::with_capacity(resolved.len());
    for (name, interpretation, count) in resolved {
        let baskets: Vec<RawBasket> = ranges
            .by_ref()
            .take(count)
            .zip(chunks.by_ref())
            .map(|(range, data)| RawBasket { range, data })
            .collect();
        debug!(
            "Branch {name}: {} baskets for entries {start}..{stop}",
            baskets.len()
        );
        out.push(BranchBaskets {
            name,
            interpretation,
            baskets,
        });
    }
    Ok(out)
}
