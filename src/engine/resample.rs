//! Client-side second aggregation pass.
//!
//! Stores push aggregation down to one calendar unit only. For `width × unit` buckets
//! the partial aggregates are regrouped onto the final boundary grid here, using each
//! aggregation's recombination function (`count` partials are summed, `avg` partials are
//! averaged without weighting).

use crate::model::Aggregation;
use crate::store::memory::reduce;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Regroups `partials` onto `boundaries` (ascending, left-inclusive).
///
/// Partials before the first boundary are dropped.
pub(crate) fn regroup(
    partials: BTreeMap<DateTime<Utc>, f64>,
    boundaries: &[DateTime<Utc>],
    aggregation: Aggregation,
) -> BTreeMap<DateTime<Utc>, f64> {
    let mut groups: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
    for (bucket, value) in partials {
        let position = boundaries.partition_point(|b| *b <= bucket);
        if position == 0 {
            continue;
        }
        groups
            .entry(boundaries[position - 1])
            .or_default()
            .push(value);
    }
    let recombine = aggregation.recombination();
    groups
        .into_iter()
        .map(|(boundary, values)| (boundary, reduce(recombine, &values)))
        .collect()
}
