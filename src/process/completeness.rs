//! Completeness.
//!
//! Compares the observed sampling rate in each bucket with the rate expected from the
//! sampling interval of the timeseries. A ratio of 1 means every expected sample is
//! present.

use crate::auth::Actor;
use crate::calendar;
use crate::engine::{BucketRequest, Engine};
use crate::error::Result;
use crate::frame::{Column, TimeFrame};
use crate::model::{Aggregation, Timeseries};
use chrono::Duration;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Per-bucket ratios and a summary per identity.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletenessReport {
    /// One column per identity, indexed on the bucket boundaries.
    pub ratios: TimeFrame,
    pub summary: Vec<SeriesCompleteness>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeriesCompleteness {
    pub label: String,
    /// Expected sampling interval, configured or inferred. `None` when it cannot be known.
    pub interval: Option<Duration>,
    /// Mean of the non-null bucket ratios.
    pub mean: Option<f64>,
}

/// Completeness of each identity of `request` per bucket.
///
/// The request's aggregation and conversions are ignored: samples are always counted.
/// The expected interval is, in order of preference, the `expected_interval` of the
/// timeseries, the configured default, or the interval implied by the highest observed
/// rate across the window. With no interval every ratio is null.
pub fn completeness(
    engine: &Engine,
    actor: &Actor,
    request: &BucketRequest,
) -> Result<CompletenessReport> {
    let mut counting = request.clone().aggregate(Aggregation::Count);
    counting.convert_to.clear();
    let counts = engine.get_buckets(actor, &counting)?;
    let series = engine.resolve(&request.identities, request.scope)?;

    let spans = counts
        .index()
        .iter()
        .map(|b| {
            calendar::bucket_span(b, request.unit, request.width)
                .map(|span| span.num_milliseconds() as f64 / 1_000.0)
        })
        .collect::<Result<Vec<f64>>>()?;

    let by_label: HashMap<String, &Timeseries> = series
        .iter()
        .map(|t| (t.label(request.label_mode), t))
        .collect();
    let default_interval = engine.settings().default_interval();

    let mut columns = Vec::with_capacity(counts.columns().len());
    let mut summary = Vec::with_capacity(counts.columns().len());
    for column in counts.columns() {
        let rates: Vec<Option<f64>> = column
            .values
            .iter()
            .zip(&spans)
            .map(|(count, span)| match count {
                Some(count) if *span > 0.0 => Some(count / span),
                _ => None,
            })
            .collect();

        let configured = by_label
            .get(&column.label)
            .and_then(|t| t.expected_interval)
            .or(default_interval);
        let interval = configured.or_else(|| infer_interval(&rates));
        let ratios: Vec<Option<f64>> = match interval {
            Some(interval) => {
                let secs = interval.num_milliseconds() as f64 / 1_000.0;
                rates.iter().map(|r| r.map(|r| r * secs)).collect()
            }
            None => {
                warn!(
                    "Completeness of {} is undefined: no expected interval and no samples",
                    column.label
                );
                vec![None; rates.len()]
            }
        };

        summary.push(SeriesCompleteness {
            label: column.label.clone(),
            interval,
            mean: mean(&ratios),
        });
        columns.push(Column::new(column.label.clone(), ratios));
    }

    debug!(
        "completeness: {} identities over {} buckets",
        summary.len(),
        spans.len()
    );
    Ok(CompletenessReport {
        ratios: TimeFrame::from_columns(counts.index().to_vec(), columns)?,
        summary,
    })
}

/// The interval implied by the highest observed rate, if any sample was seen.
fn infer_interval(rates: &[Option<f64>]) -> Option<Duration> {
    let max = rates.iter().flatten().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 || !max.is_finite() {
        return None;
    }
    Some(Duration::milliseconds((1_000.0 / max).round() as i64))
}

fn mean(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}
