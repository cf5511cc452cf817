//! JSON encoding: `{"<label>": {"<timestamp>": <number|null>, ...}, ...}`.
//!
//! Count columns are written as JSON integers and float columns as JSON floats, so
//! decoding restores both kinds.

use super::{assemble, format_timestamp, parse_timestamp, KindTally};
use crate::error::{Result, TimeseriesError};
use crate::frame::{ColumnKind, TimeFrame};
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Encoding options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JsonOptions {
    /// Writes null cells as explicit `null` instead of omitting them.
    pub keep_nulls: bool,
}

impl JsonOptions {
    /// Raw exports omit nulls.
    pub fn raw() -> Self {
        Self { keep_nulls: false }
    }

    /// Bucketed exports keep nulls so the whole grid survives.
    pub fn buckets() -> Self {
        Self { keep_nulls: true }
    }
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self::raw()
    }
}

/// Encodes `frame` as a JSON object, labels in frame order.
pub fn encode(frame: &TimeFrame, options: &JsonOptions) -> Value {
    let timestamps: Vec<String> = frame.index().iter().map(format_timestamp).collect();
    let mut root = Map::new();
    for column in frame.columns() {
        let mut entries = Map::new();
        for (timestamp, value) in timestamps.iter().zip(&column.values) {
            let value = match (value, column.kind) {
                (Some(v), ColumnKind::Count) => Value::from(v.round() as i64),
                (Some(v), ColumnKind::Float) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
                (None, _) => Value::Null,
            };
            if value.is_null() && !options.keep_nulls {
                continue;
            }
            entries.insert(timestamp.clone(), value);
        }
        root.insert(column.label.clone(), Value::Object(entries));
    }
    Value::Object(root)
}

pub fn encode_to_string(frame: &TimeFrame, options: &JsonOptions) -> Result<String> {
    Ok(serde_json::to_string(&encode(frame, options))?)
}

/// Decodes a JSON document into a UTC-indexed frame.
///
/// The index is the union of every label's timestamps; a label without an entry at a
/// timestamp gets a null there. Rows reported in errors are 1-based entry positions
/// within their label.
///
/// # Errors
///
/// - [`TimeseriesError::Json`] for malformed JSON
/// - [`TimeseriesError::Codec`] when the document does not have the expected shape
/// - [`TimeseriesError::InvalidTimestamp`] for a timestamp without a UTC offset
pub fn decode(input: &str) -> Result<TimeFrame> {
    let document: Value = serde_json::from_str(input)?;
    let Value::Object(root) = document else {
        return Err(TimeseriesError::codec(0, None, "expected an object of labels"));
    };

    let mut labels = Vec::with_capacity(root.len());
    let mut series: Vec<BTreeMap<DateTime<Utc>, Option<f64>>> = Vec::with_capacity(root.len());
    for (label, entries) in &root {
        if label.is_empty() {
            return Err(TimeseriesError::codec(0, None, "empty label"));
        }
        let Value::Object(entries) = entries else {
            return Err(TimeseriesError::codec(
                0,
                Some(label),
                "expected an object of timestamps",
            ));
        };
        let mut points = BTreeMap::new();
        let mut tally = KindTally::default();
        for (position, (timestamp, value)) in entries.iter().enumerate() {
            let row = position + 1;
            let instant = parse_timestamp(timestamp, Some(row))?;
            let value = match value {
                Value::Null => None,
                Value::Number(n) => {
                    tally.record(n.is_i64() || n.is_u64());
                    n.as_f64()
                }
                other => {
                    return Err(TimeseriesError::codec(
                        row,
                        Some(label),
                        format!("{other} is not a number"),
                    ))
                }
            };
            if points.insert(instant, value).is_some() {
                return Err(TimeseriesError::codec(
                    row,
                    Some(label),
                    format!("duplicate timestamp {instant}"),
                ));
            }
        }
        labels.push((label.clone(), tally.kind()));
        series.push(points);
    }

    let instants: BTreeSet<DateTime<Utc>> = series.iter().flat_map(|p| p.keys().copied()).collect();
    let rows = instants
        .into_iter()
        .enumerate()
        .map(|(row, instant)| {
            let values = series
                .iter()
                .map(|points| points.get(&instant).copied().flatten())
                .collect();
            (row + 1, instant, values)
        })
        .collect();
    assemble(labels, rows)
}
