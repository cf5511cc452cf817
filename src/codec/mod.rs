//! Text encodings of [`TimeFrame`]s.
//!
//! Two formats are supported:
//!
//! - **CSV** ([`csv`]): a `Datetime` column followed by one column per label. Requires the
//!   `storage_csv` feature (enabled by default).
//! - **JSON** ([`json`]): `{"<label>": {"<timestamp>": <number|null>}}`, label order
//!   preserved.
//!
//! Timestamps are written as RFC 3339 with an explicit offset and read back only when
//! they carry one; a naive timestamp is rejected rather than assumed to be UTC.
//! Decoded frames are indexed in UTC.
//!
//! Count columns are written as integer literals and float columns never are (`2.0`,
//! not `2`). Decoders use this to restore [`ColumnKind::Count`]: a column whose values
//! are all integer literals decodes as a count, anything else as a float. A column with
//! no values decodes as a float.
//!
//! [`ColumnKind::Count`]: crate::frame::ColumnKind::Count
//!
//! The helpers at the bottom of this module chain a codec with the engine: decode then
//! ingest, or query then encode.

pub mod csv;
pub mod json;

pub use self::csv::CsvCodec;
pub use self::json::JsonOptions;

use crate::auth::Actor;
use crate::engine::{BucketRequest, Engine, RawRequest};
use crate::error::{Result, TimeseriesError};
use crate::frame::{Column, ColumnKind, TimeFrame};
use crate::ingest::IngestReport;
use crate::model::{DataState, ScopeId};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;

/// Header of the timestamp column in CSV input and output.
pub const DATETIME_HEADER: &str = "Datetime";

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parses an ISO-8601 timestamp that must carry a UTC offset.
pub(crate) fn parse_timestamp(value: &str, row: Option<usize>) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }
    let naive = NAIVE_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok());
    let reason = if naive {
        "missing UTC offset"
    } else {
        "not an ISO-8601 timestamp"
    };
    Err(TimeseriesError::InvalidTimestamp {
        value: value.to_string(),
        row,
        reason: reason.to_string(),
    })
}

pub(crate) fn format_timestamp(instant: &DateTime<Tz>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Column kind inferred from how a column's values were written.
#[derive(Clone, Copy, Debug)]
pub(crate) struct KindTally {
    seen: bool,
    integral: bool,
}

impl Default for KindTally {
    fn default() -> Self {
        Self {
            seen: false,
            integral: true,
        }
    }
}

impl KindTally {
    pub(crate) fn record(&mut self, integer_literal: bool) {
        self.seen = true;
        self.integral &= integer_literal;
    }

    pub(crate) fn kind(&self) -> ColumnKind {
        if self.seen && self.integral {
            ColumnKind::Count
        } else {
            ColumnKind::Float
        }
    }
}

/// Text of a float cell; always carries a fraction or an exponent.
#[cfg_attr(not(feature = "storage_csv"), allow(dead_code))]
pub(crate) fn format_float(value: f64) -> String {
    format!("{value:?}")
}

/// Builds a UTC-indexed frame from decoded rows, sorted by time.
///
/// `rows` holds `(source row, instant, values)`; a timestamp seen twice is an error
/// reported at its second occurrence.
pub(crate) fn assemble(
    labels: Vec<(String, ColumnKind)>,
    mut rows: Vec<(usize, DateTime<Utc>, Vec<Option<f64>>)>,
) -> Result<TimeFrame> {
    rows.sort_by_key(|(row, instant, _)| (*instant, *row));
    if let Some(pair) = rows.windows(2).find(|pair| pair[0].1 == pair[1].1) {
        let (row, instant, _) = &pair[1];
        return Err(TimeseriesError::codec(
            *row,
            Some(DATETIME_HEADER),
            format!("duplicate timestamp {instant}"),
        ));
    }

    let index = rows
        .iter()
        .map(|(_, instant, _)| instant.with_timezone(&Tz::UTC))
        .collect();
    let mut columns: Vec<Column> = labels
        .into_iter()
        .map(|(label, kind)| Column::new(label, Vec::with_capacity(rows.len())).with_kind(kind))
        .collect();
    for (_, _, values) in rows {
        for (column, value) in columns.iter_mut().zip(values) {
            column.values.push(value);
        }
    }
    TimeFrame::from_columns(index, columns)
}

// =============================================================================
// Engine helpers
// =============================================================================

/// Decodes CSV with the configured delimiter and ingests it.
pub fn import_csv(
    engine: &Engine,
    actor: &Actor,
    input: &str,
    state: DataState,
    scope: Option<ScopeId>,
    convert_from: &HashMap<String, String>,
) -> Result<IngestReport> {
    let frame = CsvCodec::from_settings(engine.settings()).decode_str(input)?;
    engine
        .ingestor()
        .set(actor, &frame, state, scope, convert_from)
}

/// Decodes JSON and ingests it.
pub fn import_json(
    engine: &Engine,
    actor: &Actor,
    input: &str,
    state: DataState,
    scope: Option<ScopeId>,
    convert_from: &HashMap<String, String>,
) -> Result<IngestReport> {
    let frame = json::decode(input)?;
    engine
        .ingestor()
        .set(actor, &frame, state, scope, convert_from)
}

/// Runs a bucket query and encodes the result as CSV, keeping every boundary.
pub fn export_buckets_csv(engine: &Engine, actor: &Actor, request: &BucketRequest) -> Result<String> {
    let frame = engine.get_buckets(actor, request)?;
    CsvCodec::from_settings(engine.settings()).encode_to_string(&frame)
}

/// Runs a raw query and encodes the result as JSON, without nulls.
pub fn export_raw_json(engine: &Engine, actor: &Actor, request: &RawRequest) -> Result<String> {
    let frame = engine.get_raw(actor, request)?;
    json::encode_to_string(&frame, &JsonOptions::raw())
}
