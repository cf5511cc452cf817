//! CSV encoding.
//!
//! The first column is always `Datetime`; the remaining headers are timeseries labels,
//! which must be non-empty and unique. Blank cells are nulls. Errors carry the 1-based
//! line number of the offending record, the header being line 1. Count columns are
//! written as integers and read back as counts.
//!
//! Decoding and encoding require the `storage_csv` feature. Without it the same API is
//! available but every call returns [`TimeseriesError::FeatureNotEnabled`].
//!
//! [`TimeseriesError::FeatureNotEnabled`]: crate::error::TimeseriesError::FeatureNotEnabled

use crate::config::Settings;
use crate::error::Result;
use crate::frame::TimeFrame;

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::super::{
        assemble, format_float, format_timestamp, parse_timestamp, KindTally, DATETIME_HEADER,
    };
    use crate::error::{Result, TimeseriesError};
    use crate::frame::{ColumnKind, TimeFrame};
    use std::collections::HashSet;
    use std::io::{Read, Write};

    fn csv_error(err: csv::Error) -> TimeseriesError {
        let row = err
            .position()
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or(0);
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(err) => TimeseriesError::Io(err),
            _ => TimeseriesError::codec(row, None, message),
        }
    }

    /// Reads and writes [`TimeFrame`]s as CSV.
    #[derive(Clone, Copy, Debug)]
    pub struct CsvCodec {
        delimiter: u8,
    }

    impl Default for CsvCodec {
        fn default() -> Self {
            Self { delimiter: b',' }
        }
    }

    impl CsvCodec {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delimiter(mut self, delimiter: u8) -> Self {
            self.delimiter = delimiter;
            self
        }

        pub fn delimiter(&self) -> u8 {
            self.delimiter
        }

        /// Decodes a table from `reader`.
        ///
        /// # Errors
        ///
        /// - [`TimeseriesError::Codec`] for a bad header, a row with the wrong number of
        ///   fields, a non-numeric cell or a repeated timestamp
        /// - [`TimeseriesError::InvalidTimestamp`] for a timestamp without a UTC offset
        pub fn decode<R: Read>(&self, reader: R) -> Result<TimeFrame> {
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(self.delimiter)
                .has_headers(true)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(reader);

            let headers = reader.headers().map_err(csv_error)?.clone();
            match headers.get(0) {
                Some(DATETIME_HEADER) => {}
                Some(other) => {
                    return Err(TimeseriesError::codec(
                        1,
                        Some(other),
                        format!("first header must be '{DATETIME_HEADER}'"),
                    ))
                }
                None => return Err(TimeseriesError::codec(1, None, "missing header")),
            }

            let mut seen = HashSet::new();
            let mut labels = Vec::with_capacity(headers.len() - 1);
            for label in headers.iter().skip(1) {
                if label.is_empty() {
                    return Err(TimeseriesError::codec(1, None, "empty column label"));
                }
                if !seen.insert(label) {
                    return Err(TimeseriesError::codec(1, Some(label), "duplicate column label"));
                }
                labels.push(label.to_string());
            }

            let mut tallies = vec![KindTally::default(); labels.len()];
            let mut rows = Vec::new();
            for (position, record) in reader.records().enumerate() {
                let record = record.map_err(csv_error)?;
                let row = record
                    .position()
                    .and_then(|p| usize::try_from(p.line()).ok())
                    .unwrap_or(position + 2);
                if record.len() != headers.len() {
                    return Err(TimeseriesError::codec(
                        row,
                        None,
                        format!("expected {} fields, found {}", headers.len(), record.len()),
                    ));
                }

                let instant = parse_timestamp(&record[0], Some(row))?;
                let values = labels
                    .iter()
                    .zip(tallies.iter_mut())
                    .zip(record.iter().skip(1))
                    .map(|((label, tally), cell)| {
                        if cell.is_empty() {
                            return Ok(None);
                        }
                        tally.record(cell.parse::<i64>().is_ok());
                        cell.parse::<f64>().map(Some).map_err(|_| {
                            TimeseriesError::codec(row, Some(label), format!("'{cell}' is not a number"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                rows.push((row, instant, values));
            }
            let labels = labels
                .into_iter()
                .zip(tallies.iter().map(KindTally::kind))
                .collect();
            assemble(labels, rows)
        }

        pub fn decode_str(&self, input: &str) -> Result<TimeFrame> {
            self.decode(input.as_bytes())
        }

        /// Writes `frame` to `writer`, header first, columns in frame order.
        pub fn encode<W: Write>(&self, frame: &TimeFrame, writer: W) -> Result<()> {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(self.delimiter)
                .from_writer(writer);

            let mut header = vec![DATETIME_HEADER];
            header.extend(frame.labels());
            writer.write_record(&header).map_err(csv_error)?;

            for (row, instant) in frame.index().iter().enumerate() {
                let mut record = Vec::with_capacity(frame.columns().len() + 1);
                record.push(format_timestamp(instant));
                for column in frame.columns() {
                    let cell = match (column.values[row], column.kind) {
                        (None, _) => String::new(),
                        (Some(value), ColumnKind::Count) => format!("{value:.0}"),
                        (Some(value), ColumnKind::Float) => format_float(value),
                    };
                    record.push(cell);
                }
                writer.write_record(&record).map_err(csv_error)?;
            }
            writer.flush()?;
            Ok(())
        }

        pub fn encode_to_string(&self, frame: &TimeFrame) -> Result<String> {
            let mut buffer = Vec::new();
            self.encode(frame, &mut buffer)?;
            String::from_utf8(buffer).map_err(|e| TimeseriesError::codec(0, None, e.to_string()))
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use crate::error::{Result, TimeseriesError};
    use crate::frame::TimeFrame;
    use std::io::{Read, Write};

    fn disabled<T>() -> Result<T> {
        Err(TimeseriesError::FeatureNotEnabled("storage_csv".to_string()))
    }

    #[derive(Clone, Copy, Debug)]
    pub struct CsvCodec {
        delimiter: u8,
    }

    impl Default for CsvCodec {
        fn default() -> Self {
            Self { delimiter: b',' }
        }
    }

    impl CsvCodec {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delimiter(mut self, delimiter: u8) -> Self {
            self.delimiter = delimiter;
            self
        }

        pub fn delimiter(&self) -> u8 {
            self.delimiter
        }

        pub fn decode<R: Read>(&self, _reader: R) -> Result<TimeFrame> {
            disabled()
        }

        pub fn decode_str(&self, _input: &str) -> Result<TimeFrame> {
            disabled()
        }

        pub fn encode<W: Write>(&self, _frame: &TimeFrame, _writer: W) -> Result<()> {
            disabled()
        }

        pub fn encode_to_string(&self, _frame: &TimeFrame) -> Result<String> {
            disabled()
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::CsvCodec;

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::CsvCodec;

impl CsvCodec {
    /// A codec using the delimiter from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new().with_delimiter(settings.csv_delimiter())
    }
}

/// Decodes comma-separated `input`.
pub fn decode(input: &str) -> Result<TimeFrame> {
    CsvCodec::new().decode_str(input)
}

/// Encodes `frame` as comma-separated text.
pub fn encode(frame: &TimeFrame) -> Result<String> {
    CsvCodec::new().encode_to_string(frame)
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;
    use crate::error::TimeseriesError;
    use crate::frame::{Column, ColumnKind};
    use chrono::TimeZone;
    use chrono_tz::Europe::Paris;

    #[test]
    fn test_decode() {
        let input = "Datetime,1,2\n\
                     2020-01-01T01:00:00+01:00,1.5,\n\
                     2020-01-01T01:00:00+00:00,,2\n";
        let frame = decode(input).unwrap();
        assert_eq!(frame.labels(), vec!["1", "2"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame.index()[0],
            chrono::Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(frame.column("1").unwrap().values, vec![Some(1.5), None]);
        assert_eq!(frame.column("2").unwrap().values, vec![None, Some(2.0)]);
        assert_eq!(frame.column("1").unwrap().kind, ColumnKind::Float);
        assert_eq!(frame.column("2").unwrap().kind, ColumnKind::Count);
    }

    #[test]
    fn test_count_and_float_kinds_survive() {
        let index = vec![
            Paris.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Paris.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap(),
        ];
        let frame = TimeFrame::from_columns(
            index,
            vec![
                Column::new("avg", vec![Some(2.0), Some(3.5)]),
                Column::new("n", vec![Some(4.0), Some(0.0)]).with_kind(ColumnKind::Count),
                Column::new("empty", vec![None, None]),
            ],
        )
        .unwrap();
        let text = encode(&frame).unwrap();
        assert!(text.contains(",2.0,4,\n"), "{text}");
        assert_eq!(decode(&text).unwrap(), frame);
    }

    #[test]
    fn test_decode_rejects_naive_timestamp_with_row() {
        let input = "Datetime,1\n2020-01-01T00:00:00+00:00,1\n2020-01-01T01:00:00,2\n";
        match decode(input) {
            Err(TimeseriesError::InvalidTimestamp { row, reason, .. }) => {
                assert_eq!(row, Some(3));
                assert_eq!(reason, "missing UTC offset");
            }
            other => panic!("expected InvalidTimestamp, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_header_errors() {
        assert!(matches!(
            decode("Time,1\n"),
            Err(TimeseriesError::Codec { row: 1, .. })
        ));
        assert!(matches!(
            decode("Datetime,1,1\n"),
            Err(TimeseriesError::Codec { row: 1, .. })
        ));
        assert!(matches!(
            decode("Datetime,,2\n"),
            Err(TimeseriesError::Codec { row: 1, .. })
        ));
    }

    #[test]
    fn test_decode_row_errors() {
        let short = "Datetime,1,2\n2020-01-01T00:00:00Z,1\n";
        assert!(matches!(
            decode(short),
            Err(TimeseriesError::Codec { row: 2, column: None, .. })
        ));

        let bad = "Datetime,1,2\n2020-01-01T00:00:00Z,1,abc\n";
        match decode(bad) {
            Err(TimeseriesError::Codec { row, column, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column.as_deref(), Some("2"));
            }
            other => panic!("expected Codec, got {other:?}"),
        }
    }

    #[test]
    fn test_encode() {
        let index = vec![
            Paris.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Paris.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap(),
        ];
        let frame = TimeFrame::from_columns(
            index,
            vec![
                Column::new("power", vec![Some(1.25), None]),
                Column::new("n", vec![Some(3.0), Some(0.0)]).with_kind(ColumnKind::Count),
            ],
        )
        .unwrap();
        let text = encode(&frame).unwrap();
        assert_eq!(
            text,
            "Datetime,power,n\n\
             2020-01-01T00:00:00+01:00,1.25,3\n\
             2020-01-01T01:00:00+01:00,,0\n"
        );
    }

    #[test]
    fn test_semicolon_delimiter() {
        let codec = CsvCodec::new().with_delimiter(b';');
        let frame = codec
            .decode_str("Datetime;a\n2020-01-01T00:00:00.250+00:00;4\n")
            .unwrap();
        assert_eq!(frame.column("a").unwrap().kind, ColumnKind::Count);
        let text = codec.encode_to_string(&frame).unwrap();
        assert_eq!(text, "Datetime;a\n2020-01-01T00:00:00.250+00:00;4\n");
    }
}
