//! Time-indexed tables.
//!
//! A [`TimeFrame`] is the shape every query returns and every ingestion accepts: a
//! strictly increasing, timezone-localized index and one nullable column per timeseries
//! label. It is intentionally small. It supports building from samples, looking up
//! columns and iterating rows, and nothing resembling a general dataframe.

use crate::error::{Result, TimeseriesError};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};

/// How the values of a column are meant to be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColumnKind {
    #[default]
    Float,
    /// Integral sample counts. Values are whole numbers stored as `f64`.
    Count,
}

/// One labeled, nullable column.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub label: String,
    pub kind: ColumnKind,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(label: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            label: label.into(),
            kind: ColumnKind::Float,
            values,
        }
    }

    pub fn nulls(label: impl Into<String>, len: usize) -> Self {
        Self::new(label, vec![None; len])
    }

    pub fn with_kind(mut self, kind: ColumnKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_all_null(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

/// A table of nullable values indexed by localized timestamps.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeFrame {
    index: Vec<DateTime<Tz>>,
    columns: Vec<Column>,
}

impl TimeFrame {
    /// An empty frame with the given index and no columns.
    pub fn new(index: Vec<DateTime<Tz>>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Builds a frame from an index and columns, checking that lengths agree and labels
    /// are unique.
    pub fn from_columns(index: Vec<DateTime<Tz>>, columns: Vec<Column>) -> Result<Self> {
        let mut frame = Self::new(index);
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    /// Appends a column.
    ///
    /// # Errors
    ///
    /// [`TimeseriesError::Codec`] if the column length does not match the index or the
    /// label is already present.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if column.values.len() != self.index.len() {
            return Err(TimeseriesError::codec(
                0,
                Some(&column.label),
                format!(
                    "column has {} values but the index has {} rows",
                    column.values.len(),
                    self.index.len()
                ),
            ));
        }
        if self.column(&column.label).is_some() {
            return Err(TimeseriesError::codec(
                0,
                Some(&column.label),
                "duplicate column label",
            ));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Pivots per-label samples into a frame over the union of their timestamps.
    ///
    /// Columns appear in the given order; a label without samples becomes all-null.
    pub fn pivot(series: Vec<(String, BTreeMap<DateTime<Utc>, f64>)>, tz: Tz) -> Self {
        let instants: BTreeSet<DateTime<Utc>> = series
            .iter()
            .flat_map(|(_, points)| points.keys().copied())
            .collect();
        let index = instants.iter().map(|t| t.with_timezone(&tz)).collect();
        let columns = series
            .into_iter()
            .map(|(label, points)| {
                let values = instants.iter().map(|t| points.get(t).copied()).collect();
                Column::new(label, values)
            })
            .collect();
        Self { index, columns }
    }

    /// Reindexes per-label values onto a fixed boundary sequence.
    ///
    /// Boundaries without a value get `fill`.
    pub fn reindex(
        boundaries: &[DateTime<Tz>],
        series: Vec<(String, BTreeMap<DateTime<Utc>, f64>)>,
        fill: Option<f64>,
        kind: ColumnKind,
    ) -> Self {
        let columns = series
            .into_iter()
            .map(|(label, points)| {
                let values = boundaries
                    .iter()
                    .map(|b| points.get(&b.with_timezone(&Utc)).copied().or(fill))
                    .collect();
                Column::new(label, values).with_kind(kind)
            })
            .collect();
        Self {
            index: boundaries.to_vec(),
            columns,
        }
    }

    pub fn index(&self) -> &[DateTime<Tz>] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn column(&self, label: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.label == label)
    }

    pub fn column_mut(&mut self, label: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.label == label)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True when no cell holds a value.
    pub fn is_all_null(&self) -> bool {
        self.columns.iter().all(Column::is_all_null)
    }

    /// The values of row `row`, in column order.
    pub fn row(&self, row: usize) -> Vec<Option<f64>> {
        self.columns
            .iter()
            .map(|c| c.values.get(row).copied().flatten())
            .collect()
    }

    /// The same frame with its index expressed in `tz`.
    pub fn with_timezone(mut self, tz: &Tz) -> Self {
        for instant in &mut self.index {
            *instant = instant.with_timezone(tz);
        }
        self
    }

    /// Keeps only the rows for which `keep` returns true.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(usize) -> bool) {
        let mask: Vec<bool> = (0..self.index.len()).map(&mut keep).collect();
        let mut position = 0;
        self.index.retain(|_| {
            position += 1;
            mask[position - 1]
        });
        for column in &mut self.columns {
            let mut position = 0;
            column.values.retain(|_| {
                position += 1;
                mask[position - 1]
            });
        }
    }

    /// Samples of column `label` as `(instant, value)` pairs, nulls skipped.
    pub fn points(&self, label: &str) -> Vec<(DateTime<Utc>, f64)> {
        self.column(label)
            .map(|column| {
                self.index
                    .iter()
                    .zip(&column.values)
                    .filter_map(|(t, v)| v.map(|v| (t.with_timezone(&Utc), v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}
