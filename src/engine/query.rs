//! The read queries.

use super::stats::Accumulator;
use super::{
    apply_plan, labels, resample, BucketRequest, Engine, LastRequest, LastValue, RawRequest,
    SeriesStats, StatsRequest,
};
use crate::auth::{Action, Actor};
use crate::calendar;
use crate::error::{Result, TimeseriesError};
use crate::frame::{ColumnKind, TimeFrame};
use crate::model::{Aggregation, AssociationId, Inclusive, Sample, TimeWindow};
use crate::units::COUNT_UNIT;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

impl Engine {
    /// Raw samples pivoted into a table: one row per distinct timestamp, one column per
    /// identity in request order.
    ///
    /// Identities without an association or without samples in the window appear as
    /// all-null columns. Associations are looked up, never created.
    pub fn get_raw(&self, actor: &Actor, request: &RawRequest) -> Result<TimeFrame> {
        let tz = self.timezone(request.timezone);
        let series = self.authorized(actor, Action::Read, &request.identities, request.scope)?;
        let labels = labels(&series, request.label_mode);
        let plan = self.conversion_plan(&series, &labels, &request.convert_to, None)?;

        let window = TimeWindow {
            start: request.start,
            end: request.end,
            inclusive: request.inclusive,
        };
        let mut columns = Vec::with_capacity(series.len());
        for (timeseries, label) in series.iter().zip(labels) {
            let points = match self.existing_association(timeseries, request.state)? {
                Some(association) => self
                    .store
                    .read_range(&[association], &window)?
                    .into_iter()
                    .map(|s| (s.timestamp, s.value))
                    .collect(),
                None => BTreeMap::new(),
            };
            columns.push((label, points));
        }

        let mut frame = TimeFrame::pivot(columns, tz);
        apply_plan(&mut frame, &plan);
        debug!(
            "get_raw: {} identities, {} rows ({})",
            series.len(),
            frame.len(),
            request.state
        );
        Ok(frame)
    }

    /// Calendar-aligned aggregates over `[start, end)`, widened to whole buckets.
    ///
    /// The store aggregates at one `unit`; when `width > 1` the partials are regrouped
    /// client-side. Empty buckets hold 0 for `count` and null otherwise. Associations
    /// missing from the store are created.
    ///
    /// # Errors
    ///
    /// - [`TimeseriesError::InvalidBucketWidth`] when `width < 1`
    /// - [`TimeseriesError::Period`] for a variable-size unit with `width > 1`
    /// - unit, identity and authorization errors, all before any store access
    pub fn get_buckets(&self, actor: &Actor, request: &BucketRequest) -> Result<TimeFrame> {
        if request.width < 1 {
            return Err(TimeseriesError::InvalidBucketWidth {
                width: request.width,
            });
        }
        let tz = self.timezone(request.timezone);
        let boundaries =
            calendar::boundary_sequence(request.start, request.end, request.width, request.unit, tz)?;

        let series = self.authorized(actor, Action::Read, &request.identities, request.scope)?;
        let labels = labels(&series, request.label_mode);
        let is_count = request.aggregation == Aggregation::Count;
        let source = is_count.then_some(COUNT_UNIT);
        let plan = self.conversion_plan(&series, &labels, &request.convert_to, source)?;

        let mut associations: Vec<AssociationId> = Vec::with_capacity(series.len());
        for timeseries in &series {
            associations.push(self.association(timeseries, request.state)?);
        }

        let grid: Vec<DateTime<Utc>> = boundaries.iter().map(|b| b.with_timezone(&Utc)).collect();
        let mut partials: HashMap<AssociationId, BTreeMap<DateTime<Utc>, f64>> = HashMap::new();
        if let Some(last) = boundaries.last() {
            let start = grid[0];
            let end = calendar::step(last, request.unit, request.width)?.with_timezone(&Utc);
            for row in self.store.aggregate(
                &associations,
                start,
                end,
                request.unit,
                tz,
                request.aggregation,
            )? {
                partials
                    .entry(row.association)
                    .or_default()
                    .insert(row.bucket, row.value);
            }
        }

        let columns = labels
            .into_iter()
            .zip(&associations)
            .map(|(label, association)| {
                let values = partials.remove(association).unwrap_or_default();
                (label, resample::regroup(values, &grid, request.aggregation))
            })
            .collect();
        let (fill, kind) = if is_count {
            (Some(0.0), ColumnKind::Count)
        } else {
            (None, ColumnKind::Float)
        };
        let mut frame = TimeFrame::reindex(&boundaries, columns, fill, kind);
        apply_plan(&mut frame, &plan);

        debug!(
            "get_buckets: {} identities, {} x {} {}, {} buckets in {}",
            series.len(),
            request.width,
            request.unit,
            request.aggregation,
            frame.len(),
            tz
        );
        Ok(frame)
    }

    /// The latest sample in the window, per identity.
    pub fn get_last(&self, actor: &Actor, request: &LastRequest) -> Result<Vec<LastValue>> {
        self.point_query(actor, request, |engine, association, window| {
            Ok(engine.store.last_in(association, window)?)
        })
    }

    /// The earliest sample in the window, per identity.
    pub fn get_first(&self, actor: &Actor, request: &LastRequest) -> Result<Vec<LastValue>> {
        self.point_query(actor, request, |engine, association, window| {
            Ok(engine.store.first_in(association, window)?)
        })
    }

    fn point_query(
        &self,
        actor: &Actor,
        request: &LastRequest,
        fetch: impl Fn(&Engine, AssociationId, &TimeWindow) -> Result<Option<Sample>>,
    ) -> Result<Vec<LastValue>> {
        let tz = self.timezone(request.timezone);
        let series = self.authorized(actor, Action::Read, &request.identities, request.scope)?;
        let labels = labels(&series, request.label_mode);
        let plan = self.conversion_plan(&series, &labels, &request.convert_to, None)?;

        let window = TimeWindow {
            start: request.start,
            end: request.end,
            inclusive: request.inclusive,
        };
        let mut out = Vec::with_capacity(series.len());
        for (timeseries, label) in series.iter().zip(labels) {
            let sample = match self.existing_association(timeseries, request.state)? {
                Some(association) => fetch(self, association, &window)?,
                None => None,
            };
            let value = sample.map(|s| {
                plan.iter()
                    .find(|(l, _)| *l == label)
                    .map_or(s.value, |(_, converter)| converter.apply(s.value))
            });
            out.push(LastValue {
                label,
                timestamp: sample.map(|s| s.timestamp.with_timezone(&tz)),
                value,
            });
        }
        Ok(out)
    }

    /// Count, bounds, mean and sample standard deviation per identity, in one pass.
    pub fn get_stats(&self, actor: &Actor, request: &StatsRequest) -> Result<Vec<SeriesStats>> {
        let tz = self.timezone(request.timezone);
        let series = self.authorized(actor, Action::Read, &request.identities, request.scope)?;
        let window = TimeWindow {
            start: request.start,
            end: request.end,
            inclusive: Inclusive::Left,
        };

        let mut out = Vec::with_capacity(series.len());
        for timeseries in &series {
            let mut accumulator = Accumulator::default();
            if let Some(association) = self.existing_association(timeseries, request.state)? {
                for sample in self.store.read_range(&[association], &window)? {
                    accumulator.push(sample.timestamp, sample.value);
                }
            }
            out.push(accumulator.finish(timeseries.label(request.label_mode), &tz));
        }
        debug!("get_stats: {} identities ({})", series.len(), request.state);
        Ok(out)
    }
}
