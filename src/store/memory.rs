//! In-memory [`SampleStore`].
//!
//! Samples live in a `BTreeMap` keyed by `(association, timestamp)`, so every range
//! query is a contiguous scan. Associations are kept in a separate map guarded by its own
//! lock; ids come from an atomic counter.

use super::{AggregateRow, SampleStore, StoreError};
use crate::calendar::{self, PeriodUnit};
use crate::model::{
    Aggregation, AssociationId, DataState, Inclusive, Sample, TimeWindow, TimeseriesId,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use tracing::debug;

type SampleKey = (AssociationId, DateTime<Utc>);

#[derive(Debug)]
pub struct MemoryStore {
    samples: RwLock<BTreeMap<SampleKey, f64>>,
    associations: RwLock<HashMap<(TimeseriesId, DataState), AssociationId>>,
    next_association: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(BTreeMap::new()),
            associations: RwLock::new(HashMap::new()),
            next_association: AtomicI64::new(1),
        }
    }

    /// Total number of stored samples, across all associations.
    pub fn len(&self) -> usize {
        self.samples.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of associations created so far.
    pub fn association_count(&self) -> usize {
        self.associations.read().map(|a| a.len()).unwrap_or(0)
    }

    fn bounds(association: AssociationId, window: &TimeWindow) -> (Bound<SampleKey>, Bound<SampleKey>) {
        let lower = match window.start {
            None => Bound::Included((association, DateTime::<Utc>::MIN_UTC)),
            Some(start) if window.inclusive.includes_start() => Bound::Included((association, start)),
            Some(start) => Bound::Excluded((association, start)),
        };
        let upper = match window.end {
            None => Bound::Included((association, DateTime::<Utc>::MAX_UTC)),
            Some(end) if window.inclusive.includes_end() => Bound::Included((association, end)),
            Some(end) => Bound::Excluded((association, end)),
        };
        (lower, upper)
    }

    fn scan(
        &self,
        association: AssociationId,
        window: &TimeWindow,
    ) -> Result<Vec<Sample>, StoreError> {
        let samples = self.samples.read().map_err(|_| StoreError::Poisoned)?;
        let empty = window
            .start
            .zip(window.end)
            .is_some_and(|(s, e)| s > e || (s == e && window.inclusive != Inclusive::Both));
        if empty {
            return Ok(Vec::new());
        }
        Ok(samples
            .range(Self::bounds(association, window))
            .map(|((association, timestamp), value)| Sample {
                association: *association,
                timestamp: *timestamp,
                value: *value,
            })
            .collect())
    }
}

impl SampleStore for MemoryStore {
    fn find_association(
        &self,
        timeseries: TimeseriesId,
        state: DataState,
    ) -> Result<Option<AssociationId>, StoreError> {
        let associations = self.associations.read().map_err(|_| StoreError::Poisoned)?;
        Ok(associations.get(&(timeseries, state)).copied())
    }

    fn create_association(
        &self,
        timeseries: TimeseriesId,
        state: DataState,
    ) -> Result<AssociationId, StoreError> {
        let mut associations = self.associations.write().map_err(|_| StoreError::Poisoned)?;
        if associations.contains_key(&(timeseries, state)) {
            return Err(StoreError::UniqueViolation { timeseries, state });
        }
        let id = AssociationId(self.next_association.fetch_add(1, Ordering::SeqCst));
        associations.insert((timeseries, state), id);
        debug!("Created association {:?} for timeseries {} ({})", id, timeseries, state);
        Ok(id)
    }

    fn insert_or_ignore(&self, batch: &[Sample]) -> Result<usize, StoreError> {
        let mut samples = self.samples.write().map_err(|_| StoreError::Poisoned)?;
        let mut inserted = 0;
        for sample in batch {
            samples
                .entry((sample.association, sample.timestamp))
                .or_insert_with(|| {
                    inserted += 1;
                    sample.value
                });
        }
        Ok(inserted)
    }

    fn read_range(
        &self,
        associations: &[AssociationId],
        window: &TimeWindow,
    ) -> Result<Vec<Sample>, StoreError> {
        let mut out = Vec::new();
        for association in associations {
            out.extend(self.scan(*association, window)?);
        }
        Ok(out)
    }

    fn delete_range(
        &self,
        association: AssociationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        if start >= end {
            return Ok(0);
        }
        let mut samples = self.samples.write().map_err(|_| StoreError::Poisoned)?;
        let doomed: Vec<SampleKey> = samples
            .range((association, start)..(association, end))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            samples.remove(key);
        }
        Ok(doomed.len())
    }

    fn last_in(
        &self,
        association: AssociationId,
        window: &TimeWindow,
    ) -> Result<Option<Sample>, StoreError> {
        Ok(self.scan(association, window)?.pop())
    }

    fn first_in(
        &self,
        association: AssociationId,
        window: &TimeWindow,
    ) -> Result<Option<Sample>, StoreError> {
        Ok(self.scan(association, window)?.into_iter().next())
    }

    fn aggregate(
        &self,
        associations: &[AssociationId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: PeriodUnit,
        tz: Tz,
        aggregation: Aggregation,
    ) -> Result<Vec<AggregateRow>, StoreError> {
        let window = TimeWindow::half_open(start, end);
        let mut rows = Vec::new();
        for association in associations {
            let mut buckets: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
            for sample in self.scan(*association, &window)? {
                let bucket = calendar::floor(&sample.timestamp.with_timezone(&tz), unit, 1)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                buckets
                    .entry(bucket.with_timezone(&Utc))
                    .or_default()
                    .push(sample.value);
            }
            rows.extend(buckets.into_iter().map(|(bucket, values)| AggregateRow {
                association: *association,
                bucket,
                value: reduce(aggregation, &values),
            }));
        }
        Ok(rows)
    }
}

/// Folds a non-empty group of values with `aggregation`.
pub(crate) fn reduce(aggregation: Aggregation, values: &[f64]) -> f64 {
    match aggregation {
        Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Aggregation::Sum => values.iter().sum(),
        Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Count => values.len() as f64,
    }
}
