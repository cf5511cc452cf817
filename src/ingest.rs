//! Ingestion and deletion.
//!
//! Writes run through a fixed pipeline:
//!
//! 1. parse column labels as ids (no scope) or names (scoped)
//! 2. resolve every label, reporting all unknown ones at once
//! 3. authorize a write on every timeseries
//! 4. prepare conversions from the caller's units into each native unit
//! 5. get or create the associations
//! 6. flatten to samples, dropping nulls
//! 7. insert the whole batch with insert-or-ignore semantics
//!
//! Steps 1 to 4 never touch the store, so a rejected write leaves no trace. Because
//! existing `(association, timestamp)` pairs are ignored, replaying the same input is
//! harmless.

use crate::auth::{Action, Actor};
use crate::engine::Engine;
use crate::error::{Result, TimeseriesError};
use crate::frame::{Column, TimeFrame};
use crate::model::{DataState, IdentityKind, Sample, ScopeId, TimeseriesKey};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Outcome of one ingestion call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Rows of the input table.
    pub rows: usize,
    /// Non-null cells, i.e. samples offered to the store.
    pub samples: usize,
    /// Samples actually written.
    pub inserted: usize,
    /// Samples skipped because their timestamp was already stored.
    pub ignored: usize,
}

/// A range delete over `[start, end)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub identities: Vec<TimeseriesKey>,
    pub scope: Option<ScopeId>,
    pub state: DataState,
}

impl DeleteRequest {
    pub fn new<K: Into<TimeseriesKey>>(
        identities: impl IntoIterator<Item = K>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            start,
            end,
            identities: identities.into_iter().map(Into::into).collect(),
            scope: None,
            state: DataState::Raw,
        }
    }

    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_state(mut self, state: DataState) -> Self {
        self.state = state;
        self
    }
}

/// Write side of the engine.
#[derive(Clone, Debug)]
pub struct Ingestor {
    engine: Engine,
}

impl Engine {
    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.clone())
    }
}

impl Ingestor {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Writes every non-null cell of `frame`.
    ///
    /// Columns named in `convert_from` are interpreted in that unit and converted to the
    /// timeseries' native unit before writing. An empty or all-null frame is a no-op.
    ///
    /// # Errors
    ///
    /// - [`TimeseriesError::InvalidIdentityType`] for an id label that is not an integer
    /// - [`TimeseriesError::UnknownIdentity`] listing every unresolved label
    /// - authorization and unit errors, raised before any store access
    /// - [`TimeseriesError::Write`] when the batch insert fails
    pub fn set(
        &self,
        actor: &Actor,
        frame: &TimeFrame,
        state: DataState,
        scope: Option<ScopeId>,
        convert_from: &HashMap<String, String>,
    ) -> Result<IngestReport> {
        if frame.is_empty() || frame.is_all_null() {
            debug!("set: nothing to write");
            return Ok(IngestReport {
                rows: frame.len(),
                ..IngestReport::default()
            });
        }

        let kind = IdentityKind::for_scope(scope);
        let keys = frame
            .labels()
            .into_iter()
            .map(|label| TimeseriesKey::parse(label, kind))
            .collect::<Result<Vec<_>>>()?;
        let series = self.engine.authorized(actor, Action::Write, &keys, scope)?;

        let units = self.engine.units();
        let mut converters = Vec::with_capacity(keys.len());
        for (key, column) in keys.iter().zip(frame.columns()) {
            let Some(timeseries) = series.iter().find(|t| key_matches(key, t)) else {
                return Err(TimeseriesError::UnknownIdentity {
                    labels: vec![column.label.clone()],
                });
            };
            let converter = match convert_from.get(&column.label) {
                Some(from) => {
                    Some(units.converter(from, timeseries.unit.as_deref().unwrap_or(""))?)
                }
                None => None,
            };
            converters.push((timeseries, converter));
        }

        let mut batch = Vec::new();
        for ((timeseries, converter), column) in converters.iter().zip(frame.columns()) {
            let association = self.engine.association(timeseries, state)?;
            for (instant, value) in frame.index().iter().zip(&column.values) {
                let Some(value) = value.filter(|v| !v.is_nan()) else {
                    continue;
                };
                batch.push(Sample {
                    association,
                    timestamp: instant.with_timezone(&Utc),
                    value: converter.map_or(value, |c| c.apply(value)),
                });
            }
        }

        let samples = batch.len();
        let inserted = self
            .engine
            .store()
            .insert_or_ignore(&batch)
            .map_err(|source| TimeseriesError::Write { samples, source })?;
        let report = IngestReport {
            rows: frame.len(),
            samples,
            inserted,
            ignored: samples - inserted,
        };
        info!(
            "Ingested {} samples for {} timeseries ({}): {} new, {} already stored",
            report.samples,
            series.len(),
            state,
            report.inserted,
            report.ignored
        );
        Ok(report)
    }

    /// Writes long-format `(identity, timestamp, value)` rows.
    ///
    /// The rows are reshaped into a table whose columns are the identities in first-seen
    /// order, then passed to [`Ingestor::set`].
    pub fn set_samples(
        &self,
        actor: &Actor,
        rows: &[(TimeseriesKey, DateTime<Utc>, f64)],
        state: DataState,
        scope: Option<ScopeId>,
    ) -> Result<IngestReport> {
        let frame = long_to_frame(rows)?;
        self.set(actor, &frame, state, scope, &HashMap::new())
    }

    /// Removes the samples of every identity in `[start, end)`.
    ///
    /// All identities are resolved and authorized before anything is deleted.
    /// Identities that were never written to are skipped. Returns the number of samples
    /// removed.
    pub fn delete(&self, actor: &Actor, request: &DeleteRequest) -> Result<usize> {
        let series =
            self.engine
                .authorized(actor, Action::Write, &request.identities, request.scope)?;
        let mut removed = 0;
        for timeseries in &series {
            if let Some(association) = self.engine.existing_association(timeseries, request.state)? {
                removed += self
                    .engine
                    .store()
                    .delete_range(association, request.start, request.end)?;
            }
        }
        info!(
            "Deleted {} samples of {} timeseries ({}) in [{}, {})",
            removed,
            series.len(),
            request.state,
            request.start,
            request.end
        );
        Ok(removed)
    }
}

fn key_matches(key: &TimeseriesKey, timeseries: &crate::model::Timeseries) -> bool {
    match key {
        TimeseriesKey::Id(id) => *id == timeseries.id,
        TimeseriesKey::Name(name) => *name == timeseries.name,
    }
}

fn long_to_frame(rows: &[(TimeseriesKey, DateTime<Utc>, f64)]) -> Result<TimeFrame> {
    let instants: BTreeSet<DateTime<Utc>> = rows.iter().map(|(_, t, _)| *t).collect();
    let position: HashMap<DateTime<Utc>, usize> =
        instants.iter().enumerate().map(|(i, t)| (*t, i)).collect();

    let mut columns: Vec<Column> = Vec::new();
    for (key, instant, value) in rows {
        let label = key.label();
        let index = match columns.iter().position(|c| c.label == label) {
            Some(index) => index,
            None => {
                columns.push(Column::nulls(label, instants.len()));
                columns.len() - 1
            }
        };
        columns[index].values[position[instant]] = Some(*value);
    }

    let index = instants.iter().map(|t| t.with_timezone(&Tz::UTC)).collect();
    TimeFrame::from_columns(index, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AllowAll, StaticPolicy};
    use crate::calendar::PeriodUnit;
    use crate::identity::TimeseriesCatalog;
    use crate::model::{Aggregation, AssociationId, Timeseries, TimeseriesId, TimeWindow};
    use crate::store::{AggregateRow, MemoryStore, SampleStore, StoreError};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    fn catalog() -> TimeseriesCatalog {
        TimeseriesCatalog::new()
            .with([
                Timeseries::new(1, "power").with_unit("kW"),
                Timeseries::new(2, "energy").with_unit("kWh"),
                Timeseries::new(3, "boiler").with_scope(ScopeId(7)).with_unit("degC"),
            ])
            .unwrap()
    }

    fn engine_with(store: Arc<dyn SampleStore>) -> Engine {
        Engine::builder(store, Arc::new(catalog()), Arc::new(AllowAll))
            .build()
            .unwrap()
    }

    fn hourly_frame(labels: &[&str], hours: i64) -> TimeFrame {
        let index = (0..hours)
            .map(|h| (t0() + Duration::hours(h)).with_timezone(&Tz::UTC))
            .collect();
        let columns = labels
            .iter()
            .map(|l| Column::new(*l, (0..hours).map(|h| Some(h as f64)).collect()))
            .collect();
        TimeFrame::from_columns(index, columns).unwrap()
    }

    #[test]
    #[traced_test]
    fn test_set_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = engine_with(store.clone()).ingestor();
        let frame = hourly_frame(&["1", "2"], 24);
        let actor = Actor::new("writer");

        let first = ingestor
            .set(&actor, &frame, DataState::Raw, None, &HashMap::new())
            .unwrap();
        assert_eq!(first.samples, 48);
        assert_eq!(first.inserted, 48);
        assert!(logs_contain("Ingested 48 samples"));

        let second = ingestor
            .set(&actor, &frame, DataState::Raw, None, &HashMap::new())
            .unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.ignored, 48);
        assert_eq!(store.len(), 48);
    }

    #[test]
    fn test_set_drops_nulls_and_converts() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = engine_with(store.clone()).ingestor();
        let index = vec![t0().with_timezone(&Tz::UTC), (t0() + Duration::hours(1)).with_timezone(&Tz::UTC)];
        let frame = TimeFrame::from_columns(index, vec![Column::new("1", vec![Some(1500.0), None])])
            .unwrap();
        let convert: HashMap<String, String> = [("1".to_string(), "W".to_string())].into();

        let report = ingestor
            .set(&Actor::new("w"), &frame, DataState::Clean, None, &convert)
            .unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.samples, 1);

        let association = store
            .find_association(TimeseriesId(1), DataState::Clean)
            .unwrap()
            .unwrap();
        let stored = store.read_range(&[association], &TimeWindow::unbounded()).unwrap();
        assert_eq!(stored[0].value, 1.5);
    }

    #[test]
    fn test_set_scoped_names() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = engine_with(store.clone()).ingestor();
        let frame = hourly_frame(&["boiler"], 3);
        let report = ingestor
            .set(&Actor::new("w"), &frame, DataState::Raw, Some(ScopeId(7)), &HashMap::new())
            .unwrap();
        assert_eq!(report.inserted, 3);

        // a name label without a scope is not an id
        let err = ingestor
            .set(&Actor::new("w"), &frame, DataState::Raw, None, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, TimeseriesError::InvalidIdentityType { .. }));
    }

    #[test]
    fn test_set_rejects_before_store_access() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = engine_with(store.clone()).ingestor();

        let unknown = hourly_frame(&["1", "41", "42"], 2);
        match ingestor
            .set(&Actor::new("w"), &unknown, DataState::Raw, None, &HashMap::new())
            .unwrap_err()
        {
            TimeseriesError::UnknownIdentity { labels } => assert_eq!(labels, vec!["41", "42"]),
            other => panic!("unexpected error: {other}"),
        }

        let frame = hourly_frame(&["1"], 2);
        let wrong_unit: HashMap<String, String> = [("1".to_string(), "m".to_string())].into();
        let err = ingestor
            .set(&Actor::new("w"), &frame, DataState::Raw, None, &wrong_unit)
            .unwrap_err();
        assert!(matches!(err, TimeseriesError::Dimensionality { .. }));

        let policy = StaticPolicy::new().grant_all("w", Action::Read);
        let read_only = Engine::builder(store.clone(), Arc::new(catalog()), Arc::new(policy))
            .build()
            .unwrap()
            .ingestor();
        let err = read_only
            .set(&Actor::new("w"), &frame, DataState::Raw, None, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, TimeseriesError::Authorization(_)));

        assert!(store.is_empty());
        assert_eq!(store.association_count(), 0);
    }

    #[test]
    fn test_empty_frame_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = engine_with(store.clone()).ingestor();
        let frame = TimeFrame::from_columns(
            vec![t0().with_timezone(&Tz::UTC)],
            vec![Column::nulls("999", 1)],
        )
        .unwrap();
        let report = ingestor
            .set(&Actor::new("w"), &frame, DataState::Raw, None, &HashMap::new())
            .unwrap();
        assert_eq!(report.samples, 0);
        assert_eq!(store.association_count(), 0);
    }

    #[test]
    fn test_set_samples_long_format() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = engine_with(store.clone()).ingestor();
        let rows = vec![
            (TimeseriesKey::Id(TimeseriesId(2)), t0() + Duration::hours(1), 5.0),
            (TimeseriesKey::Id(TimeseriesId(1)), t0(), 1.0),
            (TimeseriesKey::Id(TimeseriesId(2)), t0(), 4.0),
        ];
        let report = ingestor
            .set_samples(&Actor::new("w"), &rows, DataState::Raw, None)
            .unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.samples, 3);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_delete_range() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = engine_with(store.clone()).ingestor();
        let actor = Actor::new("w");
        ingestor
            .set(&actor, &hourly_frame(&["1", "2"], 10), DataState::Raw, None, &HashMap::new())
            .unwrap();

        let request = DeleteRequest::new(
            [TimeseriesId(1), TimeseriesId(3)],
            t0() + Duration::hours(2),
            t0() + Duration::hours(5),
        );
        assert_eq!(ingestor.delete(&actor, &request).unwrap(), 3);
        assert_eq!(store.len(), 17);

        let unknown = DeleteRequest::new([TimeseriesId(1), TimeseriesId(77)], t0(), t0() + Duration::days(1));
        assert!(ingestor.delete(&actor, &unknown).is_err());
        assert_eq!(store.len(), 17);
    }

    /// Fails every insert.
    struct BrokenStore(MemoryStore);

    impl SampleStore for BrokenStore {
        fn find_association(
            &self,
            timeseries: TimeseriesId,
            state: DataState,
        ) -> std::result::Result<Option<AssociationId>, StoreError> {
            self.0.find_association(timeseries, state)
        }

        fn create_association(
            &self,
            timeseries: TimeseriesId,
            state: DataState,
        ) -> std::result::Result<AssociationId, StoreError> {
            self.0.create_association(timeseries, state)
        }

        fn insert_or_ignore(&self, _: &[Sample]) -> std::result::Result<usize, StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }

        fn read_range(
            &self,
            associations: &[AssociationId],
            window: &TimeWindow,
        ) -> std::result::Result<Vec<Sample>, StoreError> {
            self.0.read_range(associations, window)
        }

        fn delete_range(
            &self,
            association: AssociationId,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> std::result::Result<usize, StoreError> {
            self.0.delete_range(association, start, end)
        }

        fn last_in(
            &self,
            association: AssociationId,
            window: &TimeWindow,
        ) -> std::result::Result<Option<Sample>, StoreError> {
            self.0.last_in(association, window)
        }

        fn first_in(
            &self,
            association: AssociationId,
            window: &TimeWindow,
        ) -> std::result::Result<Option<Sample>, StoreError> {
            self.0.first_in(association, window)
        }

        fn aggregate(
            &self,
            associations: &[AssociationId],
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            unit: PeriodUnit,
            tz: Tz,
            aggregation: Aggregation,
        ) -> std::result::Result<Vec<AggregateRow>, StoreError> {
            self.0.aggregate(associations, start, end, unit, tz, aggregation)
        }
    }

    #[test]
    fn test_store_failure_is_write_error() {
        let ingestor = engine_with(Arc::new(BrokenStore(MemoryStore::new()))).ingestor();
        let err = ingestor
            .set(&Actor::new("w"), &hourly_frame(&["1"], 4), DataState::Raw, None, &HashMap::new())
            .unwrap_err();
        match err {
            TimeseriesError::Write { samples, .. } => assert_eq!(samples, 4),
            other => panic!("unexpected error: {other}"),
        }
    }
}
