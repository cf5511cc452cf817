mod common;

use common::{actor, engine, frame, utc, SITE};
use ems_timeseries::engine::{LastRequest, RawRequest};
use ems_timeseries::ingest::DeleteRequest;
use ems_timeseries::model::{DataState, LabelMode, TimeseriesId, TimeseriesKey};
use ems_timeseries::TimeseriesError;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

#[test]
fn test_replaying_a_write_is_harmless() {
    let (engine, store) = engine();
    let input = frame(
        "1",
        &[(utc(2020, 1, 1, 0, 0), 1.0), (utc(2020, 1, 1, 1, 0), 2.0)],
    );
    let ingestor = engine.ingestor();

    let first = ingestor
        .set(&actor(), &input, DataState::Raw, None, &HashMap::new())
        .unwrap();
    assert_eq!((first.inserted, first.ignored), (2, 0));

    let second = ingestor
        .set(&actor(), &input, DataState::Raw, None, &HashMap::new())
        .unwrap();
    assert_eq!((second.inserted, second.ignored), (0, 2));
    assert_eq!(store.len(), 2);
    assert_eq!(store.association_count(), 1);
}

#[test]
fn test_existing_values_are_not_overwritten() {
    let (engine, _) = engine();
    let ingestor = engine.ingestor();
    let t = utc(2020, 1, 1, 0, 0);
    for value in [1.0, 5.0] {
        ingestor
            .set(&actor(), &frame("1", &[(t, value)]), DataState::Raw, None, &HashMap::new())
            .unwrap();
    }
    let raw = engine
        .get_raw(&actor(), &RawRequest::new([TimeseriesId(1)]))
        .unwrap();
    assert_eq!(raw.column("1").unwrap().values, vec![Some(1.0)]);
}

#[test]
fn test_scoped_names_with_unit_conversion() {
    let (engine, _) = engine();
    let convert_from = HashMap::from([("power".to_string(), "W".to_string())]);
    engine
        .ingestor()
        .set(
            &actor(),
            &frame("power", &[(utc(2020, 1, 1, 0, 0), 1_500.0)]),
            DataState::Raw,
            Some(SITE),
            &convert_from,
        )
        .unwrap();

    let last = engine
        .get_last(
            &actor(),
            &LastRequest::new([TimeseriesKey::from("power")])
                .with_scope(SITE)
                .label_by(LabelMode::Name),
        )
        .unwrap();
    assert_eq!(last[0].label, "power");
    assert_eq!(last[0].value, Some(1.5));
}

#[test]
fn test_states_are_stored_separately() {
    let (engine, _) = engine();
    let t = utc(2020, 1, 1, 0, 0);
    for (state, value) in [(DataState::Raw, 1.0), (DataState::Clean, 2.0)] {
        engine
            .ingestor()
            .set(&actor(), &frame("1", &[(t, value)]), state, None, &HashMap::new())
            .unwrap();
    }
    let clean = engine
        .get_raw(
            &actor(),
            &RawRequest::new([TimeseriesId(1)]).with_state(DataState::Clean),
        )
        .unwrap();
    assert_eq!(clean.column("1").unwrap().values, vec![Some(2.0)]);
}

#[test]
fn test_rejected_writes_leave_no_trace() {
    let (engine, store) = engine();
    let ingestor = engine.ingestor();

    let unknown = frame("42", &[(utc(2020, 1, 1, 0, 0), 1.0)]);
    assert!(matches!(
        ingestor.set(&actor(), &unknown, DataState::Raw, None, &HashMap::new()),
        Err(TimeseriesError::UnknownIdentity { .. })
    ));

    let not_an_id = frame("power", &[(utc(2020, 1, 1, 0, 0), 1.0)]);
    assert!(matches!(
        ingestor.set(&actor(), &not_an_id, DataState::Raw, None, &HashMap::new()),
        Err(TimeseriesError::InvalidIdentityType { .. })
    ));

    let bad_unit = HashMap::from([("1".to_string(), "degC".to_string())]);
    let input = frame("1", &[(utc(2020, 1, 1, 0, 0), 1.0)]);
    assert!(matches!(
        ingestor.set(&actor(), &input, DataState::Raw, None, &bad_unit),
        Err(TimeseriesError::Dimensionality { .. })
    ));

    assert_eq!(store.len(), 0);
    assert_eq!(store.association_count(), 0);
}

#[test]
fn test_delete_range() {
    let (engine, store) = engine();
    common::write_hourly(&engine, "1", utc(2020, 1, 1, 0, 0), 4, |h| h as f64);

    let removed = engine
        .ingestor()
        .delete(
            &actor(),
            &DeleteRequest::new(
                [TimeseriesId(1), TimeseriesId(4)],
                utc(2020, 1, 1, 1, 0),
                utc(2020, 1, 1, 3, 0),
            ),
        )
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_concurrent_first_writes_share_one_association() {
    let (engine, store) = engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let input = frame("3", &[(utc(2020, 1, 1, i, 0), i as f64)]);
                engine
                    .ingestor()
                    .set(&actor(), &input, DataState::Raw, None, &HashMap::new())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(store.association_count(), 1);
    assert_eq!(store.len(), 8);
}
