mod common;

use chrono::Duration;
use common::{actor, engine, utc, write_hourly};
use ems_timeseries::calendar::PeriodUnit;
use ems_timeseries::engine::BucketRequest;
use ems_timeseries::model::{DataState, TimeseriesId};
use ems_timeseries::process::{self, GapFillRequest};
use std::collections::HashMap;

#[test]
fn test_gap_fill_never_looks_backward() {
    let (engine, _) = engine();
    let ingestor = engine.ingestor();
    ingestor
        .set(
            &actor(),
            &common::frame("1", &[(utc(2020, 1, 1, 1, 30), 5.0)]),
            DataState::Raw,
            None,
            &HashMap::new(),
        )
        .unwrap();
    ingestor
        .set(
            &actor(),
            &common::frame("2", &[(utc(2019, 12, 31, 22, 0), 18.0), (utc(2020, 1, 1, 2, 0), 19.0)]),
            DataState::Raw,
            None,
            &HashMap::new(),
        )
        .unwrap();

    let request = GapFillRequest::new(
        [TimeseriesId(1), TimeseriesId(2)],
        utc(2020, 1, 1, 0, 0),
        utc(2020, 1, 1, 3, 0),
    );
    let frame = process::gap_fill(&engine, &actor(), &request).unwrap();

    // grid 00:00, 01:00, 02:00 plus the raw sample at 01:30
    assert_eq!(frame.len(), 4);
    assert_eq!(
        frame.column("1").unwrap().values,
        vec![None, None, Some(5.0), Some(5.0)]
    );
    // the carry-in fills the start of series 2 even though series 1 is still unknown
    assert_eq!(
        frame.column("2").unwrap().values,
        vec![Some(18.0), Some(18.0), Some(18.0), Some(19.0)]
    );
}

#[test]
fn test_gap_fill_drops_leading_unknown_rows() {
    let (engine, _) = engine();
    engine
        .ingestor()
        .set(
            &actor(),
            &common::frame("1", &[(utc(2020, 1, 1, 1, 0), 5.0)]),
            DataState::Raw,
            None,
            &HashMap::new(),
        )
        .unwrap();

    let request = GapFillRequest::new([TimeseriesId(1)], utc(2020, 1, 1, 0, 0), utc(2020, 1, 1, 4, 0));
    let frame = process::gap_fill(&engine, &actor(), &request).unwrap();
    assert_eq!(frame.index()[0], utc(2020, 1, 1, 1, 0));
    assert_eq!(frame.column("1").unwrap().values, vec![Some(5.0); 3]);
}

#[test]
fn test_power_and_energy() {
    let (engine, _) = engine();
    write_hourly(&engine, "1", utc(2020, 1, 1, 0, 0), 24, |_| 2.0);
    write_hourly(&engine, "3", utc(2020, 1, 1, 0, 0), 25, |h| 10.0 * h as f64);

    let request = GapFillRequest::new([TimeseriesId(1)], utc(2020, 1, 1, 0, 0), utc(2020, 1, 2, 0, 0))
        .every(6, PeriodUnit::Hour);
    let energy = process::power_to_energy(&engine, &actor(), &request, "kWh").unwrap();
    assert_eq!(energy.column("1").unwrap().values, vec![Some(12.0); 4]);

    let request = GapFillRequest::new([TimeseriesId(3)], utc(2020, 1, 1, 0, 0), utc(2020, 1, 2, 0, 0))
        .every(1, PeriodUnit::Day);
    let power = process::energy_to_power(&engine, &actor(), &request, "kW").unwrap();
    assert_eq!(power.column("3").unwrap().values, vec![Some(10.0)]);
}

#[test]
fn test_completeness_without_interval_or_samples_is_null() {
    let (engine, _) = engine();
    let request = BucketRequest::new([TimeseriesId(4)], utc(2020, 1, 1, 0, 0), utc(2020, 1, 2, 0, 0));
    let report = process::completeness(&engine, &actor(), &request).unwrap();

    assert_eq!(report.ratios.len(), 24);
    assert!(report.ratios.column("4").unwrap().is_all_null());
    assert_eq!(report.summary[0].interval, None);
    assert_eq!(report.summary[0].mean, None);
}

#[test]
fn test_completeness_with_missing_hours() {
    let (engine, _) = engine();
    let points: Vec<_> = (0..12)
        .filter(|i| i % 4 != 3)
        .map(|i| (utc(2020, 1, 1, 0, 0) + Duration::minutes(15 * i), 1.0))
        .collect();
    engine
        .ingestor()
        .set(&actor(), &common::frame("4", &points), DataState::Raw, None, &HashMap::new())
        .unwrap();

    let request = BucketRequest::new([TimeseriesId(4)], utc(2020, 1, 1, 0, 0), utc(2020, 1, 1, 3, 0));
    let report = process::completeness(&engine, &actor(), &request).unwrap();

    // three samples per hour, so the inferred interval is 20 minutes
    assert_eq!(report.summary[0].interval, Some(Duration::minutes(20)));
    for ratio in &report.ratios.column("4").unwrap().values {
        assert!((ratio.unwrap() - 1.0).abs() < 1e-9);
    }
}
