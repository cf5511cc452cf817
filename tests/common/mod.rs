//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ems_timeseries::auth::{Actor, AllowAll, Authorizer};
use ems_timeseries::frame::{Column, TimeFrame};
use ems_timeseries::identity::TimeseriesCatalog;
use ems_timeseries::model::{DataState, ScopeId, Timeseries};
use ems_timeseries::store::MemoryStore;
use ems_timeseries::Engine;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;

pub const SITE: ScopeId = ScopeId(10);

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
}

pub fn actor() -> Actor {
    Actor::new("integration")
}

/// The timeseries every test can use:
///
/// | id | name        | scope | unit |
/// |----|-------------|-------|------|
/// | 1  | power       | 10    | kW   |
/// | 2  | temperature | 10    | degC |
/// | 3  | meter       | 10    | kWh  |
/// | 4  | occupancy   | -     | -    |
pub fn catalog() -> TimeseriesCatalog {
    TimeseriesCatalog::new()
        .with([
            Timeseries::new(1, "power").with_scope(SITE).with_unit("kW"),
            Timeseries::new(2, "temperature").with_scope(SITE).with_unit("degC"),
            Timeseries::new(3, "meter").with_scope(SITE).with_unit("kWh"),
            Timeseries::new(4, "occupancy"),
        ])
        .unwrap()
}

pub fn engine_with(store: Arc<MemoryStore>, authorizer: Arc<dyn Authorizer>) -> Engine {
    Engine::builder(store, Arc::new(catalog()), authorizer)
        .build()
        .unwrap()
}

pub fn engine() -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (engine_with(store.clone(), Arc::new(AllowAll)), store)
}

/// A single-column frame with one value per `(instant, value)` pair.
pub fn frame(label: &str, points: &[(DateTime<Utc>, f64)]) -> TimeFrame {
    let index = points.iter().map(|(t, _)| t.with_timezone(&Tz::UTC)).collect();
    let values = points.iter().map(|(_, v)| Some(*v)).collect();
    TimeFrame::from_columns(index, vec![Column::new(label, values)]).unwrap()
}

/// Writes `value(h)` every hour for `hours` hours starting at `start`.
pub fn write_hourly(
    engine: &Engine,
    label: &str,
    start: DateTime<Utc>,
    hours: i64,
    value: impl Fn(i64) -> f64,
) {
    let points: Vec<_> = (0..hours)
        .map(|h| (start + Duration::hours(h), value(h)))
        .collect();
    engine
        .ingestor()
        .set(&actor(), &frame(label, &points), DataState::Raw, None, &HashMap::new())
        .unwrap();
}
