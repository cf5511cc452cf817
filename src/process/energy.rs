//! Power and energy conversions on a bucket grid.
//!
//! Both directions work on the forward-filled step function produced by gap-fill, so a
//! value holds until the next sample and never propagates backward.
//!
//! - [`power_to_energy`] integrates power over each bucket (left rectangle rule).
//! - [`energy_to_power`] turns cumulative meter readings into mean power per bucket.

use super::gapfill::{forward_fill, load, GapFillRequest, Grid, Loaded};
use crate::auth::{Action, Actor};
use crate::engine::Engine;
use crate::error::Result;
use crate::frame::{Column, TimeFrame};
use crate::model::{Inclusive, TimeWindow, Timeseries};
use crate::units::Converter;
use chrono::{DateTime, Utc};
use tracing::debug;

const SECONDS_PER_HOUR: f64 = 3_600.0;

fn hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1_000.0 / SECONDS_PER_HOUR
}

/// Prepares one converter per identity, from `source(native unit)` into `target`.
fn converters(
    engine: &Engine,
    series: &[Timeseries],
    source: impl Fn(Option<&str>) -> String,
    target: &str,
) -> Result<Vec<Converter>> {
    series
        .iter()
        .map(|t| engine.units().converter(&source(t.unit.as_deref()), target))
        .collect()
}

fn empty(series: &[Timeseries], request: &GapFillRequest) -> Result<TimeFrame> {
    let columns = series
        .iter()
        .map(|t| Column::new(t.label(request.label_mode), Vec::new()))
        .collect();
    TimeFrame::from_columns(Vec::new(), columns)
}

/// Energy per bucket of a power series, in `energy_unit`.
///
/// Within a bucket the power holds its last known value until the next sample, and
/// each piece contributes `power × duration` in hours. A bucket containing any instant
/// with no known power yet is null. The native unit is multiplied by hours before
/// conversion, so `kW` integrates into `kW*h` and converts to e.g. `kWh` or `MJ`.
///
/// # Errors
///
/// Identity, authorization, unit and dimensionality errors are raised before any
/// samples are read.
pub fn power_to_energy(
    engine: &Engine,
    actor: &Actor,
    request: &GapFillRequest,
    energy_unit: &str,
) -> Result<TimeFrame> {
    let grid = Grid::new(engine, request)?;
    let series = engine.authorized(actor, Action::Read, &request.identities, request.scope)?;
    let converters = converters(
        engine,
        &series,
        |unit| match unit {
            Some(unit) if !unit.trim().is_empty() => match unit.split_once('/') {
                Some((numerator, denominator)) => format!("{numerator}*h/{denominator}"),
                None => format!("{unit}*h"),
            },
            _ => "h".to_string(),
        },
        energy_unit,
    )?;
    let (Some(start), Some(closing)) = (grid.start(), grid.closing) else {
        return empty(&series, request);
    };
    let closing = closing.with_timezone(&Utc);

    let window = TimeWindow {
        start: Some(start),
        end: Some(closing),
        inclusive: Inclusive::Left,
    };
    let loaded = load(engine, series, request, &window)?;
    let mut edges = grid.instants();
    edges.push(closing);

    let mut columns = Vec::with_capacity(loaded.len());
    for (series, converter) in loaded.iter().zip(&converters) {
        let values = edges
            .windows(2)
            .map(|bucket| integrate(series, bucket[0], bucket[1]).map(|e| converter.apply(e)))
            .collect();
        columns.push(Column::new(series.label.clone(), values));
    }
    debug!(
        "power_to_energy: {} identities over {} buckets into {}",
        columns.len(),
        edges.len() - 1,
        energy_unit
    );
    TimeFrame::from_columns(grid.boundaries, columns)
}

/// Left-rectangle integral of the step function over `[from, to)`.
fn integrate(series: &Loaded, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
    let mut breaks = vec![from];
    breaks.extend(series.points.range(from..to).map(|(t, _)| *t).filter(|t| *t > from));
    let levels = forward_fill(&series.points, series.carry_in, &breaks);
    breaks.push(to);

    let mut total = 0.0;
    for (level, piece) in levels.into_iter().zip(breaks.windows(2)) {
        total += level? * hours(piece[0], piece[1]);
    }
    Some(total)
}

/// Mean power per bucket of a cumulative energy meter, in `power_unit`.
///
/// The meter reading at each boundary is the last reading at or before it. The power
/// of a bucket is the reading delta divided by the bucket duration in hours; a bucket
/// whose delta is negative (a meter reset) or whose readings are unknown is null.
///
/// # Errors
///
/// Identity, authorization, unit and dimensionality errors are raised before any
/// samples are read.
pub fn energy_to_power(
    engine: &Engine,
    actor: &Actor,
    request: &GapFillRequest,
    power_unit: &str,
) -> Result<TimeFrame> {
    let grid = Grid::new(engine, request)?;
    let series = engine.authorized(actor, Action::Read, &request.identities, request.scope)?;
    let converters = converters(
        engine,
        &series,
        |unit| match unit {
            Some(unit) if !unit.trim().is_empty() => format!("{unit}/h"),
            _ => "1/h".to_string(),
        },
        power_unit,
    )?;
    let (Some(start), Some(closing)) = (grid.start(), grid.closing) else {
        return empty(&series, request);
    };
    let closing = closing.with_timezone(&Utc);

    let window = TimeWindow {
        start: Some(start),
        end: Some(closing),
        inclusive: Inclusive::Both,
    };
    let loaded = load(engine, series, request, &window)?;
    let mut edges = grid.instants();
    edges.push(closing);

    let mut columns = Vec::with_capacity(loaded.len());
    for (series, converter) in loaded.iter().zip(&converters) {
        let readings = forward_fill(&series.points, series.carry_in, &edges);
        let values = readings
            .windows(2)
            .zip(edges.windows(2))
            .map(|(pair, bucket)| match (pair[0], pair[1]) {
                (Some(from), Some(to)) if to >= from => {
                    Some(converter.apply((to - from) / hours(bucket[0], bucket[1])))
                }
                _ => None,
            })
            .collect();
        columns.push(Column::new(series.label.clone(), values));
    }
    debug!(
        "energy_to_power: {} identities over {} buckets into {}",
        columns.len(),
        edges.len() - 1,
        power_unit
    );
    TimeFrame::from_columns(grid.boundaries, columns)
}
