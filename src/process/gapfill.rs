//! Gap-fill.
//!
//! Produces a dense series on a bucket grid by forward-filling raw samples. The value
//! at any instant is the most recent sample at or before it, starting from the last
//! sample before the window (the carry-in). Values never propagate backward, and each
//! identity is filled independently of the others.

use crate::auth::{Action, Actor};
use crate::calendar::{self, PeriodUnit};
use crate::engine::Engine;
use crate::error::{Result, TimeseriesError};
use crate::frame::{Column, TimeFrame};
use crate::model::{
    DataState, Inclusive, LabelMode, ScopeId, TimeWindow, Timeseries, TimeseriesKey,
};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A gap-fill (or derived process) over `[start, end)` on a `width × unit` grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GapFillRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub width: i64,
    pub unit: PeriodUnit,
    pub identities: Vec<TimeseriesKey>,
    pub scope: Option<ScopeId>,
    pub state: DataState,
    pub timezone: Option<Tz>,
    pub label_mode: LabelMode,
}

impl GapFillRequest {
    /// An hourly grid over `[start, end)`.
    pub fn new<K, A, B>(
        identities: impl IntoIterator<Item = K>,
        start: DateTime<A>,
        end: DateTime<B>,
    ) -> Self
    where
        K: Into<TimeseriesKey>,
        A: TimeZone,
        B: TimeZone,
    {
        Self {
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
            width: 1,
            unit: PeriodUnit::Hour,
            identities: identities.into_iter().map(Into::into).collect(),
            scope: None,
            state: DataState::Raw,
            timezone: None,
            label_mode: LabelMode::Id,
        }
    }

    pub fn every(mut self, width: i64, unit: PeriodUnit) -> Self {
        self.width = width;
        self.unit = unit;
        self
    }

    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_state(mut self, state: DataState) -> Self {
        self.state = state;
        self
    }

    pub fn in_timezone(mut self, tz: Tz) -> Self {
        self.timezone = Some(tz);
        self
    }

    pub fn label_by(mut self, mode: LabelMode) -> Self {
        self.label_mode = mode;
        self
    }
}

/// The bucket grid of a request, with the boundary closing its last bucket.
pub(crate) struct Grid {
    pub(crate) tz: Tz,
    pub(crate) boundaries: Vec<DateTime<Tz>>,
    pub(crate) closing: Option<DateTime<Tz>>,
}

impl Grid {
    pub(crate) fn new(engine: &Engine, request: &GapFillRequest) -> Result<Self> {
        if request.width < 1 {
            return Err(TimeseriesError::InvalidBucketWidth {
                width: request.width,
            });
        }
        let tz = engine.timezone(request.timezone);
        let boundaries =
            calendar::boundary_sequence(request.start, request.end, request.width, request.unit, tz)?;
        let closing = match boundaries.last() {
            Some(last) => Some(calendar::step(last, request.unit, request.width)?),
            None => None,
        };
        Ok(Self {
            tz,
            boundaries,
            closing,
        })
    }

    pub(crate) fn start(&self) -> Option<DateTime<Utc>> {
        self.boundaries.first().map(|b| b.with_timezone(&Utc))
    }

    pub(crate) fn instants(&self) -> Vec<DateTime<Utc>> {
        self.boundaries.iter().map(|b| b.with_timezone(&Utc)).collect()
    }
}

/// Samples of one identity: the carry-in value and the samples inside the window.
pub(crate) struct Loaded {
    pub(crate) label: String,
    pub(crate) carry_in: Option<f64>,
    pub(crate) points: BTreeMap<DateTime<Utc>, f64>,
}

/// Loads every resolved identity of `request` over `window`.
///
/// The carry-in is the last sample strictly before `window.start`.
pub(crate) fn load(
    engine: &Engine,
    series: Vec<Timeseries>,
    request: &GapFillRequest,
    window: &TimeWindow,
) -> Result<Vec<Loaded>> {
    let mut loaded = Vec::with_capacity(series.len());
    for timeseries in series {
        let mut carry_in = None;
        let mut points = BTreeMap::new();
        if let Some(association) = engine.existing_association(&timeseries, request.state)? {
            if let Some(start) = window.start {
                carry_in = engine
                    .store()
                    .last_before(association, start)?
                    .map(|s| s.value);
            }
            points = engine
                .store()
                .read_range(&[association], window)?
                .into_iter()
                .map(|s| (s.timestamp, s.value))
                .collect();
        }
        loaded.push(Loaded {
            label: timeseries.label(request.label_mode),
            carry_in,
            points,
        });
    }
    Ok(loaded)
}

/// The last known value at or before each instant.
pub(crate) fn forward_fill(
    points: &BTreeMap<DateTime<Utc>, f64>,
    carry_in: Option<f64>,
    instants: &[DateTime<Utc>],
) -> Vec<Option<f64>> {
    instants
        .iter()
        .map(|t| {
            points
                .range(..=*t)
                .next_back()
                .map(|(_, v)| *v)
                .or(carry_in)
        })
        .collect()
}

/// Dense, forward-filled series on the request grid.
///
/// Rows are the union of the grid boundaries and the raw sample instants inside the
/// window. Leading rows where no identity has a known value yet are dropped; the carry-in
/// sample itself is not part of the output.
pub fn gap_fill(engine: &Engine, actor: &Actor, request: &GapFillRequest) -> Result<TimeFrame> {
    let grid = Grid::new(engine, request)?;
    let series = engine.authorized(actor, Action::Read, &request.identities, request.scope)?;
    let Some(start) = grid.start() else {
        let columns = series
            .iter()
            .map(|t| Column::new(t.label(request.label_mode), Vec::new()))
            .collect();
        return TimeFrame::from_columns(Vec::new(), columns);
    };

    let window = TimeWindow {
        start: Some(start),
        end: Some(request.end),
        inclusive: Inclusive::Left,
    };
    let loaded = load(engine, series, request, &window)?;

    let mut instants: BTreeSet<DateTime<Utc>> = grid.instants().into_iter().collect();
    for series in &loaded {
        instants.extend(series.points.keys().copied());
    }
    let instants: Vec<DateTime<Utc>> = instants.into_iter().collect();

    let columns = loaded
        .iter()
        .map(|s| Column::new(s.label.clone(), forward_fill(&s.points, s.carry_in, &instants)))
        .collect();
    let index = instants.iter().map(|t| t.with_timezone(&grid.tz)).collect();
    let mut frame = TimeFrame::from_columns(index, columns)?;

    let first_known = (0..frame.len()).find(|row| frame.row(*row).iter().any(Option::is_some));
    let first_known = first_known.unwrap_or(frame.len());
    frame.retain_rows(|row| row >= first_known);

    debug!(
        "gap_fill: {} identities, {} rows from {} boundaries",
        loaded.len(),
        frame.len(),
        grid.boundaries.len()
    );
    Ok(frame)
}
