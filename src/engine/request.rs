//! Query request types.
//!
//! Requests are plain structs with public fields and chainable setters. Timestamps are
//! accepted in any timezone and normalized to UTC.

use crate::calendar::PeriodUnit;
use crate::model::{Aggregation, DataState, Inclusive, LabelMode, ScopeId, TimeseriesKey};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;

fn keys<K: Into<TimeseriesKey>>(identities: impl IntoIterator<Item = K>) -> Vec<TimeseriesKey> {
    identities.into_iter().map(Into::into).collect()
}

/// Setters shared by every request type.
macro_rules! selection_setters {
    ($request:ty) => {
        impl $request {
            /// Resolves names within `scope` instead of by id.
            pub fn with_scope(mut self, scope: ScopeId) -> Self {
                self.scope = Some(scope);
                self
            }

            pub fn with_state(mut self, state: DataState) -> Self {
                self.state = state;
                self
            }

            /// Localizes the result in `tz` instead of the engine default.
            pub fn in_timezone(mut self, tz: Tz) -> Self {
                self.timezone = Some(tz);
                self
            }

            pub fn label_by(mut self, mode: LabelMode) -> Self {
                self.label_mode = mode;
                self
            }
        }
    };
}

macro_rules! conversion_setter {
    ($request:ty) => {
        impl $request {
            /// Converts the column labeled `label` into `unit`.
            pub fn convert(mut self, label: impl Into<String>, unit: impl Into<String>) -> Self {
                self.convert_to.insert(label.into(), unit.into());
                self
            }
        }
    };
}

/// Raw samples in a window.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRequest {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub inclusive: Inclusive,
    pub identities: Vec<TimeseriesKey>,
    pub scope: Option<ScopeId>,
    pub state: DataState,
    pub timezone: Option<Tz>,
    pub label_mode: LabelMode,
    pub convert_to: HashMap<String, String>,
}

impl RawRequest {
    /// All samples of `identities`, unbounded on both sides.
    pub fn new<K: Into<TimeseriesKey>>(identities: impl IntoIterator<Item = K>) -> Self {
        Self {
            start: None,
            end: None,
            inclusive: Inclusive::Left,
            identities: keys(identities),
            scope: None,
            state: DataState::Raw,
            timezone: None,
            label_mode: LabelMode::Id,
            convert_to: HashMap::new(),
        }
    }

    pub fn between<A: TimeZone, B: TimeZone>(
        mut self,
        start: DateTime<A>,
        end: DateTime<B>,
    ) -> Self {
        self.start = Some(start.with_timezone(&Utc));
        self.end = Some(end.with_timezone(&Utc));
        self
    }

    pub fn since<A: TimeZone>(mut self, start: DateTime<A>) -> Self {
        self.start = Some(start.with_timezone(&Utc));
        self
    }

    pub fn until<B: TimeZone>(mut self, end: DateTime<B>) -> Self {
        self.end = Some(end.with_timezone(&Utc));
        self
    }

    pub fn with_inclusive(mut self, inclusive: Inclusive) -> Self {
        self.inclusive = inclusive;
        self
    }
}

/// Calendar-aligned aggregates.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketRequest {
    pub start: DateTime<Utc>,
    /// Exclusive.
    pub end: DateTime<Utc>,
    pub width: i64,
    pub unit: PeriodUnit,
    pub aggregation: Aggregation,
    pub identities: Vec<TimeseriesKey>,
    pub scope: Option<ScopeId>,
    pub state: DataState,
    pub timezone: Option<Tz>,
    pub label_mode: LabelMode,
    pub convert_to: HashMap<String, String>,
}

impl BucketRequest {
    /// Hourly averages of `identities` over `[start, end)`.
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
            aggregation: Aggregation::Avg,
            identities: keys(identities),
            scope: None,
            state: DataState::Raw,
            timezone: None,
            label_mode: LabelMode::Id,
            convert_to: HashMap::new(),
        }
    }

    /// Buckets of `width × unit`.
    pub fn every(mut self, width: i64, unit: PeriodUnit) -> Self {
        self.width = width;
        self.unit = unit;
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }
}

/// First or last sample in a window.
#[derive(Clone, Debug, PartialEq)]
pub struct LastRequest {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub inclusive: Inclusive,
    pub identities: Vec<TimeseriesKey>,
    pub scope: Option<ScopeId>,
    pub state: DataState,
    pub timezone: Option<Tz>,
    pub label_mode: LabelMode,
    pub convert_to: HashMap<String, String>,
}

impl LastRequest {
    pub fn new<K: Into<TimeseriesKey>>(identities: impl IntoIterator<Item = K>) -> Self {
        Self {
            start: None,
            end: None,
            inclusive: Inclusive::Both,
            identities: keys(identities),
            scope: None,
            state: DataState::Raw,
            timezone: None,
            label_mode: LabelMode::Id,
            convert_to: HashMap::new(),
        }
    }

    pub fn between<A: TimeZone, B: TimeZone>(
        mut self,
        start: DateTime<A>,
        end: DateTime<B>,
    ) -> Self {
        self.start = Some(start.with_timezone(&Utc));
        self.end = Some(end.with_timezone(&Utc));
        self
    }

    pub fn with_inclusive(mut self, inclusive: Inclusive) -> Self {
        self.inclusive = inclusive;
        self
    }
}

/// Summary statistics over an optional window.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsRequest {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub identities: Vec<TimeseriesKey>,
    pub scope: Option<ScopeId>,
    pub state: DataState,
    pub timezone: Option<Tz>,
    pub label_mode: LabelMode,
}

impl StatsRequest {
    pub fn new<K: Into<TimeseriesKey>>(identities: impl IntoIterator<Item = K>) -> Self {
        Self {
            start: None,
            end: None,
            identities: keys(identities),
            scope: None,
            state: DataState::Raw,
            timezone: None,
            label_mode: LabelMode::Id,
        }
    }

    /// Restricts the statistics to `[start, end)`.
    pub fn between<A: TimeZone, B: TimeZone>(
        mut self,
        start: DateTime<A>,
        end: DateTime<B>,
    ) -> Self {
        self.start = Some(start.with_timezone(&Utc));
        self.end = Some(end.with_timezone(&Utc));
        self
    }
}

selection_setters!(RawRequest);
selection_setters!(BucketRequest);
selection_setters!(LastRequest);
selection_setters!(StatsRequest);
conversion_setter!(RawRequest);
conversion_setter!(BucketRequest);
conversion_setter!(LastRequest);
