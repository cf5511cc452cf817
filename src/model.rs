//! Core data types shared by the query and ingestion paths.
//!
//! This module defines the vocabulary of the engine: timeseries identities, data states,
//! the association that pairs them into a storage key, individual samples, and the small
//! closed enums (`Aggregation`, `Inclusive`, `LabelMode`) that shape a request.
//!
//! All of these are plain values. Anything stateful (stores, resolvers, policies) lives
//! behind the traits in [`crate::store`], [`crate::identity`] and [`crate::auth`].

use crate::error::TimeseriesError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Identities
// =============================================================================

/// Opaque, immutable identifier of a timeseries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeseriesId(pub i64);

impl fmt::Display for TimeseriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the (externally managed) scope in which timeseries names are unique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub i64);

/// Storage key of a (timeseries, data state) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssociationId(pub i64);

/// A reference to a timeseries, either by id or by name within a scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimeseriesKey {
    Id(TimeseriesId),
    Name(String),
}

impl TimeseriesKey {
    /// Parses a column label as the identity type implied by `kind`.
    ///
    /// Names accept any non-empty label; ids must parse as integers.
    pub fn parse(label: &str, kind: IdentityKind) -> Result<Self, TimeseriesError> {
        let trimmed = label.trim();
        match kind {
            IdentityKind::Id => trimmed
                .parse::<i64>()
                .map(|id| Self::Id(TimeseriesId(id)))
                .map_err(|_| TimeseriesError::InvalidIdentityType {
                    label: label.to_string(),
                    expected: kind,
                }),
            IdentityKind::Name if trimmed.is_empty() => Err(TimeseriesError::InvalidIdentityType {
                label: label.to_string(),
                expected: kind,
            }),
            IdentityKind::Name => Ok(Self::Name(trimmed.to_string())),
        }
    }

    /// The label this key renders as in a result column.
    pub fn label(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Name(name) => name.clone(),
        }
    }
}

impl From<TimeseriesId> for TimeseriesKey {
    fn from(id: TimeseriesId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for TimeseriesKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Which identity type a set of labels is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityKind {
    Id,
    Name,
}

impl IdentityKind {
    /// Ids are used when no scope is given, names otherwise.
    pub fn for_scope(scope: Option<ScopeId>) -> Self {
        if scope.is_some() {
            Self::Name
        } else {
            Self::Id
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => f.write_str("id"),
            Self::Name => f.write_str("name"),
        }
    }
}

/// A registered timeseries.
///
/// # Fields
///
/// * `id` - Opaque identifier
/// * `name` - Human name, unique within `scope`
/// * `scope` - Scope the name belongs to (managed externally)
/// * `unit` - Native unit of the stored values, if known
/// * `expected_interval` - Nominal sampling interval, used by completeness statistics
#[derive(Clone, Debug, PartialEq)]
pub struct Timeseries {
    pub id: TimeseriesId,
    pub name: String,
    pub scope: Option<ScopeId>,
    pub unit: Option<String>,
    pub expected_interval: Option<Duration>,
}

impl Timeseries {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id: TimeseriesId(id),
            name: name.to_string(),
            scope: None,
            unit: None,
            expected_interval: None,
        }
    }

    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_expected_interval(mut self, interval: Duration) -> Self {
        self.expected_interval = Some(interval);
        self
    }

    /// Column label of this timeseries under the given labeling mode.
    pub fn label(&self, mode: LabelMode) -> String {
        match mode {
            LabelMode::Id => self.id.to_string(),
            LabelMode::Name => self.name.clone(),
        }
    }
}

/// How result columns are labeled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    #[default]
    Id,
    Name,
}

// =============================================================================
// Data states and associations
// =============================================================================

/// Processing stage of a sample stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataState {
    #[default]
    Raw,
    Clean,
    Processed,
}

impl DataState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "Raw",
            Self::Clean => "Clean",
            Self::Processed => "Processed",
        }
    }
}

impl fmt::Display for DataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataState {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "clean" => Ok(Self::Clean),
            "processed" => Ok(Self::Processed),
            _ => Err(TimeseriesError::InvalidDataState {
                state: s.to_string(),
            }),
        }
    }
}

/// The storage key pairing a timeseries with a data state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Association {
    pub id: AssociationId,
    pub timeseries: TimeseriesId,
    pub state: DataState,
}

/// A single stored value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub association: AssociationId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// =============================================================================
// Request vocabulary
// =============================================================================

/// Aggregation function applied per bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl Aggregation {
    pub const ALL: [Aggregation; 5] = [
        Aggregation::Avg,
        Aggregation::Sum,
        Aggregation::Min,
        Aggregation::Max,
        Aggregation::Count,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
        }
    }

    /// Function used to combine partial aggregates into a coarser bucket.
    ///
    /// Counts are combined by summing; every other function recombines with itself.
    /// Averages are recombined with an unweighted mean of the partial averages.
    pub fn recombination(&self) -> Aggregation {
        match self {
            Self::Count => Self::Sum,
            other => *other,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" | "mean" => Ok(Self::Avg),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "count" => Ok(Self::Count),
            _ => Err(TimeseriesError::InvalidAggregation {
                aggregation: s.to_string(),
            }),
        }
    }
}

/// Which bounds of a time window are inclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusive {
    Both,
    #[default]
    Left,
    Right,
    Neither,
}

impl Inclusive {
    pub fn includes_start(&self) -> bool {
        matches!(self, Self::Both | Self::Left)
    }

    pub fn includes_end(&self) -> bool {
        matches!(self, Self::Both | Self::Right)
    }
}

impl FromStr for Inclusive {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" => Ok(Self::Both),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "neither" => Ok(Self::Neither),
            _ => Err(TimeseriesError::InvalidInclusive {
                mode: s.to_string(),
            }),
        }
    }
}

/// A time window with optional bounds.
///
/// A missing bound is unbounded on that side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub inclusive: Inclusive,
}

impl TimeWindow {
    /// Half-open window `[start, end)`.
    pub fn half_open(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            inclusive: Inclusive::Left,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
            inclusive: Inclusive::Both,
        }
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        let after_start = match self.start {
            None => true,
            Some(start) if self.inclusive.includes_start() => *instant >= start,
            Some(start) => *instant > start,
        };
        let before_end = match self.end {
            None => true,
            Some(end) if self.inclusive.includes_end() => *instant <= end,
            Some(end) => *instant < end,
        };
        after_start && before_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_key_parse_by_kind() {
        assert_eq!(
            TimeseriesKey::parse("42", IdentityKind::Id).unwrap(),
            TimeseriesKey::Id(TimeseriesId(42))
        );
        assert_eq!(
            TimeseriesKey::parse("boiler", IdentityKind::Name).unwrap(),
            TimeseriesKey::Name("boiler".into())
        );
        let err = TimeseriesKey::parse("boiler", IdentityKind::Id).unwrap_err();
        assert!(matches!(err, TimeseriesError::InvalidIdentityType { .. }));
    }

    #[test]
    fn test_aggregation_parse() {
        assert_eq!("AVG".parse::<Aggregation>().unwrap(), Aggregation::Avg);
        assert_eq!("count".parse::<Aggregation>().unwrap(), Aggregation::Count);
        let err = "median".parse::<Aggregation>().unwrap_err();
        assert!(matches!(err, TimeseriesError::InvalidAggregation { .. }));
    }

    #[test]
    fn test_count_recombines_by_sum() {
        assert_eq!(Aggregation::Count.recombination(), Aggregation::Sum);
        assert_eq!(Aggregation::Avg.recombination(), Aggregation::Avg);
    }

    #[test]
    fn test_window_bounds() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();

        let mut window = TimeWindow::half_open(start, end);
        assert!(window.contains(&start));
        assert!(!window.contains(&end));

        window.inclusive = Inclusive::Right;
        assert!(!window.contains(&start));
        assert!(window.contains(&end));

        window.inclusive = Inclusive::Neither;
        assert!(!window.contains(&start));
        assert!(!window.contains(&end));
        assert!(TimeWindow::unbounded().contains(&end));
    }

    #[test]
    fn test_data_state_parse() {
        assert_eq!("clean".parse::<DataState>().unwrap(), DataState::Clean);
        assert!("cooked".parse::<DataState>().is_err());
    }
}
