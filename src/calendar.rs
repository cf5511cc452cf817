//! Calendar arithmetic for bucket boundaries.
//!
//! Bucket boundaries are a pure function of `(start, end, width, unit, timezone)`. This
//! module owns that function and the primitives it is built from.
//!
//! # Fixed and variable periods
//!
//! - **Fixed-size units** (`second`, `minute`, `hour`) never change length, so flooring is
//!   plain modulo arithmetic against the Unix epoch with a step of `multiplier × unit`.
//!   A multiplier that does not evenly divide the parent unit (for example 7 minutes or
//!   5 hours) is accepted, but the resulting grid is anchored on the epoch rather than on
//!   any natural local origin. A warning is logged when that happens.
//! - **Variable-size units** (`day`, `week`, `month`, `year`) are floored by zeroing
//!   calendar fields in the instant's own timezone. Weeks start on Monday. Since "N
//!   months" has no fixed duration, any multiplier other than 1 is rejected with
//!   [`TimeseriesError::Period`].
//!
//! # DST
//!
//! Zeroing calendar fields can land on a local time that occurs twice (fall-back) or not
//! at all (spring-forward). Both cases are resolved deterministically:
//!
//! - an ambiguous boundary always resolves to its earlier occurrence, which is the moment
//!   the local period actually began, so every instant of one local day floors to the
//!   same boundary whichever fold it sits in;
//! - a boundary inside a gap resolves to the first valid instant after the gap.
//!
//! Fixed-size units never hit either case because they are floored in absolute time.

use crate::error::{Result, TimeseriesError};
use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Longest DST gap we search across, in minutes.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Calendar unit of a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl PeriodUnit {
    pub const ALL: [PeriodUnit; 7] = [
        PeriodUnit::Second,
        PeriodUnit::Minute,
        PeriodUnit::Hour,
        PeriodUnit::Day,
        PeriodUnit::Week,
        PeriodUnit::Month,
        PeriodUnit::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Length in seconds for fixed-size units, `None` for calendar units.
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            Self::Second => Some(1),
            Self::Minute => Some(60),
            Self::Hour => Some(3_600),
            _ => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_seconds().is_some()
    }

    /// Length of the next larger unit, used to detect misaligned multipliers.
    fn parent_seconds(&self) -> Option<i64> {
        match self {
            Self::Second => Some(60),
            Self::Minute => Some(3_600),
            Self::Hour => Some(86_400),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodUnit {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" => Ok(Self::Second),
            "minute" | "minutes" => Ok(Self::Minute),
            "hour" | "hours" => Ok(Self::Hour),
            "day" | "days" => Ok(Self::Day),
            "week" | "weeks" => Ok(Self::Week),
            "month" | "months" => Ok(Self::Month),
            "year" | "years" => Ok(Self::Year),
            _ => Err(TimeseriesError::period(
                s,
                1,
                "unknown unit, must be one of: second, minute, hour, day, week, month, year",
            )),
        }
    }
}

/// Parses an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimeseriesError::InvalidTimezone {
            timezone: name.to_string(),
        })
}

/// Length of `multiplier × unit` for fixed-size units.
///
/// Fails with [`TimeseriesError::Period`] when the length does not fit in a [`Duration`].
fn fixed_step(unit: PeriodUnit, multiplier: i64) -> Result<Option<Duration>> {
    let Some(seconds) = unit.fixed_seconds() else {
        return Ok(None);
    };
    seconds
        .checked_mul(multiplier)
        .and_then(Duration::try_seconds)
        .map(Some)
        .ok_or_else(|| TimeseriesError::period(unit, multiplier, "bucket width out of range"))
}

fn validate_multiplier(unit: PeriodUnit, multiplier: i64) -> Result<()> {
    if multiplier < 1 {
        return Err(TimeseriesError::period(
            unit,
            multiplier,
            "multiplier must be at least 1",
        ));
    }
    if !unit.is_fixed() && multiplier != 1 {
        return Err(TimeseriesError::period(
            unit,
            multiplier,
            "variable-size units only support a multiplier of 1",
        ));
    }
    Ok(())
}

/// Rounds `instant` down to the bucket grid of `multiplier × unit`.
///
/// # Errors
///
/// Returns [`TimeseriesError::Period`] for a multiplier below 1, or a multiplier other
/// than 1 on a variable-size unit.
pub fn floor(instant: &DateTime<Tz>, unit: PeriodUnit, multiplier: i64) -> Result<DateTime<Tz>> {
    validate_multiplier(unit, multiplier)?;
    let tz = instant.timezone();

    if let Some(step) = fixed_step(unit, multiplier)? {
        let step = step.num_seconds();
        if let Some(parent) = unit.parent_seconds() {
            if parent % step != 0 {
                warn!(
                    "{} {} buckets do not divide a {}; boundaries are not aligned to a natural origin",
                    multiplier,
                    unit,
                    parent_name(unit)
                );
            }
        }
        let ts = instant.timestamp();
        let floored = ts - ts.rem_euclid(step);
        return from_unix(floored, &tz);
    }

    let local = instant.naive_local();
    let start = period_start(local.date(), unit)?.and_time(NaiveTime::MIN);
    localize(&tz, start)
}

/// Rounds `instant` up to the bucket grid; instants already on a boundary are unchanged.
pub fn ceil(instant: &DateTime<Tz>, unit: PeriodUnit, multiplier: i64) -> Result<DateTime<Tz>> {
    let floored = floor(instant, unit, multiplier)?;
    if floored == *instant {
        Ok(floored)
    } else {
        step(&floored, unit, multiplier)
    }
}

/// The boundary following `boundary` on the `multiplier × unit` grid.
pub fn step(boundary: &DateTime<Tz>, unit: PeriodUnit, multiplier: i64) -> Result<DateTime<Tz>> {
    validate_multiplier(unit, multiplier)?;
    match fixed_step(unit, multiplier)? {
        Some(step) => boundary.checked_add_signed(step).ok_or_else(|| {
            TimeseriesError::period(unit, multiplier, "next boundary out of range")
        }),
        None => {
            let next = add_units(boundary.naive_local(), unit, multiplier)?;
            localize(&boundary.timezone(), next)
        }
    }
}

/// Length of the bucket that starts at `boundary`.
pub fn bucket_span(boundary: &DateTime<Tz>, unit: PeriodUnit, multiplier: i64) -> Result<Duration> {
    Ok(step(boundary, unit, multiplier)? - *boundary)
}

/// Left-inclusive bucket boundaries covering `[start, end)` in `tz`.
///
/// `start` is floored onto the grid; the sequence stops before `end`. Calendar-unit
/// boundaries are computed from the floored local start, so months of different lengths
/// and DST transitions never accumulate drift.
pub fn boundary_sequence(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    width: i64,
    unit: PeriodUnit,
    tz: Tz,
) -> Result<Vec<DateTime<Tz>>> {
    let first = floor(&start.with_timezone(&tz), unit, width)?;
    let end = end.with_timezone(&tz);
    let mut boundaries = Vec::new();

    if let Some(step) = fixed_step(unit, width)? {
        let mut boundary = Some(first);
        while let Some(current) = boundary.filter(|b| *b < end) {
            boundaries.push(current);
            boundary = current.checked_add_signed(step);
        }
        return Ok(boundaries);
    }

    let base = first.naive_local();
    let mut boundary = first;
    let mut k = 0;
    while boundary < end {
        boundaries.push(boundary);
        k += 1;
        boundary = localize(&tz, add_units(base, unit, k * width)?)?;
    }
    Ok(boundaries)
}

/// Resolves a local wall-clock time in `tz` to an instant.
///
/// Ambiguous times resolve to their earlier occurrence; non-existent times resolve to the
/// first valid instant after the gap.
pub fn localize(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earlier, _) => Ok(earlier),
        LocalResult::None => {
            let mut candidate = naive;
            for _ in 0..MAX_GAP_MINUTES {
                candidate += Duration::minutes(1);
                match tz.from_local_datetime(&candidate) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => return Ok(dt),
                    LocalResult::None => continue,
                }
            }
            Err(TimeseriesError::period(
                naive,
                1,
                format!("local time does not exist in {}", tz.name()),
            ))
        }
    }
}

fn from_unix(seconds: i64, tz: &Tz) -> Result<DateTime<Tz>> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.with_timezone(tz))
        .ok_or_else(|| TimeseriesError::period(seconds, 1, "timestamp out of range"))
}

fn parent_name(unit: PeriodUnit) -> &'static str {
    match unit {
        PeriodUnit::Second => "minute",
        PeriodUnit::Minute => "hour",
        _ => "day",
    }
}

fn period_start(date: NaiveDate, unit: PeriodUnit) -> Result<NaiveDate> {
    let start = match unit {
        PeriodUnit::Day => Some(date),
        PeriodUnit::Week => {
            Some(date - Duration::days(i64::from(date.weekday().num_days_from_monday())))
        }
        PeriodUnit::Month => date.with_day(1),
        PeriodUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        _ => Some(date),
    };
    start.ok_or_else(|| TimeseriesError::period(unit, 1, format!("cannot floor {date}")))
}

fn add_units(naive: NaiveDateTime, unit: PeriodUnit, count: i64) -> Result<NaiveDateTime> {
    let out_of_range = || TimeseriesError::period(unit, count, "date out of range");
    match unit {
        PeriodUnit::Day => Duration::try_days(count)
            .and_then(|d| naive.checked_add_signed(d))
            .ok_or_else(out_of_range),
        PeriodUnit::Week => Duration::try_weeks(count)
            .and_then(|d| naive.checked_add_signed(d))
            .ok_or_else(out_of_range),
        PeriodUnit::Month | PeriodUnit::Year => {
            let months = if unit == PeriodUnit::Year {
                count.checked_mul(12)
            } else {
                Some(count)
            };
            let months = months
                .and_then(|m| u32::try_from(m).ok())
                .ok_or_else(out_of_range)?;
            naive
                .checked_add_months(Months::new(months))
                .ok_or_else(out_of_range)
        }
        fixed => fixed_step(fixed, count)?
            .and_then(|d| naive.checked_add_signed(d))
            .ok_or_else(out_of_range),
    }
}
