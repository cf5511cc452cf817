//! Result types of the point queries, and the single-pass statistics accumulator.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// The first or last sample of one identity; both fields are `None` when nothing matched.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LastValue {
    pub label: String,
    pub timestamp: Option<DateTime<Tz>>,
    pub value: Option<f64>,
}

/// Summary statistics of one identity.
///
/// `stddev` is the sample standard deviation (n − 1 denominator) and is `None` below two
/// samples. With no samples at all, `count` is 0 and every other field is `None`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesStats {
    pub label: String,
    pub first: Option<DateTime<Tz>>,
    pub last: Option<DateTime<Tz>>,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub stddev: Option<f64>,
}

/// Welford's online mean and variance, plus bounds and first/last instants.
#[derive(Debug, Default)]
pub(crate) struct Accumulator {
    count: u64,
    mean: f64,
    m2: f64,
    min: Option<f64>,
    max: Option<f64>,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
}

impl Accumulator {
    pub(crate) fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.first = Some(self.first.map_or(timestamp, |t| t.min(timestamp)));
        self.last = Some(self.last.map_or(timestamp, |t| t.max(timestamp)));
    }

    pub(crate) fn finish(self, label: String, tz: &Tz) -> SeriesStats {
        let stddev = (self.count >= 2).then(|| (self.m2 / (self.count - 1) as f64).sqrt());
        SeriesStats {
            label,
            first: self.first.map(|t| t.with_timezone(tz)),
            last: self.last.map(|t| t.with_timezone(tz)),
            count: self.count,
            min: self.min,
            max: self.max,
            avg: (self.count > 0).then_some(self.mean),
            stddev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_sample_stddev() {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut acc = Accumulator::default();
        for (i, v) in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().enumerate() {
            acc.push(t0 + Duration::minutes(i as i64), v);
        }
        let stats = acc.finish("x".into(), &Tz::UTC);
        assert_eq!(stats.count, 8);
        assert!((stats.avg.unwrap() - 5.0).abs() < 1e-12);
        assert_eq!(stats.min, Some(2.0));
        assert_eq!(stats.max, Some(9.0));
        // population stddev would be exactly 2
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((stats.stddev.unwrap() - expected).abs() < 1e-12);
        assert_eq!(
            stats.last.map(|t| t.with_timezone(&Utc)),
            Some(t0 + Duration::minutes(7))
        );
    }

    #[test]
    fn test_empty_and_single() {
        let empty = Accumulator::default().finish("e".into(), &Tz::UTC);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.avg, None);
        assert_eq!(empty.first, None);

        let mut acc = Accumulator::default();
        acc.push(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(), 3.0);
        let single = acc.finish("s".into(), &Tz::UTC);
        assert_eq!(single.avg, Some(3.0));
        assert_eq!(single.stddev, None);
    }
}
