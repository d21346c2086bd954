//! Calendar rollup buckets.
//!
//! Periods are cut on UTC boundaries regardless of the host timezone, so a
//! snapshot keeps the same keys when the monitor moves between machines.
//! Timestamps in other zones are converted to UTC before keying. Only the
//! human-facing outputs (stats log, incident log, CLI) use local time.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Calendar period a rollup bucket covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Hour, Period::Day, Period::Week, Period::Month];

    /// Calendar key for the period containing `ts`.
    ///
    /// Keys are zero padded so their lexicographic order is chronological.
    pub fn key<Tz: TimeZone>(&self, ts: DateTime<Tz>) -> String {
        let ts = ts.with_timezone(&Utc);
        match self {
            Period::Hour => ts.format("%Y-%m-%d %H").to_string(),
            Period::Day => ts.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let week = ts.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Period::Month => ts.format("%Y-%m").to_string(),
        }
    }

    /// Start of the period containing `ts`
    pub fn start<Tz: TimeZone>(&self, ts: DateTime<Tz>) -> DateTime<Utc> {
        let ts = ts.with_timezone(&Utc);
        let date = ts.date_naive();
        let start = match self {
            Period::Hour => date
                .and_hms_opt(ts.hour(), 0, 0)
                .unwrap_or_else(|| date.and_time(NaiveTime::MIN)),
            Period::Day => date.and_time(NaiveTime::MIN),
            Period::Week => {
                let back = date.weekday().num_days_from_monday() as i64;
                (date - Duration::days(back)).and_time(NaiveTime::MIN)
            }
            Period::Month => date.with_day(1).unwrap_or(date).and_time(NaiveTime::MIN),
        };
        start.and_utc()
    }
}

/// Aggregated statistic for one calendar period of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub sum: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub average: f64,
    /// Start of the calendar period
    #[serde(rename = "timestamp")]
    pub start: DateTime<Utc>,
}

impl Bucket {
    pub fn new(start: DateTime<Utc>, value: f64) -> Self {
        Self {
            sum: 0.0,
            count: 0,
            min: value,
            max: value,
            average: 0.0,
            start,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.average = self.sum / self.count as f64;
    }

    /// Re-derive the average from sum and count
    pub fn recompute(&mut self) {
        self.average = if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        };
    }
}
