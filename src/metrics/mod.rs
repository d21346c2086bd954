// Metrics module - Rolling telemetry with calendar rollups

mod bucket;

pub use bucket::{Bucket, Period};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Number of raw samples kept per metric
pub const RAW_HISTORY_CAP: usize = 1000;

/// Metric tracked by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Fps,
    Players,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Fps => write!(f, "fps"),
            MetricKind::Players => write!(f, "players"),
        }
    }
}

/// Resolution of a metrics query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Raw,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    fn period(&self) -> Option<Period> {
        match self {
            Granularity::Raw => None,
            Granularity::Hourly => Some(Period::Hour),
            Granularity::Daily => Some(Period::Day),
            Granularity::Weekly => Some(Period::Week),
            Granularity::Monthly => Some(Period::Month),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Raw => "raw",
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Granularity::Raw),
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            "weekly" => Ok(Granularity::Weekly),
            "monthly" => Ok(Granularity::Monthly),
            other => Err(format!("unknown granularity: {}", other)),
        }
    }
}

/// A single observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// One entry of a query result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricPoint {
    Raw {
        timestamp: DateTime<Utc>,
        value: f64,
    },
    Rollup {
        timestamp: DateTime<Utc>,
        average: f64,
        min: f64,
        max: f64,
        count: u64,
    },
}

impl MetricPoint {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MetricPoint::Raw { timestamp, .. } | MetricPoint::Rollup { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Raw value or rollup average
    pub fn value(&self) -> f64 {
        match self {
            MetricPoint::Raw { value, .. } => *value,
            MetricPoint::Rollup { average, .. } => *average,
        }
    }
}

/// Raw history and rollups for one metric
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    pub latest: Option<f64>,
    pub raw: VecDeque<Sample>,
    pub hourly: BTreeMap<String, Bucket>,
    pub daily: BTreeMap<String, Bucket>,
    pub weekly: BTreeMap<String, Bucket>,
    pub monthly: BTreeMap<String, Bucket>,
}

impl MetricSeries {
    pub fn record(&mut self, value: f64, timestamp: DateTime<Utc>) {
        self.raw.push_back(Sample { value, timestamp });
        while self.raw.len() > RAW_HISTORY_CAP {
            self.raw.pop_front();
        }
        self.latest = Some(value);

        for period in Period::ALL {
            let key = period.key(timestamp);
            self.buckets_mut(period)
                .entry(key)
                .or_insert_with(|| Bucket::new(period.start(timestamp), value))
                .add(value);
        }
    }

    pub fn buckets(&self, period: Period) -> &BTreeMap<String, Bucket> {
        match period {
            Period::Hour => &self.hourly,
            Period::Day => &self.daily,
            Period::Week => &self.weekly,
            Period::Month => &self.monthly,
        }
    }

    fn buckets_mut(&mut self, period: Period) -> &mut BTreeMap<String, Bucket> {
        match period {
            Period::Hour => &mut self.hourly,
            Period::Day => &mut self.daily,
            Period::Week => &mut self.weekly,
            Period::Month => &mut self.monthly,
        }
    }

    /// Most recent `limit` points, oldest first
    pub fn query(&self, granularity: Granularity, limit: usize) -> Vec<MetricPoint> {
        match granularity.period() {
            None => {
                let skip = self.raw.len().saturating_sub(limit);
                self.raw
                    .iter()
                    .skip(skip)
                    .map(|s| MetricPoint::Raw {
                        timestamp: s.timestamp,
                        value: s.value,
                    })
                    .collect()
            }
            Some(period) => {
                let mut buckets: Vec<&Bucket> = self.buckets(period).values().collect();
                buckets.sort_by_key(|b| b.start);
                let skip = buckets.len().saturating_sub(limit);
                buckets
                    .into_iter()
                    .skip(skip)
                    .map(|b| MetricPoint::Rollup {
                        timestamp: b.start,
                        average: b.average,
                        min: b.min,
                        max: b.max,
                        count: b.count,
                    })
                    .collect()
            }
        }
    }

    /// Restore derived values after loading from disk
    pub fn normalize(&mut self) {
        while self.raw.len() > RAW_HISTORY_CAP {
            self.raw.pop_front();
        }
        if self.latest.is_none() {
            self.latest = self.raw.back().map(|s| s.value);
        }
        for period in Period::ALL {
            for bucket in self.buckets_mut(period).values_mut() {
                bucket.recompute();
            }
        }
    }
}

/// Aggregator owning every metric series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsAggregator {
    fps: MetricSeries,
    players: MetricSeries,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(fps: MetricSeries, players: MetricSeries) -> Self {
        Self { fps, players }
    }

    /// Record an observation; `timestamp` is the observation time
    pub fn record(&mut self, kind: MetricKind, value: f64, timestamp: DateTime<Utc>) {
        self.series_mut(kind).record(value, timestamp);
    }

    pub fn query(&self, kind: MetricKind, granularity: Granularity, limit: usize) -> Vec<MetricPoint> {
        self.series(kind).query(granularity, limit)
    }

    pub fn latest(&self, kind: MetricKind) -> Option<f64> {
        self.series(kind).latest
    }

    pub fn series(&self, kind: MetricKind) -> &MetricSeries {
        match kind {
            MetricKind::Fps => &self.fps,
            MetricKind::Players => &self.players,
        }
    }

    fn series_mut(&mut self, kind: MetricKind) -> &mut MetricSeries {
        match kind {
            MetricKind::Fps => &mut self.fps,
            MetricKind::Players => &mut self.players,
        }
    }
}
