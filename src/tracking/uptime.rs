use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Uptime availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UptimeStatus {
    /// No session directory observed yet
    Detecting,
    /// Start time lies in the future
    Error,
    Active,
}

/// Decomposed uptime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeComponents {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub total_seconds: i64,
    pub total_minutes: i64,
    pub total_hours: i64,
    pub total_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

impl UptimeComponents {
    pub fn from_millis(uptime_ms: i64) -> Self {
        let total_seconds = uptime_ms / 1000;
        let total_minutes = total_seconds / 60;
        let total_hours = total_minutes / 60;
        let total_days = total_hours / 24;

        let days = total_days;
        let hours = total_hours % 24;
        let minutes = total_minutes % 60;
        let seconds = total_seconds % 60;

        Self {
            days,
            hours,
            minutes,
            seconds,
            total_seconds,
            total_minutes,
            total_hours,
            total_days,
            formatted: Some(format!(
                "{}d {:02}h {:02}m {:02}s",
                days, hours, minutes, seconds
            )),
        }
    }
}

/// Uptime report at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeSnapshot {
    pub status: UptimeStatus,
    pub uptime: UptimeComponents,
    pub start_time: Option<DateTime<Utc>>,
    pub current_time: DateTime<Utc>,
}

impl UptimeSnapshot {
    pub fn uptime_ms(&self) -> Option<i64> {
        match (self.status, self.start_time) {
            (UptimeStatus::Active, Some(start)) => {
                Some((self.current_time - start).num_milliseconds())
            }
            _ => None,
        }
    }
}

/// Infers the server session start from session directory creation times
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UptimeTracker {
    pub server_start_time: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl UptimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the creation time of the newest session directory.
    ///
    /// The start time only moves forward. Returns whether it advanced.
    pub fn observe(&mut self, created: DateTime<Utc>) -> bool {
        match self.server_start_time {
            Some(current) if created <= current => false,
            _ => {
                info!(start = %created.to_rfc3339(), "server start time updated");
                self.server_start_time = Some(created);
                true
            }
        }
    }

    /// Compute uptime at `now` and record the check
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> UptimeSnapshot {
        self.last_checked = Some(now);
        self.report(now)
    }

    /// Compute uptime at `now` without recording the check
    pub fn report(&self, now: DateTime<Utc>) -> UptimeSnapshot {
        let Some(start) = self.server_start_time else {
            return UptimeSnapshot {
                status: UptimeStatus::Detecting,
                uptime: UptimeComponents::default(),
                start_time: None,
                current_time: now,
            };
        };

        let uptime_ms = (now - start).num_milliseconds();
        if uptime_ms < 0 {
            return UptimeSnapshot {
                status: UptimeStatus::Error,
                uptime: UptimeComponents::default(),
                start_time: Some(start),
                current_time: now,
            };
        }

        UptimeSnapshot {
            status: UptimeStatus::Active,
            uptime: UptimeComponents::from_millis(uptime_ms),
            start_time: Some(start),
            current_time: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_detecting_before_first_observation() {
        let mut tracker = UptimeTracker::new();
        let snap = tracker.snapshot(t0());
        assert_eq!(snap.status, UptimeStatus::Detecting);
        assert_eq!(snap.uptime.total_seconds, 0);
        assert_eq!(tracker.last_checked, Some(t0()));
    }

    #[test]
    fn test_start_time_never_regresses() {
        let mut tracker = UptimeTracker::new();
        let observations = [
            t0(),
            t0() - Duration::hours(2),
            t0() + Duration::hours(1),
            t0() + Duration::minutes(30),
            t0() + Duration::hours(1),
        ];

        let mut previous = None;
        for created in observations {
            tracker.observe(created);
            assert!(tracker.server_start_time >= previous);
            previous = tracker.server_start_time;
        }
        assert_eq!(tracker.server_start_time, Some(t0() + Duration::hours(1)));
    }

    #[test]
    fn test_active_components() {
        let mut tracker = UptimeTracker::new();
        tracker.observe(t0());
        let now = t0() + Duration::days(1) + Duration::hours(2) + Duration::minutes(3) + Duration::seconds(4);

        let snap = tracker.report(now);
        assert_eq!(snap.status, UptimeStatus::Active);
        assert_eq!(snap.uptime.days, 1);
        assert_eq!(snap.uptime.hours, 2);
        assert_eq!(snap.uptime.minutes, 3);
        assert_eq!(snap.uptime.seconds, 4);
        assert_eq!(snap.uptime.total_hours, 26);
        assert_eq!(snap.uptime.formatted.as_deref(), Some("1d 02h 03m 04s"));
        assert_eq!(snap.uptime_ms(), Some(93_784_000));
        assert!(tracker.last_checked.is_none());
    }

    #[test]
    fn test_future_start_is_error() {
        let mut tracker = UptimeTracker::new();
        tracker.observe(t0() + Duration::minutes(5));
        let snap = tracker.report(t0());
        assert_eq!(snap.status, UptimeStatus::Error);
        assert!(snap.uptime_ms().is_none());
    }
}
