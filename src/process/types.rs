use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    NoProcess,
    Tracking,
    CrashDetected,
    RestartCooldown,
    RestartPending,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::NoProcess => write!(f, "no process"),
            SupervisorState::Tracking => write!(f, "tracking"),
            SupervisorState::CrashDetected => write!(f, "crash detected"),
            SupervisorState::RestartCooldown => write!(f, "restart cooldown"),
            SupervisorState::RestartPending => write!(f, "restart pending"),
        }
    }
}

/// The server process currently under supervision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedProcess {
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub memory_mb: u64,
}

impl TrackedProcess {
    pub fn new(pid: u32, start_time: DateTime<Utc>) -> Self {
        Self {
            pid,
            start_time,
            memory_mb: 0,
        }
    }

    /// Seconds since start, never negative
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.start_time).num_seconds().max(0)
    }
}

/// A process found by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundProcess {
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub memory_bytes: u64,
}

/// A freshly started server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedServer {
    pub pid: u32,
    pub started: DateTime<Utc>,
}

/// Compact uptime for status output: `42s`, `5m:07s` or `1d 02h:05m:07s`
pub fn format_uptime_short(secs: i64) -> String {
    let secs = secs.max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    if secs < 60 {
        format!("{}s", seconds)
    } else if secs < 3_600 {
        format!("{}m:{:02}s", minutes, seconds)
    } else {
        format!("{}d {:02}h:{:02}m:{:02}s", days, hours, minutes, seconds)
    }
}

/// Uptime as recorded in incidents: `Dd HHh:MMm:SSs`
pub fn format_uptime_incident(secs: i64) -> String {
    let secs = secs.max(0);
    format!(
        "{}d {:02}h:{:02}m:{:02}s",
        secs / 86_400,
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60
    )
}
