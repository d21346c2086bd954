use super::Monitor;
use crate::logs::LogSource;
use crate::metrics::{Granularity, MetricKind, MetricPoint, MetricsAggregator};
use crate::process::{
    format_uptime_short, CrashSupervisor, Incident, ProcessBackend, SupervisorState,
};
use crate::error::Result;
use crate::state::PersistedState;
use crate::tracking::{Faction, UptimeSnapshot, VictoryEntry, VictoryState, VictoryTracker};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Latest values for a status display
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStats {
    pub fps: Option<f64>,
    pub players: Option<f64>,
    pub uptime_ms: Option<i64>,
    pub match_duration: Option<String>,
    pub bases_captured: Option<u32>,
    pub players_killed: Option<u32>,
    pub last_round_winner: Option<Faction>,
}

/// Victory totals and newest-first history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VictoriesView {
    pub nato: u64,
    pub russia: u64,
    pub total: u64,
    pub last_victory: Option<VictoryEntry>,
    pub first_victory: Option<DateTime<Utc>>,
    pub history: Vec<VictoryEntry>,
    pub history_count: usize,
}

impl VictoriesView {
    pub fn from_state(state: &VictoryState, limit: usize) -> Self {
        Self {
            nato: state.nato,
            russia: state.russia,
            total: state.total,
            last_victory: state.last_victory.clone(),
            first_victory: state.first_victory,
            history: state.history.iter().rev().take(limit).cloned().collect(),
            history_count: state.history.len(),
        }
    }

    fn from_tracker(tracker: &VictoryTracker, limit: usize) -> Self {
        Self::from_state(tracker.state(), limit)
    }
}

/// A metrics query result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsView {
    pub kind: MetricKind,
    pub granularity: Granularity,
    pub latest: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub points: Vec<MetricPoint>,
}

impl MetricsView {
    pub fn build(
        metrics: &MetricsAggregator,
        last_updated: Option<DateTime<Utc>>,
        kind: MetricKind,
        granularity: Granularity,
        limit: usize,
    ) -> Self {
        Self {
            kind,
            granularity,
            latest: metrics.latest(kind),
            last_updated,
            points: metrics.query(kind, granularity, limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedProcessView {
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub uptime_secs: i64,
    pub formatted_uptime: String,
}

/// Crash supervisor status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashStatus {
    pub enabled: bool,
    pub state: Option<SupervisorState>,
    pub server_process: Option<TrackedProcessView>,
    pub last_fps: Option<f64>,
    pub last_players: Option<u32>,
    pub memory_mb: Option<u64>,
    pub auto_restart: bool,
    pub restart_attempts: u32,
    pub last_restart_time: Option<DateTime<Utc>>,
    pub restart_cooldown_minutes: i64,
    pub max_restart_attempts: u32,
}

impl CrashStatus {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            state: None,
            server_process: None,
            last_fps: None,
            last_players: None,
            memory_mb: None,
            auto_restart: false,
            restart_attempts: 0,
            last_restart_time: None,
            restart_cooldown_minutes: 0,
            max_restart_attempts: 0,
        }
    }

    fn from_supervisor<B: ProcessBackend>(supervisor: &CrashSupervisor<B>, now: DateTime<Utc>) -> Self {
        let tracked = supervisor.tracked();
        let policy = supervisor.policy();

        Self {
            enabled: true,
            state: Some(supervisor.state()),
            server_process: tracked.map(|p| {
                let uptime_secs = p.uptime_secs(now);
                TrackedProcessView {
                    pid: p.pid,
                    start_time: p.start_time,
                    uptime_secs,
                    formatted_uptime: format_uptime_short(uptime_secs),
                }
            }),
            last_fps: supervisor.last_fps(),
            last_players: supervisor.last_players(),
            memory_mb: tracked.map(|p| p.memory_mb),
            auto_restart: policy.enabled,
            restart_attempts: supervisor.restart_attempts(),
            last_restart_time: supervisor.last_restart(),
            restart_cooldown_minutes: policy.cooldown.num_minutes(),
            max_restart_attempts: policy.max_attempts,
        }
    }
}

impl CurrentStats {
    /// Stats available without a running monitor
    pub fn from_persisted(state: &PersistedState, now: DateTime<Utc>) -> Self {
        Self {
            fps: state.metrics.latest(MetricKind::Fps),
            players: state.metrics.latest(MetricKind::Players),
            uptime_ms: state.uptime.report(now).uptime_ms(),
            last_round_winner: state.victories.last_victory.as_ref().map(|v| v.faction),
            ..Self::default()
        }
    }
}

impl<S: LogSource, B: ProcessBackend> Monitor<S, B> {
    pub fn current_stats(&self, now: DateTime<Utc>) -> CurrentStats {
        let round = self.supervisor.as_ref().map(|s| s.round().clone()).unwrap_or_default();
        let last_round_winner = round
            .last_round_winner
            .or_else(|| self.victories.last_victory().map(|v| v.faction));

        CurrentStats {
            fps: self.metrics.latest(MetricKind::Fps),
            players: self.metrics.latest(MetricKind::Players),
            uptime_ms: self.uptime.report(now).uptime_ms(),
            match_duration: round.last_match_duration,
            bases_captured: round.last_bases_captured,
            players_killed: round.last_players_killed,
            last_round_winner,
        }
    }

    pub fn victories(&self, limit: usize) -> VictoriesView {
        VictoriesView::from_tracker(&self.victories, limit)
    }

    pub fn metrics_view(&self, kind: MetricKind, granularity: Granularity, limit: usize) -> MetricsView {
        MetricsView::build(&self.metrics, self.metric_updated(kind), kind, granularity, limit)
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> UptimeSnapshot {
        self.uptime.report(now)
    }

    pub fn crash_status(&self, now: DateTime<Utc>) -> CrashStatus {
        match self.supervisor {
            Some(ref supervisor) => CrashStatus::from_supervisor(supervisor, now),
            None => CrashStatus::disabled(),
        }
    }

    /// Newest first; empty when crash supervision is off
    pub fn incidents(&self, limit: usize) -> Result<Vec<Incident>> {
        match self.supervisor {
            Some(ref supervisor) => supervisor.incidents().list(limit),
            None => Ok(Vec::new()),
        }
    }

    /// Time until the restart cooldown ends, if one is active
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let supervisor = self.supervisor.as_ref()?;
        let last = supervisor.last_restart()?;
        let remaining = supervisor.policy().cooldown - (now - last);
        (remaining > Duration::zero()).then_some(remaining)
    }
}
