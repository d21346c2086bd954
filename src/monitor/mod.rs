// Monitor module - Owned monitoring context and tick driver

mod display;
mod query;
mod runner;

pub use display::{status_title, TitleDisplay};
pub use query::{
    CrashStatus, CurrentStats, MetricsView, TrackedProcessView, VictoriesView,
};
pub use runner::{run, shutdown_signal};

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::logs::{LogParser, LogSource, PerformanceSample};
use crate::metrics::{MetricKind, MetricsAggregator};
use crate::perf::PerfTimer;
use crate::process::{CrashOutcome, CrashSupervisor, ProcessBackend};
use crate::state::SnapshotStore;
use crate::tracking::{Faction, UptimeTracker, VictoryTracker};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Ticks slower than this are reported on the `perf` target
const SLOW_TICK_MS: u64 = 2_000;

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Whether a log window was read
    pub log_read: bool,
    pub performance: Option<PerformanceSample>,
    /// Victories accepted this tick
    pub victories: Vec<Faction>,
    /// Set when a crash keyword was handled; the rest of the tick was skipped
    pub crash: Option<CrashOutcome>,
}

/// The monitoring context; owns every piece of mutable state
pub struct Monitor<S: LogSource, B: ProcessBackend> {
    config: MonitorConfig,
    source: S,
    parser: LogParser,
    metrics: MetricsAggregator,
    metrics_updated: [Option<DateTime<Utc>>; 2],
    victories: VictoryTracker,
    uptime: UptimeTracker,
    supervisor: Option<CrashSupervisor<B>>,
    store: SnapshotStore,
}

impl<S: LogSource, B: ProcessBackend> Monitor<S, B> {
    /// Build the context and restore persisted snapshots.
    ///
    /// An invalid crash monitor section disables supervision only.
    pub fn new(config: MonitorConfig, source: S, backend: Option<B>) -> Self {
        let store = SnapshotStore::new(&config.data_dir);
        let restored = store.load();

        let supervisor = match backend {
            Some(backend) if config.crash_monitor.enabled => {
                match CrashSupervisor::new(&config.crash_monitor, backend) {
                    Ok(supervisor) => Some(supervisor),
                    Err(e) => {
                        error!("Crash monitor disabled: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let parser = match supervisor {
            Some(_) => LogParser::new(config.crash_monitor.crash_keywords.clone()),
            None => LogParser::default(),
        };

        let metrics_updated = [
            restored.last_updated(MetricKind::Fps),
            restored.last_updated(MetricKind::Players),
        ];
        let victories = VictoryTracker::from_state(restored.victories, config.victory_window());

        Self {
            config,
            source,
            parser,
            metrics: restored.metrics,
            metrics_updated,
            victories,
            uptime: restored.uptime,
            supervisor,
            store,
        }
    }

    /// One-time startup work before the first tick
    pub async fn start(&mut self) {
        info!(
            "Monitoring {} every {}ms",
            self.config
                .log_source
                .local_path
                .join("<session>")
                .join(&self.config.log_source.log_file_name)
                .display(),
            self.config.update_interval_ms
        );

        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.start().await;
        }
    }

    /// Run one monitoring cycle at `now`
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let _timer = PerfTimer::with_threshold("monitor_tick", SLOW_TICK_MS);
        let mut report = TickReport::default();

        let snapshot = match self.source.poll(self.config.log_source.scan_window_lines).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Log source unavailable: {}", e);
                None
            }
        };

        let window = snapshot.and_then(|snapshot| {
            self.uptime.observe(snapshot.session.created);
            snapshot.log
        });

        let (lines, log_path) = match window {
            Some(window) => {
                report.log_read = true;
                (window.lines, Some(window.path))
            }
            None => (Vec::new(), None),
        };

        let scan = self.parser.scan(&lines);

        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.observe().await;

            if let Some(ref keyword) = scan.crash_keyword {
                let outcome = supervisor
                    .handle_crash(keyword, &mut self.source, log_path.as_deref(), now)
                    .await;
                info!("Crash handled: {:?}", outcome);
                report.crash = Some(outcome);
                return report;
            }
        }

        if let Some(sample) = scan.performance {
            self.metrics.record(MetricKind::Fps, sample.fps, now);
            self.metrics
                .record(MetricKind::Players, sample.players as f64, now);
            self.metrics_updated = [Some(now), Some(now)];
            debug!("FPS: {} | Players: {}", sample.fps, sample.players);

            if let Some(supervisor) = self.supervisor.as_mut() {
                supervisor.record_performance(sample.fps, sample.players, now).await;
            }
            report.performance = Some(sample);
        }

        // Admin tool end-of-game lines count as a declaration too
        let declared = [scan.victory, scan.round.winner];
        for faction in declared.into_iter().flatten() {
            if self.victories.record_victory(faction, now) {
                report.victories.push(faction);
            }
        }

        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.record_round(&scan.round);
        }

        report
    }

    /// Persist all snapshots
    pub fn save_snapshot(&self, now: DateTime<Utc>) -> Result<()> {
        self.store
            .save(&self.metrics, self.victories.state(), &self.uptime, now)
    }

    /// Final flush: snapshots, shutdown incident and PID record
    pub async fn shutdown(&mut self, now: DateTime<Utc>) {
        if let Err(e) = self.save_snapshot(now) {
            error!("Failed to save snapshots on shutdown: {}", e);
        }

        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.shutdown(now).await;
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn victory_tracker(&self) -> &VictoryTracker {
        &self.victories
    }

    pub fn uptime_tracker(&self) -> &UptimeTracker {
        &self.uptime
    }

    pub fn uptime_tracker_mut(&mut self) -> &mut UptimeTracker {
        &mut self.uptime
    }

    pub fn supervisor(&self) -> Option<&CrashSupervisor<B>> {
        self.supervisor.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn metric_updated(&self, kind: MetricKind) -> Option<DateTime<Utc>> {
        match kind {
            MetricKind::Fps => self.metrics_updated[0],
            MetricKind::Players => self.metrics_updated[1],
        }
    }
}
