// CLI module - User-facing command-line interface

mod output;

pub use output::print_error;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::logs::LocalLogSource;
use crate::metrics::{Granularity, MetricKind};
use crate::monitor::{self, CurrentStats, Monitor, MetricsView, VictoriesView};
use crate::process::{IncidentLog, PidRecord, SystemBackend};
use crate::state::SnapshotStore;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fpsmon - Game server telemetry and crash supervision
#[derive(Parser)]
#[command(name = "fpsmon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true, default_value = "fpsmon.toml")]
    config: PathBuf,

    /// Log filter, overrides RUST_LOG (e.g. "debug" or "fpsmon=trace")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor until Ctrl+C or SIGTERM
    Run,

    /// Show the latest persisted stats
    Status,

    /// Show a metric series
    Metrics {
        /// Metric to show
        #[arg(short, long, value_enum, default_value = "fps")]
        kind: MetricKind,

        /// Raw samples or rollup buckets
        #[arg(short, long, value_enum, default_value = "raw")]
        granularity: Granularity,

        /// Number of most recent points
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show victory totals and history
    Victories {
        /// Number of history entries
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show server uptime
    Uptime,

    /// Show the crash monitor incident log
    Incidents {
        /// Number of incidents
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

impl Cli {
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config
    }

    /// Execute the parsed command
    pub async fn execute(&self) -> Result<()> {
        let config = MonitorConfig::from_file(&self.config)?;

        match &self.command {
            Commands::Run => run_monitor(config).await,
            Commands::Status => {
                let now = Utc::now();
                let state = SnapshotStore::new(&config.data_dir).load();
                let stats = CurrentStats::from_persisted(&state, now);
                let pid = read_pid(&config);
                output::print_status(&stats, &state.uptime.report(now), pid);
                Ok(())
            }
            Commands::Metrics {
                kind,
                granularity,
                limit,
            } => {
                let state = SnapshotStore::new(&config.data_dir).load();
                let view = MetricsView::build(
                    &state.metrics,
                    state.last_updated(*kind),
                    *kind,
                    *granularity,
                    *limit,
                );
                output::print_metrics(&view);
                Ok(())
            }
            Commands::Victories { limit } => {
                let state = SnapshotStore::new(&config.data_dir).load();
                output::print_victories(&VictoriesView::from_state(&state.victories, *limit));
                Ok(())
            }
            Commands::Uptime => {
                let state = SnapshotStore::new(&config.data_dir).load();
                output::print_uptime(&state.uptime.report(Utc::now()));
                Ok(())
            }
            Commands::Incidents { limit } => {
                let log = IncidentLog::new(config.crash_monitor.incident_log_path());
                if !log.path().exists() {
                    output::print_info(&format!(
                        "No incident log at {}",
                        log.path().display()
                    ));
                    return Ok(());
                }
                output::print_incidents(&log.list(*limit)?);
                Ok(())
            }
        }
    }
}

async fn run_monitor(config: MonitorConfig) -> Result<()> {
    let source = LocalLogSource::new(
        &config.log_source.local_path,
        config.log_source.log_file_name.clone(),
    );
    let backend = config.crash_monitor.enabled.then(SystemBackend::new);

    let mut monitor = Monitor::new(config, source, backend);
    monitor::run(&mut monitor, monitor::shutdown_signal()).await
}

fn read_pid(config: &MonitorConfig) -> Option<u32> {
    if !config.crash_monitor.enabled {
        return None;
    }
    let record = PidRecord::with_path(config.crash_monitor.pid_file_path());
    if record.exists() {
        record.read().ok()
    } else {
        None
    }
}
