use crate::config::CrashMonitorConfig;
use crate::error::{FpsmonError, Result};
use crate::logs::{LogSource, RoundSummary, StatsLogWriter};
use crate::process::backend::ProcessBackend;
use crate::process::incident::{IncidentDetails, IncidentKind, IncidentLog};
use crate::process::pid::PidRecord;
use crate::process::restart::{RestartDecision, RestartPolicy, RestartTracker};
use crate::process::types::{SupervisorState, TrackedProcess};
use crate::tracking::Faction;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// What happened after a crash was handled
#[derive(Debug, Clone, PartialEq)]
pub enum CrashOutcome {
    /// A replacement server is running
    Restarted { pid: u32, attempt: u32 },
    /// The restart was attempted but the spawn failed
    RestartFailed { attempt: u32, reason: String },
    /// The policy blocked the restart
    Dormant(RestartDecision),
}

/// Last known round statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub last_round_winner: Option<Faction>,
    pub last_match_duration: Option<String>,
    pub last_bases_captured: Option<u32>,
    pub last_players_killed: Option<u32>,
}

/// Watches the server process, reacts to crash keywords and restarts it
pub struct CrashSupervisor<B: ProcessBackend> {
    backend: B,
    policy: RestartPolicy,
    tracker: RestartTracker,
    process_name: String,
    exe_path: PathBuf,
    working_dir: PathBuf,
    pid_record: PidRecord,
    incidents: IncidentLog,
    stats_log: StatsLogWriter,
    state: SupervisorState,
    tracked: Option<TrackedProcess>,
    last_fps: Option<f64>,
    last_players: Option<u32>,
    round: RoundStats,
}

impl<B: ProcessBackend> CrashSupervisor<B> {
    /// Build a supervisor from a validated crash monitor section
    pub fn new(config: &CrashMonitorConfig, backend: B) -> Result<Self> {
        config.validate()?;

        let process_name = config.target_process_name().ok_or_else(|| {
            FpsmonError::ConfigValidation("crash_monitor.process_name is required".to_string())
        })?;

        let stats_log = StatsLogWriter::new(
            config.stats_log_dir(),
            config.stats_log_rotation(),
            config.stats_log_interval(),
        );

        Ok(Self {
            backend,
            policy: RestartPolicy::from_config(config),
            tracker: RestartTracker::new(),
            process_name,
            exe_path: config.server_exe_path.clone(),
            working_dir: config.server_working_dir.clone(),
            pid_record: PidRecord::with_path(config.pid_file_path()),
            incidents: IncidentLog::new(config.incident_log_path()),
            stats_log,
            state: SupervisorState::NoProcess,
            tracked: None,
            last_fps: None,
            last_players: None,
            round: RoundStats::default(),
        })
    }

    /// Log the policy and pick up a server that is already running
    pub async fn start(&mut self) {
        info!(
            "Crash monitor enabled for '{}' (auto-restart: {}, delay: {}s, max attempts: {}, cooldown: {}m)",
            self.process_name,
            if self.policy.enabled { "on" } else { "off" },
            self.policy.delay.as_secs(),
            if self.policy.max_attempts == 0 {
                "unlimited".to_string()
            } else {
                self.policy.max_attempts.to_string()
            },
            self.policy.cooldown.num_minutes()
        );

        match self.backend.find_by_name(&self.process_name).await {
            Ok(Some(found)) => {
                info!("Found running server process (PID: {})", found.pid);
                let mut process = TrackedProcess::new(found.pid, found.start_time);
                process.memory_mb = found.memory_bytes / (1024 * 1024);
                self.tracked = Some(process);
                self.state = SupervisorState::Tracking;

                if !self.pid_record.exists() {
                    if let Err(e) = self.pid_record.write(found.pid) {
                        warn!("{}", e);
                    }
                }
            }
            Ok(None) => info!("Server process '{}' is not running", self.process_name),
            Err(e) => warn!("Initial server lookup failed: {}", e),
        }
    }

    /// Refresh process presence; runs once per tick before the crash check
    pub async fn observe(&mut self) {
        if let Some(pid) = self.tracked.as_ref().map(|p| p.pid) {
            match self.backend.probe(pid).await {
                Ok(Some(memory_bytes)) => {
                    if let Some(process) = self.tracked.as_mut() {
                        process.memory_mb = memory_bytes / (1024 * 1024);
                    }
                    debug!("Server process {} alive", pid);
                }
                Ok(None) => {
                    warn!("Tracked server process (PID: {}) is no longer running", pid);
                    self.forget_process();
                }
                Err(e) => {
                    warn!("Liveness probe for PID {} failed: {}", pid, e);
                    self.forget_process();
                }
            }
            return;
        }

        match self.backend.find_by_name(&self.process_name).await {
            Ok(Some(found)) => {
                info!(
                    "Tracking server process '{}' (PID: {})",
                    self.process_name, found.pid
                );
                let mut process = TrackedProcess::new(found.pid, found.start_time);
                process.memory_mb = found.memory_bytes / (1024 * 1024);
                self.tracked = Some(process);
                self.state = SupervisorState::Tracking;
                if let Err(e) = self.pid_record.write(found.pid) {
                    warn!("{}", e);
                }
            }
            Ok(None) => debug!("No '{}' process running", self.process_name),
            Err(e) => warn!("Process lookup failed: {}", e),
        }
    }

    fn forget_process(&mut self) {
        self.tracked = None;
        self.state = SupervisorState::NoProcess;
        if let Err(e) = self.pid_record.remove() {
            warn!("{}", e);
        }
    }

    /// React to a crash keyword found in the current log window.
    ///
    /// Logs the crash, terminates the tracked process, clears the PID record,
    /// moves the log aside and then restarts if the policy allows it.
    pub async fn handle_crash<S: LogSource + ?Sized>(
        &mut self,
        keyword: &str,
        source: &mut S,
        log_path: Option<&Path>,
        now: DateTime<Utc>,
    ) -> CrashOutcome {
        error!("Crash keyword '{}' found in server log", keyword);
        self.state = SupervisorState::CrashDetected;

        let uptime = self.tracked.as_ref().map(|p| p.uptime_secs(now));
        self.log_incident(
            IncidentKind::Crash,
            IncidentDetails::keyword(keyword).with_uptime(uptime),
            now,
        );

        if let Some(process) = self.tracked.take() {
            info!(
                "Attempting to terminate crashed process (PID: {})...",
                process.pid
            );
            match self.backend.terminate(process.pid).await {
                Ok(()) => {}
                Err(FpsmonError::ProcessLookup(e)) => {
                    debug!("Crashed process already gone: {}", e);
                }
                Err(e) => warn!("Could not terminate process: {}", e),
            }
        }

        if let Err(e) = self.pid_record.remove() {
            warn!("{}", e);
        }

        if let Some(path) = log_path {
            if let Err(e) = source.quarantine(path, now).await {
                warn!("{}", e);
            }
        }

        self.restart_after_crash(keyword, now).await
    }

    async fn restart_after_crash(&mut self, keyword: &str, now: DateTime<Utc>) -> CrashOutcome {
        let decision = self.policy.evaluate(&self.tracker, now);
        if !decision.is_restart() {
            let err = FpsmonError::RestartIneligible(decision.to_string());
            warn!("{}", err);
            if matches!(decision, RestartDecision::AttemptsExhausted { .. }) {
                warn!("Restart this monitor or start the server manually to resume");
            }
            self.state = SupervisorState::RestartCooldown;
            return CrashOutcome::Dormant(decision);
        }

        let attempt = self.tracker.record_attempt(now);
        self.state = SupervisorState::RestartPending;
        info!(
            "Waiting {} seconds before restart attempt {}...",
            self.policy.delay.as_secs(),
            attempt
        );
        sleep(self.policy.delay).await;

        let at = now + Duration::from_std(self.policy.delay).unwrap_or_else(|_| Duration::zero());
        let reason = format!("Auto-restart after crash (Keyword: {})", keyword);

        match self.start_server(&reason, at).await {
            Ok(pid) => {
                info!("Server restarted successfully after crash (PID: {})", pid);
                self.log_incident(
                    IncidentKind::Restart,
                    IncidentDetails::info(format!(
                        "Auto-restart successful after crash (Keyword: {}, Attempt: {})",
                        keyword, attempt
                    )),
                    at,
                );
                CrashOutcome::Restarted { pid, attempt }
            }
            Err(e) => {
                error!("Failed to restart server after crash: {}", e);
                self.log_incident(
                    IncidentKind::Restart,
                    IncidentDetails::info(format!(
                        "Auto-restart FAILED after crash (Keyword: {}, Attempt: {})",
                        keyword, attempt
                    )),
                    at,
                );
                CrashOutcome::RestartFailed {
                    attempt,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Spawn the server and start tracking it
    pub async fn start_server(&mut self, reason: &str, now: DateTime<Utc>) -> Result<u32> {
        info!("Attempting to start server process... (Reason: {})", reason);

        let spawned = match self.backend.spawn(&self.exe_path, &self.working_dir).await {
            Ok(spawned) => spawned,
            Err(e) => {
                self.tracked = None;
                self.state = SupervisorState::NoProcess;
                return Err(e);
            }
        };

        info!("Server process started. PID: {}", spawned.pid);
        if let Err(e) = self.pid_record.write(spawned.pid) {
            warn!("{}", e);
        }

        self.log_incident(
            IncidentKind::Startup,
            IncidentDetails::info(format!("Started via script - {}", reason)),
            now,
        );

        self.tracked = Some(TrackedProcess::new(spawned.pid, spawned.started));
        self.state = SupervisorState::Tracking;
        Ok(spawned.pid)
    }

    fn log_incident(&self, kind: IncidentKind, details: IncidentDetails, now: DateTime<Utc>) {
        if let Err(e) = self.incidents.append(kind, details, now) {
            error!("Failed to write incident log: {}", e);
        }
    }

    /// Remember the latest performance sample and write the stats log
    pub async fn record_performance(&mut self, fps: f64, players: u32, now: DateTime<Utc>) {
        self.last_fps = Some(fps);
        self.last_players = Some(players);

        if let Err(e) = self.stats_log.record(now, fps, players).await {
            warn!("Failed to write server data log: {}", e);
        }
    }

    /// Keep the newest round fields seen in the log
    pub fn record_round(&mut self, summary: &RoundSummary) {
        if let Some(ref duration) = summary.match_duration {
            self.round.last_match_duration = Some(duration.clone());
        }
        if let Some(bases) = summary.bases_captured {
            self.round.last_bases_captured = Some(bases);
        }
        if let Some(killed) = summary.players_killed {
            self.round.last_players_killed = Some(killed);
        }
        if let Some(winner) = summary.winner {
            self.round.last_round_winner = Some(winner);
        }
    }

    /// Final bookkeeping before the monitor exits
    pub async fn shutdown(&mut self, now: DateTime<Utc>) {
        if let Some(pid) = self.tracked.as_ref().map(|p| p.pid) {
            let alive = matches!(self.backend.probe(pid).await, Ok(Some(_)));
            if alive {
                let uptime = self.tracked.as_ref().map(|p| p.uptime_secs(now));
                self.log_incident(
                    IncidentKind::Shutdown,
                    IncidentDetails::info("Monitor shutting down").with_uptime(uptime),
                    now,
                );
            }
        }

        if let Err(e) = self.pid_record.remove() {
            warn!("{}", e);
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn tracked(&self) -> Option<&TrackedProcess> {
        self.tracked.as_ref()
    }

    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    pub fn restart_attempts(&self) -> u32 {
        self.tracker.attempts()
    }

    pub fn last_restart(&self) -> Option<DateTime<Utc>> {
        self.tracker.last_restart()
    }

    pub fn last_fps(&self) -> Option<f64> {
        self.last_fps
    }

    pub fn last_players(&self) -> Option<u32> {
        self.last_players
    }

    pub fn round(&self) -> &RoundStats {
        &self.round
    }

    pub fn incidents(&self) -> &IncidentLog {
        &self.incidents
    }

    pub fn pid_record(&self) -> &PidRecord {
        &self.pid_record
    }

    pub fn stats_log(&self) -> &StatsLogWriter {
        &self.stats_log
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
