use crate::error::{FpsmonError, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between monitoring ticks (in milliseconds)
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Interval between snapshot saves (in seconds)
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Interval between status title refreshes (in seconds), disabled when absent
    #[serde(default)]
    pub status_refresh_secs: Option<u64>,

    /// Upper bound for the shutdown flush (in seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Directory holding the JSON snapshots
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Window in which a repeated victory for the same faction is discarded
    #[serde(default = "default_victory_window")]
    pub victory_duplicate_check_minutes: u64,

    pub log_source: LogSourceConfig,

    #[serde(default)]
    pub crash_monitor: CrashMonitorConfig,
}

/// Where the game server writes its console log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSourceConfig {
    /// Root directory containing one subdirectory per server session
    pub local_path: PathBuf,

    /// Log file name inside the session directory
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,

    /// Number of trailing lines scanned on every tick
    #[serde(default = "default_scan_window")]
    pub scan_window_lines: usize,
}

/// Crash supervision and restart policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashMonitorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Path to the server executable used for restarts
    #[serde(default)]
    pub server_exe_path: PathBuf,

    /// Working directory of the server; holds the PID record and incident log
    #[serde(default)]
    pub server_working_dir: PathBuf,

    /// Process name to look up, defaults to the executable's file name
    #[serde(default)]
    pub process_name: Option<String>,

    /// Crash keywords in priority order
    #[serde(default)]
    pub crash_keywords: Vec<String>,

    #[serde(default = "default_true")]
    pub enable_auto_restart: bool,

    /// Maximum restart attempts per supervisor lifetime (0 = unlimited)
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,

    #[serde(default = "default_restart_cooldown")]
    pub restart_cooldown_minutes: u64,

    #[serde(default = "default_restart_delay")]
    pub restart_delay_seconds: u64,

    #[serde(default = "default_stats_log_interval")]
    pub stats_log_interval_secs: u64,

    #[serde(default = "default_stats_log_folder")]
    pub stats_log_folder: String,

    #[serde(default = "default_stats_log_rotation")]
    pub stats_log_rotation_hours: u64,

    /// Whether to mirror status into the terminal title
    #[serde(default = "default_true")]
    pub update_title: bool,
}

/// Upper bound for minute based windows (one year)
const MAX_WINDOW_MINUTES: u64 = 525_600;
/// Upper bound for hour based periods (one year)
const MAX_PERIOD_HOURS: u64 = 8_760;
/// Upper bound for second based intervals and delays (one year)
const MAX_INTERVAL_SECS: u64 = 31_536_000;

static ENV_VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
});

// Default value functions for serde
fn default_update_interval_ms() -> u64 {
    10_000
}

fn default_snapshot_interval() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_victory_window() -> u64 {
    3
}

fn default_log_file_name() -> String {
    "console.log".to_string()
}

fn default_scan_window() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_restart_cooldown() -> u64 {
    5
}

fn default_restart_delay() -> u64 {
    10
}

fn default_stats_log_interval() -> u64 {
    60
}

fn default_stats_log_folder() -> String {
    "server_data_logs".to_string()
}

fn default_stats_log_rotation() -> u64 {
    24
}

impl Default for CrashMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_exe_path: PathBuf::new(),
            server_working_dir: PathBuf::new(),
            process_name: None,
            crash_keywords: Vec::new(),
            enable_auto_restart: default_true(),
            max_restart_attempts: default_max_restart_attempts(),
            restart_cooldown_minutes: default_restart_cooldown(),
            restart_delay_seconds: default_restart_delay(),
            stats_log_interval_secs: default_stats_log_interval(),
            stats_log_folder: default_stats_log_folder(),
            stats_log_rotation_hours: default_stats_log_rotation(),
            update_title: default_true(),
        }
    }
}

impl MonitorConfig {
    /// Minimal configuration watching `local_path`, crash monitor disabled
    pub fn for_log_root<P: AsRef<Path>>(local_path: P) -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            snapshot_interval_secs: default_snapshot_interval(),
            status_refresh_secs: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
            data_dir: default_data_dir(),
            victory_duplicate_check_minutes: default_victory_window(),
            log_source: LogSourceConfig {
                local_path: local_path.as_ref().to_path_buf(),
                log_file_name: default_log_file_name(),
                scan_window_lines: default_scan_window(),
            },
            crash_monitor: CrashMonitorConfig::default(),
        }
    }

    /// Load the configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<MonitorConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FpsmonError::Config(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(FpsmonError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<MonitorConfig> {
        toml::from_str(contents)
            .map_err(|e| FpsmonError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<MonitorConfig> {
        serde_json::from_str(contents)
            .map_err(|e| FpsmonError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the settings every subsystem depends on.
    ///
    /// The `[crash_monitor]` section is validated separately so that a bad
    /// crash monitor setup only disables supervision.
    pub fn validate(&self) -> Result<()> {
        if self.log_source.local_path.as_os_str().is_empty() {
            return Err(FpsmonError::MissingConfigField(
                "log_source.local_path".to_string(),
            ));
        }

        if self.log_source.log_file_name.is_empty() {
            return Err(FpsmonError::MissingConfigField(
                "log_source.log_file_name".to_string(),
            ));
        }

        if self.log_source.scan_window_lines == 0 {
            return Err(FpsmonError::ConfigValidation(
                "scan_window_lines must be at least 1".to_string(),
            ));
        }

        if self.update_interval_ms == 0 {
            return Err(FpsmonError::ConfigValidation(
                "update_interval_ms must be at least 1".to_string(),
            ));
        }

        if self.snapshot_interval_secs == 0 {
            return Err(FpsmonError::ConfigValidation(
                "snapshot_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.status_refresh_secs == Some(0) {
            return Err(FpsmonError::ConfigValidation(
                "status_refresh_secs must be at least 1 when set".to_string(),
            ));
        }

        check_max("update_interval_ms", self.update_interval_ms, MAX_INTERVAL_SECS * 1000)?;
        check_max("snapshot_interval_secs", self.snapshot_interval_secs, MAX_INTERVAL_SECS)?;
        check_max("shutdown_timeout_secs", self.shutdown_timeout_secs, MAX_INTERVAL_SECS)?;
        if let Some(secs) = self.status_refresh_secs {
            check_max("status_refresh_secs", secs, MAX_INTERVAL_SECS)?;
        }
        check_max(
            "victory_duplicate_check_minutes",
            self.victory_duplicate_check_minutes,
            MAX_WINDOW_MINUTES,
        )?;

        Ok(())
    }

    /// Expand environment variables in path fields
    fn expand_env_vars(&mut self) {
        self.data_dir = expand_env_in_path(&self.data_dir);
        self.log_source.local_path = expand_env_in_path(&self.log_source.local_path);
        self.crash_monitor.server_exe_path = expand_env_in_path(&self.crash_monitor.server_exe_path);
        self.crash_monitor.server_working_dir =
            expand_env_in_path(&self.crash_monitor.server_working_dir);
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Clamped to one year for configs that skipped `validate`
    pub fn victory_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.victory_duplicate_check_minutes.min(MAX_WINDOW_MINUTES) as i64)
    }
}

impl CrashMonitorConfig {
    /// Validate the crash monitor section
    pub fn validate(&self) -> Result<()> {
        if self.server_exe_path.as_os_str().is_empty() {
            return Err(FpsmonError::MissingConfigField(
                "crash_monitor.server_exe_path".to_string(),
            ));
        }

        if self.server_working_dir.as_os_str().is_empty() {
            return Err(FpsmonError::MissingConfigField(
                "crash_monitor.server_working_dir".to_string(),
            ));
        }

        if self.crash_keywords.iter().any(|k| k.is_empty()) {
            return Err(FpsmonError::ConfigValidation(
                "crash_keywords must not contain empty entries".to_string(),
            ));
        }

        if self.stats_log_rotation_hours == 0 {
            return Err(FpsmonError::ConfigValidation(
                "stats_log_rotation_hours must be at least 1".to_string(),
            ));
        }

        check_max(
            "crash_monitor.restart_cooldown_minutes",
            self.restart_cooldown_minutes,
            MAX_WINDOW_MINUTES,
        )?;
        check_max(
            "crash_monitor.restart_delay_seconds",
            self.restart_delay_seconds,
            MAX_INTERVAL_SECS,
        )?;
        check_max(
            "crash_monitor.stats_log_interval_secs",
            self.stats_log_interval_secs,
            MAX_INTERVAL_SECS,
        )?;
        check_max(
            "crash_monitor.stats_log_rotation_hours",
            self.stats_log_rotation_hours,
            MAX_PERIOD_HOURS,
        )?;

        if self.target_process_name().is_none() {
            return Err(FpsmonError::ConfigValidation(format!(
                "Cannot derive process name from {}",
                self.server_exe_path.display()
            )));
        }

        if !self.server_working_dir.is_dir() {
            return Err(FpsmonError::ConfigValidation(format!(
                "Server working directory does not exist: {}",
                self.server_working_dir.display()
            )));
        }

        Ok(())
    }

    /// Name used for the OS process lookup
    pub fn target_process_name(&self) -> Option<String> {
        if let Some(ref name) = self.process_name {
            if !name.is_empty() {
                return Some(name.clone());
            }
        }
        self.server_exe_path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    }

    // Duration accessors clamp to the validated ranges

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_seconds.min(MAX_INTERVAL_SECS))
    }

    pub fn restart_cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.restart_cooldown_minutes.min(MAX_WINDOW_MINUTES) as i64)
    }

    pub fn stats_log_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stats_log_interval_secs.min(MAX_INTERVAL_SECS) as i64)
    }

    pub fn stats_log_rotation(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stats_log_rotation_hours.min(MAX_PERIOD_HOURS) as i64)
    }

    pub fn incident_log_path(&self) -> PathBuf {
        self.server_working_dir.join("incident.json")
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.server_working_dir.join("server.pid")
    }

    pub fn stats_log_dir(&self) -> PathBuf {
        self.server_working_dir.join(&self.stats_log_folder)
    }
}

fn check_max(field: &str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(FpsmonError::ConfigValidation(format!(
            "{} must be at most {} (got {})",
            field, max, value
        )));
    }
    Ok(())
}

/// Expand `$VAR` and `${VAR}` in a string; unset variables are left as written
fn expand_env_in_string(s: &str) -> String {
    ENV_VAR_RE
        .replace_all(s, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(expand_env_in_string(&path_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_toml_defaults() {
        let config = MonitorConfig::parse_toml(
            r#"
            [log_source]
            local_path = "/srv/reforger/logs"
            "#,
        )
        .unwrap();

        assert_eq!(config.update_interval_ms, 10_000);
        assert_eq!(config.snapshot_interval_secs, 30);
        assert_eq!(config.victory_duplicate_check_minutes, 3);
        assert_eq!(config.log_source.log_file_name, "console.log");
        assert_eq!(config.log_source.scan_window_lines, 100);
        assert!(!config.crash_monitor.enabled);
        assert_eq!(config.crash_monitor.max_restart_attempts, 3);
        assert!(config.crash_monitor.enable_auto_restart);
    }

    #[test]
    fn test_parse_toml_crash_monitor() {
        let config = MonitorConfig::parse_toml(
            r#"
            update_interval_ms = 5000

            [log_source]
            local_path = "/srv/logs"
            log_file_name = "console.log"

            [crash_monitor]
            enabled = true
            server_exe_path = "/srv/reforger/ArmaReforgerServer"
            server_working_dir = "/srv/reforger"
            crash_keywords = ["Application crashed", "Unhandled exception"]
            max_restart_attempts = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.update_interval_ms, 5000);
        assert!(config.crash_monitor.enabled);
        assert_eq!(config.crash_monitor.crash_keywords.len(), 2);
        assert_eq!(config.crash_monitor.max_restart_attempts, 0);
        assert_eq!(
            config.crash_monitor.target_process_name().as_deref(),
            Some("ArmaReforgerServer")
        );
    }

    #[test]
    fn test_parse_json() {
        let config = MonitorConfig::parse_json(
            r#"{
                "log_source": { "local_path": "/srv/logs", "scan_window_lines": 50 },
                "victory_duplicate_check_minutes": 5
            }"#,
        )
        .unwrap();

        assert_eq!(config.log_source.scan_window_lines, 50);
        assert_eq!(config.victory_window(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_validate_empty_log_root() {
        let config = MonitorConfig::for_log_root("");
        assert!(matches!(
            config.validate(),
            Err(FpsmonError::MissingConfigField(_))
        ));
    }

    #[test]
    fn test_validate_zero_window() {
        let mut config = MonitorConfig::for_log_root("/srv/logs");
        config.log_source.scan_window_lines = 0;
        assert!(matches!(
            config.validate(),
            Err(FpsmonError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_crash_monitor_validate() {
        let temp_dir = TempDir::new().unwrap();
        let mut crash = CrashMonitorConfig::default();
        assert!(matches!(
            crash.validate(),
            Err(FpsmonError::MissingConfigField(_))
        ));

        crash.server_exe_path = temp_dir.path().join("server.sh");
        crash.server_working_dir = temp_dir.path().to_path_buf();
        crash.crash_keywords = vec!["Crash".to_string()];
        assert!(crash.validate().is_ok());

        crash.crash_keywords.push(String::new());
        assert!(crash.validate().is_err());
    }

    #[test]
    fn test_process_name_override() {
        let crash = CrashMonitorConfig {
            server_exe_path: PathBuf::from("/srv/start.sh"),
            process_name: Some("ArmaReforgerServer".to_string()),
            ..CrashMonitorConfig::default()
        };
        assert_eq!(
            crash.target_process_name().as_deref(),
            Some("ArmaReforgerServer")
        );
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("FPSMON_TEST_ROOT", "/srv/game");

        let mut config = MonitorConfig::for_log_root("${FPSMON_TEST_ROOT}/logs");
        config.data_dir = PathBuf::from("$FPSMON_TEST_ROOT/data");
        config.expand_env_vars();

        assert_eq!(config.log_source.local_path, PathBuf::from("/srv/game/logs"));
        assert_eq!(config.data_dir, PathBuf::from("/srv/game/data"));
    }

    #[test]
    fn test_expand_env_vars_matches_whole_names() {
        std::env::set_var("FPSMON_TEST_HOME", "/home/game");
        std::env::remove_var("FPSMON_TEST_HOMEDIR");

        assert_eq!(
            expand_env_in_string("$FPSMON_TEST_HOMEDIR/logs"),
            "$FPSMON_TEST_HOMEDIR/logs"
        );
        assert_eq!(
            expand_env_in_string("${FPSMON_TEST_HOME}DIR/logs"),
            "/home/gameDIR/logs"
        );
        assert_eq!(
            expand_env_in_string("$FPSMON_TEST_HOME/logs-$FPSMON_TEST_HOME"),
            "/home/game/logs-/home/game"
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        let mut config = MonitorConfig::for_log_root("/srv/logs");
        config.victory_duplicate_check_minutes = i64::MAX as u64;
        assert!(matches!(
            config.validate(),
            Err(FpsmonError::ConfigValidation(_))
        ));
        // Unvalidated configs are clamped instead of overflowing
        assert_eq!(config.victory_window(), chrono::Duration::minutes(525_600));

        let temp_dir = TempDir::new().unwrap();
        let mut crash = CrashMonitorConfig {
            server_exe_path: temp_dir.path().join("server.sh"),
            server_working_dir: temp_dir.path().to_path_buf(),
            ..CrashMonitorConfig::default()
        };
        assert!(crash.validate().is_ok());

        crash.restart_cooldown_minutes = u64::MAX / 2;
        assert!(matches!(
            crash.validate(),
            Err(FpsmonError::ConfigValidation(_))
        ));
        assert_eq!(crash.restart_cooldown(), chrono::Duration::minutes(525_600));

        crash.restart_cooldown_minutes = 5;
        crash.stats_log_rotation_hours = u64::MAX;
        assert!(crash.validate().is_err());
        assert_eq!(crash.stats_log_rotation(), chrono::Duration::hours(8_760));

        crash.stats_log_rotation_hours = 24;
        crash.stats_log_interval_secs = u64::MAX;
        assert!(crash.validate().is_err());
    }

    #[test]
    fn test_from_file_rejects_huge_victory_window() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fpsmon.json");
        fs::write(
            &config_path,
            r#"{
                "log_source": { "local_path": "/srv/logs" },
                "victory_duplicate_check_minutes": 9223372036854775807
            }"#,
        )
        .unwrap();

        assert!(matches!(
            MonitorConfig::from_file(&config_path),
            Err(FpsmonError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_from_file_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fpsmon.toml");
        fs::write(
            &config_path,
            r#"
            [log_source]
            local_path = "/srv/logs"
            "#,
        )
        .unwrap();

        let config = MonitorConfig::from_file(&config_path).unwrap();
        assert_eq!(config.log_source.local_path, PathBuf::from("/srv/logs"));
    }

    #[test]
    fn test_from_file_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fpsmon.yaml");
        fs::write(&config_path, "log_source: {}").unwrap();

        let result = MonitorConfig::from_file(&config_path);
        assert!(matches!(result, Err(FpsmonError::InvalidConfig(_))));
    }
}
