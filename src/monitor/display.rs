use super::Monitor;
use crate::logs::LogSource;
use crate::metrics::MetricKind;
use crate::process::{format_uptime_short, ProcessBackend, SupervisorState};
use chrono::{DateTime, Utc};
use std::io::Write;
use tracing::debug;

const TITLE_PREFIX: &str = "Arma Reforger Server";

/// Terminal window title, set through the OSC 0 escape sequence
#[derive(Debug, Default)]
pub struct TitleDisplay {
    enabled: bool,
    changed: bool,
    current: Option<String>,
}

impl TitleDisplay {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            changed: false,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Update the title; unchanged titles are not rewritten
    pub fn set(&mut self, title: String) {
        if self.current.as_deref() == Some(title.as_str()) {
            return;
        }
        if self.enabled {
            write_title(&title);
            self.changed = true;
        }
        debug!("Status: {}", title);
        self.current = Some(title);
    }

    /// Clear the title we set
    pub fn restore(&mut self) {
        if self.enabled && self.changed {
            write_title("");
            self.changed = false;
        }
        self.current = None;
    }
}

fn write_title(title: &str) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "\x1b]0;{}\x07", title);
    let _ = stdout.flush();
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// One-line status of the monitor at `now`
pub fn status_title<S: LogSource, B: ProcessBackend>(
    monitor: &Monitor<S, B>,
    now: DateTime<Utc>,
) -> String {
    let fps = monitor.metrics().latest(MetricKind::Fps);
    let players = monitor.metrics().latest(MetricKind::Players);

    let Some(supervisor) = monitor.supervisor() else {
        let uptime = monitor
            .uptime(now)
            .uptime
            .formatted
            .unwrap_or_else(|| "N/A".to_string());
        return format!(
            "{} | FPS: {} | Players: {} | Uptime: {}",
            TITLE_PREFIX,
            or_na(fps),
            or_na(players),
            uptime
        );
    };

    let restart_info = if supervisor.policy().enabled {
        "AutoRestart: ON"
    } else {
        "AutoRestart: OFF"
    };

    if supervisor.state() == SupervisorState::CrashDetected {
        return format!("{} | Status: CRASHED!", TITLE_PREFIX);
    }

    match supervisor.tracked() {
        Some(process) => format!(
            "{} | FPS: {} | Players: {} | Uptime: {} | Mem: {}MB | PID: {} | {}",
            TITLE_PREFIX,
            or_na(supervisor.last_fps().or(fps)),
            or_na(supervisor.last_players().map(f64::from).or(players)),
            format_uptime_short(process.uptime_secs(now)),
            process.memory_mb,
            process.pid,
            restart_info
        ),
        None => format!(
            "{} | Status: No Server Running | Last FPS: {} | Last Players: {} | {}",
            TITLE_PREFIX,
            or_na(supervisor.last_fps()),
            or_na(supervisor.last_players()),
            restart_info
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_display_only_records() {
        let mut display = TitleDisplay::new(false);
        display.set("FPS: 60".to_string());
        assert_eq!(display.current(), Some("FPS: 60"));

        display.restore();
        assert!(display.current().is_none());
    }

    #[test]
    fn test_or_na() {
        assert_eq!(or_na::<f64>(None), "N/A");
        assert_eq!(or_na(Some(59.5)), "59.5");
    }
}
