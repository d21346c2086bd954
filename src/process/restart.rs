use crate::config::CrashMonitorConfig;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Restart policy, consulted on every crash
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Whether automatic restart is enabled
    pub enabled: bool,
    /// Maximum attempts over the supervisor lifetime (0 = unlimited)
    pub max_attempts: u32,
    /// Minimum time between two restarts
    pub cooldown: Duration,
    /// Wait before spawning the replacement
    pub delay: std::time::Duration,
}

impl RestartPolicy {
    pub fn from_config(config: &CrashMonitorConfig) -> Self {
        Self {
            enabled: config.enable_auto_restart,
            max_attempts: config.max_restart_attempts,
            cooldown: config.restart_cooldown(),
            delay: config.restart_delay(),
        }
    }

    /// Decide whether a crash at `now` may be followed by a restart
    pub fn evaluate(&self, tracker: &RestartTracker, now: DateTime<Utc>) -> RestartDecision {
        if !self.enabled {
            return RestartDecision::Disabled;
        }

        if self.max_attempts > 0 && tracker.attempts() >= self.max_attempts {
            return RestartDecision::AttemptsExhausted {
                attempts: tracker.attempts(),
                max: self.max_attempts,
            };
        }

        // No cooldown before the first restart
        if let Some(last) = tracker.last_restart() {
            let elapsed = now - last;
            if elapsed < self.cooldown {
                return RestartDecision::CoolingDown {
                    remaining: self.cooldown - elapsed,
                };
            }
        }

        RestartDecision::Restart
    }
}

/// Outcome of the restart policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart,
    Disabled,
    AttemptsExhausted { attempts: u32, max: u32 },
    CoolingDown { remaining: Duration },
}

impl RestartDecision {
    pub fn is_restart(&self) -> bool {
        matches!(self, RestartDecision::Restart)
    }
}

impl fmt::Display for RestartDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartDecision::Restart => write!(f, "restart allowed"),
            RestartDecision::Disabled => write!(f, "auto-restart is disabled"),
            RestartDecision::AttemptsExhausted { attempts, max } => write!(
                f,
                "maximum restart attempts reached ({}/{})",
                attempts, max
            ),
            RestartDecision::CoolingDown { remaining } => write!(
                f,
                "restart cooldown active, {:.1} minutes remaining",
                remaining.num_seconds() as f64 / 60.0
            ),
        }
    }
}

/// Restart history for the supervised server
#[derive(Debug, Clone, Default)]
pub struct RestartTracker {
    attempts: u32,
    last_restart: Option<DateTime<Utc>>,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a restart attempt, successful or not
    pub fn record_attempt(&mut self, now: DateTime<Utc>) -> u32 {
        self.attempts += 1;
        self.last_restart = Some(now);
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_restart(&self) -> Option<DateTime<Utc>> {
        self.last_restart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy(max_attempts: u32, cooldown_minutes: i64) -> RestartPolicy {
        RestartPolicy {
            enabled: true,
            max_attempts,
            cooldown: Duration::minutes(cooldown_minutes),
            delay: std::time::Duration::ZERO,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_from_config() {
        let config = CrashMonitorConfig {
            enable_auto_restart: false,
            max_restart_attempts: 7,
            restart_cooldown_minutes: 2,
            restart_delay_seconds: 15,
            ..CrashMonitorConfig::default()
        };
        let policy = RestartPolicy::from_config(&config);
        assert!(!policy.enabled);
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.cooldown, Duration::minutes(2));
        assert_eq!(policy.delay, std::time::Duration::from_secs(15));
    }

    #[test]
    fn test_disabled() {
        let mut p = policy(3, 0);
        p.enabled = false;
        assert_eq!(p.evaluate(&RestartTracker::new(), t0()), RestartDecision::Disabled);
    }

    #[test]
    fn test_first_restart_skips_cooldown() {
        let p = policy(3, 60);
        assert!(p.evaluate(&RestartTracker::new(), t0()).is_restart());
    }

    #[test]
    fn test_cooldown() {
        let p = policy(0, 5);
        let mut tracker = RestartTracker::new();
        tracker.record_attempt(t0());

        let decision = p.evaluate(&tracker, t0() + Duration::minutes(2));
        assert_eq!(
            decision,
            RestartDecision::CoolingDown {
                remaining: Duration::minutes(3)
            }
        );
        assert!(p.evaluate(&tracker, t0() + Duration::minutes(5)).is_restart());
    }

    #[test]
    fn test_attempt_budget() {
        let p = policy(2, 0);
        let mut tracker = RestartTracker::new();
        assert!(p.evaluate(&tracker, t0()).is_restart());
        tracker.record_attempt(t0());
        assert!(p.evaluate(&tracker, t0()).is_restart());
        tracker.record_attempt(t0());
        assert_eq!(
            p.evaluate(&tracker, t0()),
            RestartDecision::AttemptsExhausted { attempts: 2, max: 2 }
        );
    }

    #[test]
    fn test_unlimited_attempts() {
        let p = policy(0, 0);
        let mut tracker = RestartTracker::new();
        for _ in 0..50 {
            tracker.record_attempt(t0());
        }
        assert!(p.evaluate(&tracker, t0()).is_restart());
        assert_eq!(tracker.attempts(), 50);
    }
}
