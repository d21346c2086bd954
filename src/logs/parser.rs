use crate::tracking::Faction;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static PERFORMANCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FPS:\s+([\d.]+).*?Player:\s+(\d+)").expect("valid regex"));

static VICTORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(NATO|RUSSIA|USSR)\s+won\s+the\s+conflict").expect("valid regex")
});

static MATCH_DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Match Duration:\s*(.+?)(?:\s*\||$)").expect("valid regex"));

static BASES_CAPTURED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Base Captured:\s*(\d+)").expect("valid regex"));

static PLAYERS_KILLED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Total Players Killed.*?:\s*(\d+)").expect("valid regex"));

static ADMIN_WINNER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ServerAdminTools.*serveradmintools_game_ended.*winner:\s*(NATO|RUSSIA)")
        .expect("valid regex")
});

/// A server performance line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSample {
    pub fps: f64,
    pub players: u32,
}

/// Round statistics found in the window; each field keeps its last match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub match_duration: Option<String>,
    pub bases_captured: Option<u32>,
    pub players_killed: Option<u32>,
    pub winner: Option<Faction>,
}

impl RoundSummary {
    pub fn is_empty(&self) -> bool {
        self.match_duration.is_none()
            && self.bases_captured.is_none()
            && self.players_killed.is_none()
            && self.winner.is_none()
    }
}

/// Everything extracted from one line window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Newest performance line
    pub performance: Option<PerformanceSample>,
    /// Newest victory declaration
    pub victory: Option<Faction>,
    pub round: RoundSummary,
    /// Highest priority crash keyword present in the window
    pub crash_keyword: Option<String>,
}

/// Scans a line window for telemetry, outcomes and crash keywords
#[derive(Debug, Clone, Default)]
pub struct LogParser {
    crash_keywords: Vec<String>,
}

impl LogParser {
    /// Keywords are checked in the given order
    pub fn new(crash_keywords: Vec<String>) -> Self {
        Self { crash_keywords }
    }

    pub fn crash_keywords(&self) -> &[String] {
        &self.crash_keywords
    }

    /// Scan `lines` (oldest first) in a single pass
    pub fn scan<S: AsRef<str>>(&self, lines: &[S]) -> ScanReport {
        let mut report = ScanReport::default();
        let mut keyword_rank: Option<usize> = None;

        // Newest to oldest: the first performance and victory hits win, the
        // first round field seen is the last one written.
        for line in lines.iter().rev() {
            let line = line.as_ref();

            if report.performance.is_none() {
                report.performance = parse_performance(line);
            }

            if report.victory.is_none() {
                report.victory = parse_victory(line);
            }

            let round = &mut report.round;
            if round.match_duration.is_none() {
                round.match_duration = MATCH_DURATION_RE
                    .captures(line)
                    .map(|c| c[1].trim().to_string())
                    .filter(|s| !s.is_empty());
            }
            if round.bases_captured.is_none() {
                round.bases_captured = capture_u32(&BASES_CAPTURED_RE, line);
            }
            if round.players_killed.is_none() {
                round.players_killed = capture_u32(&PLAYERS_KILLED_RE, line);
            }
            if round.winner.is_none() {
                round.winner = ADMIN_WINNER_RE
                    .captures(line)
                    .and_then(|c| Faction::from_log_name(&c[1]));
            }

            if keyword_rank != Some(0) {
                let limit = keyword_rank.unwrap_or(self.crash_keywords.len());
                if let Some(rank) = self.crash_keywords[..limit]
                    .iter()
                    .position(|k| line.contains(k.as_str()))
                {
                    keyword_rank = Some(rank);
                }
            }
        }

        report.crash_keyword = keyword_rank.map(|rank| self.crash_keywords[rank].clone());
        report
    }
}

fn parse_performance(line: &str) -> Option<PerformanceSample> {
    let caps = PERFORMANCE_RE.captures(line)?;
    let Some(fps) = leading_number(&caps[1]) else {
        debug!("Ignoring unreadable FPS value '{}'", &caps[1]);
        return None;
    };
    let players = caps[2].parse::<u32>().ok()?;
    Some(PerformanceSample { fps, players })
}

/// Parse the numeric prefix of `[\d.]+`, so "1.2.3" reads as 1.2
fn leading_number(raw: &str) -> Option<f64> {
    let end = raw
        .char_indices()
        .filter(|(_, c)| *c == '.')
        .nth(1)
        .map_or(raw.len(), |(i, _)| i);
    raw[..end].parse().ok()
}

fn parse_victory(line: &str) -> Option<Faction> {
    VICTORY_RE
        .captures(line)
        .and_then(|c| Faction::from_log_name(&c[1]))
}

fn capture_u32(re: &Regex, line: &str) -> Option<u32> {
    re.captures(line).and_then(|c| c[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> LogParser {
        LogParser::new(vec![
            "Application crashed".to_string(),
            "Unhandled exception".to_string(),
        ])
    }

    #[test]
    fn test_newest_performance_line_wins() {
        let lines = [
            "12:00:00 DEFAULT      : FPS: 48.2, frame time (avg: 20.7 ms) Player: 12",
            "12:00:10 SCRIPT       : something unrelated",
            "12:00:20 DEFAULT      : FPS: 55.9, frame time (avg: 17.9 ms) Player: 31",
        ];
        let report = parser().scan(&lines);
        assert_eq!(
            report.performance,
            Some(PerformanceSample {
                fps: 55.9,
                players: 31
            })
        );
    }

    #[test]
    fn test_fps_with_extra_dots_uses_numeric_prefix() {
        let report = parser().scan(&["DEFAULT : FPS: 1.2.3, frame time (avg: 9.0 ms) Player: 4"]);
        assert_eq!(
            report.performance,
            Some(PerformanceSample {
                fps: 1.2,
                players: 4
            })
        );

        let lines = [
            "DEFAULT : FPS: 40.0, frame time (avg: 25.0 ms) Player: 8",
            "DEFAULT : FPS: ..., frame time (avg: 0.0 ms) Player: 9",
        ];
        let report = parser().scan(&lines);
        assert_eq!(report.performance.map(|p| p.players), Some(8));
    }

    #[test]
    fn test_victory_factions() {
        let report = parser().scan(&["SCRIPT : USSR won the conflict!"]);
        assert_eq!(report.victory, Some(Faction::Russia));

        let report = parser().scan(&["SCRIPT : nato Won The Conflict!"]);
        assert_eq!(report.victory, Some(Faction::Nato));

        let report = parser().scan(&["SCRIPT : NATO won the conflict!", "Russia won the conflict"]);
        assert_eq!(report.victory, Some(Faction::Russia));
    }

    #[test]
    fn test_round_summary_last_match_wins() {
        let lines = [
            "Match Duration: 00:41:10 | Base Captured: 3",
            "Total Players Killed (all): 17",
            "Match Duration: 01:02:33 | Base Captured: 5",
            "ServerAdminTools | event serveradmintools_game_ended | winner: RUSSIA",
        ];
        let report = parser().scan(&lines);
        assert_eq!(report.round.match_duration.as_deref(), Some("01:02:33"));
        assert_eq!(report.round.bases_captured, Some(5));
        assert_eq!(report.round.players_killed, Some(17));
        assert_eq!(report.round.winner, Some(Faction::Russia));
        assert!(report.victory.is_none());
    }

    #[test]
    fn test_match_duration_to_end_of_line() {
        let report = parser().scan(&["Match Duration: 25 minutes"]);
        assert_eq!(report.round.match_duration.as_deref(), Some("25 minutes"));
    }

    #[test]
    fn test_crash_keyword_priority() {
        let lines = [
            "ENGINE : Unhandled exception at 0x0000",
            "ENGINE : Application crashed",
            "ENGINE : Unhandled exception at 0x0000",
        ];
        let report = parser().scan(&lines);
        assert_eq!(report.crash_keyword.as_deref(), Some("Application crashed"));

        let report = parser().scan(&["Unhandled exception", "Unhandled exception"]);
        assert_eq!(report.crash_keyword.as_deref(), Some("Unhandled exception"));
    }

    #[test]
    fn test_empty_window_yields_no_data() {
        let empty: [&str; 0] = [];
        let report = parser().scan(&empty);
        assert_eq!(report, ScanReport::default());
        assert!(report.round.is_empty());

        let report = LogParser::default().scan(&["Application crashed"]);
        assert!(report.crash_keyword.is_none());
    }
}
