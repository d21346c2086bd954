// Logs module - Console log scanning and stats log output

mod parser;
mod source;
mod stats_writer;

pub use parser::{LogParser, PerformanceSample, RoundSummary, ScanReport};
pub use source::{
    crashed_log_name, find_latest_session, read_last_lines, LocalLogSource, LogSnapshot,
    LogSource, LogWindow, SessionDir,
};
pub use stats_writer::{format_stats_line, next_log_path, StatsLogWriter};
