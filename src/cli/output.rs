// Output formatting and display for CLI

use crate::monitor::{CurrentStats, MetricsView, VictoriesView};
use crate::process::{format_uptime_short, Incident, IncidentKind};
use crate::tracking::{Faction, UptimeSnapshot, UptimeStatus};
use crate::metrics::MetricPoint;
use chrono::{DateTime, Local, Utc};
use colored::*;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print the latest stats and, when known, the tracked server PID
pub fn print_status(stats: &CurrentStats, uptime: &UptimeSnapshot, pid: Option<u32>) {
    println!("\n{}", "Server Status".bold().underline());
    println!();
    println!("  {:<16} {}", "FPS:".bold(), format_value(stats.fps));
    println!("  {:<16} {}", "Players:".bold(), format_value(stats.players));
    println!("  {:<16} {}", "Uptime:".bold(), format_uptime(uptime));

    if let Some(winner) = stats.last_round_winner {
        println!("  {:<16} {}", "Last Winner:".bold(), format_faction(winner));
    }

    match pid {
        Some(pid) => println!("  {:<16} {}", "Server PID:".bold(), pid),
        None => println!("  {:<16} {}", "Server PID:".bold(), "-".bright_black()),
    }

    println!();
}

pub fn print_uptime(uptime: &UptimeSnapshot) {
    println!("\n{}", "Uptime".bold().underline());
    println!();
    println!("  {:<16} {}", "Status:".bold(), format_uptime_status(uptime.status));
    println!("  {:<16} {}", "Uptime:".bold(), format_uptime(uptime));

    if let Some(start) = uptime.start_time {
        println!("  {:<16} {}", "Started:".bold(), format_local(start));
    }
    if uptime.status == UptimeStatus::Active {
        println!(
            "  {:<16} {}",
            "Total Hours:".bold(),
            uptime.uptime.total_hours
        );
    }

    println!();
}

/// Print a metrics table, oldest point first
pub fn print_metrics(view: &MetricsView) {
    println!(
        "\n{} {}",
        format!("{} ({})", view.kind.to_string().to_uppercase(), view.granularity)
            .bold()
            .underline(),
        format!("latest: {}", format_value(view.latest)).dimmed()
    );

    if view.points.is_empty() {
        println!("{}", "No data recorded yet".yellow());
        return;
    }

    #[derive(Tabled)]
    struct PointRow {
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Min")]
        min: String,
        #[tabled(rename = "Max")]
        max: String,
        #[tabled(rename = "Samples")]
        count: String,
    }

    let rows: Vec<PointRow> = view
        .points
        .iter()
        .map(|point| match point {
            MetricPoint::Raw { timestamp, value } => PointRow {
                time: format_local(*timestamp),
                value: format!("{:.1}", value),
                min: "-".to_string(),
                max: "-".to_string(),
                count: "1".to_string(),
            },
            MetricPoint::Rollup {
                timestamp,
                average,
                min,
                max,
                count,
            } => PointRow {
                time: format_local(*timestamp),
                value: format!("{:.1}", average),
                min: format!("{:.1}", min),
                max: format!("{:.1}", max),
                count: count.to_string(),
            },
        })
        .collect();

    print_table(rows);
    if let Some(updated) = view.last_updated {
        println!(
            "{}",
            format!("Last updated: {}", format_local(updated))
                .dimmed()
                .italic()
        );
    }
}

/// Print victory totals and recent history
pub fn print_victories(view: &VictoriesView) {
    println!("\n{}", "Victories".bold().underline());
    println!();
    println!("  {:<16} {}", "NATO:".bold(), view.nato.to_string().blue());
    println!("  {:<16} {}", "RUSSIA:".bold(), view.russia.to_string().red());
    println!("  {:<16} {}", "Total:".bold(), view.total);

    if let Some(first) = view.first_victory {
        println!("  {:<16} {}", "First Victory:".bold(), format_local(first));
    }

    if view.history.is_empty() {
        println!("\n{}", "No victories recorded yet".yellow());
        return;
    }

    #[derive(Tabled)]
    struct VictoryRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Faction")]
        faction: String,
        #[tabled(rename = "Time")]
        time: String,
    }

    let rows: Vec<VictoryRow> = view
        .history
        .iter()
        .map(|entry| VictoryRow {
            id: entry.id.to_string(),
            faction: format_faction(entry.faction),
            time: format_local(entry.timestamp),
        })
        .collect();

    print_table(rows);
    println!(
        "{}",
        format!("Showing {} of {} victories", view.history.len(), view.history_count)
            .dimmed()
            .italic()
    );
}

/// Print incidents, newest first
pub fn print_incidents(incidents: &[Incident]) {
    if incidents.is_empty() {
        println!("{}", "No incidents recorded".yellow());
        return;
    }

    #[derive(Tabled)]
    struct IncidentRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Keyword")]
        keyword: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "Info")]
        info: String,
    }

    let rows: Vec<IncidentRow> = incidents
        .iter()
        .map(|incident| IncidentRow {
            id: incident.id.to_string(),
            time: incident.timestamp.clone(),
            kind: format_kind_colored(incident.kind),
            keyword: incident.keyword.clone().unwrap_or_else(|| "-".to_string()),
            uptime: incident.uptime.clone().unwrap_or_else(|| "-".to_string()),
            info: truncate(incident.info.as_deref().unwrap_or("-"), 60),
        })
        .collect();

    print_table(rows);
    println!(
        "{}",
        format!("Total: {} incident(s)", incidents.len())
            .dimmed()
            .italic()
    );
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
}

fn format_kind_colored(kind: IncidentKind) -> String {
    match kind {
        IncidentKind::Crash => kind.to_string().red().bold().to_string(),
        IncidentKind::Restart => kind.to_string().yellow().to_string(),
        IncidentKind::Startup => kind.to_string().green().to_string(),
        IncidentKind::Shutdown => kind.to_string().bright_black().to_string(),
    }
}

fn format_faction(faction: Faction) -> String {
    match faction {
        Faction::Nato => faction.to_string().blue().to_string(),
        Faction::Russia => faction.to_string().red().to_string(),
    }
}

fn format_uptime_status(status: UptimeStatus) -> String {
    match status {
        UptimeStatus::Active => "active".green().to_string(),
        UptimeStatus::Detecting => "detecting".yellow().to_string(),
        UptimeStatus::Error => "error".red().bold().to_string(),
    }
}

fn format_uptime(uptime: &UptimeSnapshot) -> String {
    match uptime.uptime_ms() {
        Some(ms) => format_uptime_short(ms / 1000),
        None => "-".bright_black().to_string(),
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}", v),
        None => "N/A".bright_black().to_string(),
    }
}

fn format_local(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Truncate a string to at most `max_len` characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a very long string", 10), "this is...");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(59.94)), "59.9");
    }
}
