use crate::error::{FpsmonError, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Appends periodic fps/player snapshots to rotating text files
#[derive(Debug)]
pub struct StatsLogWriter {
    dir: PathBuf,
    rotation: Duration,
    interval: Duration,
    current_path: Option<PathBuf>,
    next_rotation: Option<DateTime<Utc>>,
    last_write: Option<DateTime<Utc>>,
}

impl StatsLogWriter {
    pub fn new<P: AsRef<Path>>(dir: P, rotation: Duration, interval: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            rotation,
            interval,
            current_path: None,
            next_rotation: None,
            last_write: None,
        }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn next_rotation(&self) -> Option<DateTime<Utc>> {
        self.next_rotation
    }

    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        self.last_write
    }

    /// Whether a write at `now` respects the write interval
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last_write.map_or(true, |last| now - last >= self.interval)
    }

    /// Rotate to a fresh file when the timer elapsed or no file is set
    pub async fn ensure_current(&mut self, now: DateTime<Utc>) -> Result<PathBuf> {
        let needs_rotation = match (&self.current_path, self.next_rotation) {
            (Some(_), Some(next)) => now >= next,
            _ => true,
        };

        if needs_rotation {
            tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
                FpsmonError::StatsLog(format!(
                    "Failed to create {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;

            let local_date = now.with_timezone(&Local).date_naive();
            let path = next_log_path(&self.dir, local_date).await?;
            let next = now + self.rotation;
            info!(
                file = %path.display(),
                next_rotation = %next.with_timezone(&Local).format("%d/%m/%Y %H:%M:%S"),
                "using new server data log file"
            );
            self.current_path = Some(path);
            self.next_rotation = Some(next);
        }

        self.current_path
            .clone()
            .ok_or_else(|| FpsmonError::StatsLog("no current stats log".to_string()))
    }

    /// Append one snapshot line if the interval has elapsed.
    ///
    /// Returns whether a line was written.
    pub async fn record(&mut self, now: DateTime<Utc>, fps: f64, players: u32) -> Result<bool> {
        if !self.is_due(now) {
            return Ok(false);
        }

        let path = self.ensure_current(now).await?;
        let line = format_stats_line(now, fps, players);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                FpsmonError::StatsLog(format!("Failed to open {}: {}", path.display(), e))
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            FpsmonError::StatsLog(format!("Failed to write {}: {}", path.display(), e))
        })?;
        file.flush().await?;

        debug!(file = %path.display(), fps, players, "wrote stats line");
        self.last_write = Some(now);
        Ok(true)
    }
}

/// `server_data-DD.MM.YYYY` prefix for a local date
fn base_file_name(date: NaiveDate) -> String {
    format!("server_data-{}", date.format("%d.%m.%Y"))
}

/// Next free `server_data-DD.MM.YYYY_ID-<n>.txt` path in `dir`
pub async fn next_log_path(dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    let base = base_file_name(date);
    let prefix = format!("{}_ID-", base);
    let mut max_id = 0u32;

    if dir.exists() {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let id = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".txt"))
                .and_then(|id| id.parse::<u32>().ok());
            if let Some(id) = id {
                max_id = max_id.max(id);
            }
        }
    }

    Ok(dir.join(format!("{}{}.txt", prefix, max_id + 1)))
}

/// `[DD/MM/YYYY, HH:MM:SS] Server FPS: <fps> | Players: <players>`
pub fn format_stats_line(now: DateTime<Utc>, fps: f64, players: u32) -> String {
    format!(
        "[{}] Server FPS: {} | Players: {}\n",
        now.with_timezone(&Local).format("%d/%m/%Y, %H:%M:%S"),
        fps,
        players
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn writer(dir: &Path) -> StatsLogWriter {
        StatsLogWriter::new(dir, Duration::hours(24), Duration::seconds(60))
    }

    #[tokio::test]
    async fn test_next_log_path_increments_id() {
        let temp_dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        fs::write(temp_dir.path().join("server_data-18.10.2026_ID-1.txt"), "").unwrap();
        fs::write(temp_dir.path().join("server_data-18.10.2026_ID-4.txt"), "").unwrap();
        fs::write(temp_dir.path().join("server_data-17.10.2026_ID-9.txt"), "").unwrap();

        let path = next_log_path(temp_dir.path(), date).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "server_data-18.10.2026_ID-5.txt"
        );
    }

    #[tokio::test]
    async fn test_next_log_path_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let path = next_log_path(&temp_dir.path().join("missing"), date)
            .await
            .unwrap();
        assert!(path.ends_with("server_data-02.01.2026_ID-1.txt"));
    }

    #[tokio::test]
    async fn test_record_respects_interval() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("server_data_logs");
        let mut writer = writer(&dir);
        let now = Utc::now();

        assert!(writer.record(now, 59.5, 12).await.unwrap());
        assert!(!writer.record(now + Duration::seconds(30), 58.0, 12).await.unwrap());
        assert!(writer.record(now + Duration::seconds(60), 57.0, 13).await.unwrap());

        let content = fs::read_to_string(writer.current_path().unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] Server FPS: 59.5 | Players: 12"));
        assert!(lines[1].ends_with("] Server FPS: 57 | Players: 13"));
    }

    #[tokio::test]
    async fn test_rotation_after_timer() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = StatsLogWriter::new(temp_dir.path(), Duration::hours(1), Duration::seconds(1));
        let now = Utc::now();

        writer.record(now, 60.0, 1).await.unwrap();
        let first = writer.current_path().unwrap().to_path_buf();

        writer.record(now + Duration::minutes(30), 60.0, 1).await.unwrap();
        assert_eq!(writer.current_path().unwrap(), first);

        writer.record(now + Duration::minutes(61), 60.0, 1).await.unwrap();
        assert_ne!(writer.current_path().unwrap(), first);
        assert!(writer.next_rotation().unwrap() > now + Duration::minutes(61));
    }

    #[test]
    fn test_format_stats_line_shape() {
        let line = format_stats_line(Utc::now(), 48.25, 7);
        assert!(line.starts_with('['));
        assert!(line.contains(", "));
        assert!(line.ends_with("] Server FPS: 48.25 | Players: 7\n"));
    }
}
