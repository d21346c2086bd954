use crate::error::{FpsmonError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// A server session directory under the log root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDir {
    pub path: PathBuf,
    /// Creation time, or modification time where birth time is unavailable
    pub created: DateTime<Utc>,
}

/// The trailing window of a log file
#[derive(Debug, Clone)]
pub struct LogWindow {
    pub path: PathBuf,
    pub lines: Vec<String>,
}

/// What one poll saw: the newest session and, once written, its log
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    pub session: SessionDir,
    pub log: Option<LogWindow>,
}

/// Provider of the current log content.
///
/// `Ok(None)` means there is no session yet; errors are reserved for a
/// source that exists but cannot be read.
#[async_trait]
pub trait LogSource: Send {
    /// Newest session and the last `window` lines of its log file
    async fn poll(&mut self, window: usize) -> Result<Option<LogSnapshot>>;

    /// Move a crashed log aside so it is not scanned again
    async fn quarantine(&mut self, path: &Path, now: DateTime<Utc>) -> Result<PathBuf>;
}

/// Reads `<root>/<newest session>/<file_name>` from the local filesystem
#[derive(Debug, Clone)]
pub struct LocalLogSource {
    root: PathBuf,
    file_name: String,
}

impl LocalLogSource {
    pub fn new<P: AsRef<Path>>(root: P, file_name: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            file_name: file_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl LogSource for LocalLogSource {
    async fn poll(&mut self, window: usize) -> Result<Option<LogSnapshot>> {
        let Some(session) = find_latest_session(&self.root).await? else {
            return Ok(None);
        };

        let path = session.path.join(&self.file_name);
        let log = if path.exists() {
            let lines = read_last_lines(&path, window).await?;
            Some(LogWindow { path, lines })
        } else {
            debug!(path = %path.display(), "log file not present yet");
            None
        };

        Ok(Some(LogSnapshot { session, log }))
    }

    async fn quarantine(&mut self, path: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let target = parent.join(crashed_log_name(now));

        tokio::fs::rename(path, &target).await.map_err(|e| {
            FpsmonError::Quarantine(format!("{} -> {}: {}", path.display(), target.display(), e))
        })?;

        info!(from = %path.display(), to = %target.display(), "renamed crashed log file");
        Ok(target)
    }
}

/// File name a crashed log is renamed to
pub fn crashed_log_name(now: DateTime<Utc>) -> String {
    format!("console_crashed_{}.log", now.format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

/// Newest subdirectory of `root` by creation time.
///
/// A missing root is not an error.
pub async fn find_latest_session(root: &Path) -> Result<Option<SessionDir>> {
    if !root.exists() {
        warn!(root = %root.display(), "log directory does not exist");
        return Ok(None);
    }

    let mut entries = tokio::fs::read_dir(root).await.map_err(|e| {
        FpsmonError::SourceUnavailable(format!("Failed to list {}: {}", root.display(), e))
    })?;

    let mut latest: Option<SessionDir> = None;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !metadata.is_dir() {
            continue;
        }

        let created = match metadata.created().or_else(|_| metadata.modified()) {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(_) => continue,
        };

        if latest.as_ref().map_or(true, |l| created > l.created) {
            latest = Some(SessionDir {
                path: entry.path(),
                created,
            });
        }
    }

    if latest.is_none() {
        debug!(root = %root.display(), "no session directories found");
    }

    Ok(latest)
}

/// Read the last `lines` lines of a file; a missing file yields no lines
pub async fn read_last_lines(file_path: &Path, lines: usize) -> Result<Vec<String>> {
    if !file_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(file_path).await.map_err(|e| {
        FpsmonError::SourceUnavailable(format!("Failed to open {}: {}", file_path.display(), e))
    })?;

    let mut window = std::collections::VecDeque::with_capacity(lines);
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    // Server logs are not guaranteed to be valid UTF-8
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).await.map_err(|e| {
            FpsmonError::SourceUnavailable(format!("Failed to read {}: {}", file_path.display(), e))
        })?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        if window.len() == lines {
            window.pop_front();
        }
        if lines > 0 {
            window.push_back(line);
        }
    }

    Ok(window.into_iter().collect())
}
