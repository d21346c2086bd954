use crate::error::{FpsmonError, Result};
use crate::process::types::format_uptime_incident;
use crate::state::write_json_atomic;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Kind of lifecycle event written to the incident log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentKind {
    #[serde(rename = "Server startup initiated")]
    Startup,
    #[serde(rename = "Server crash detected, keyword has been found in recent logs")]
    Crash,
    #[serde(rename = "Server shutdown detected")]
    Shutdown,
    #[serde(rename = "Server restart attempted")]
    Restart,
}

impl IncidentKind {
    pub fn label(&self) -> &'static str {
        match self {
            IncidentKind::Startup => "Startup",
            IncidentKind::Crash => "Crash",
            IncidentKind::Shutdown => "Shutdown",
            IncidentKind::Restart => "Restart",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            IncidentKind::Startup => "Server startup initiated",
            IncidentKind::Crash => "Server crash detected, keyword has been found in recent logs",
            IncidentKind::Shutdown => "Server shutdown detected",
            IncidentKind::Restart => "Server restart attempted",
        }
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One incident log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(
        rename = "Incident ID",
        serialize_with = "serialize_id",
        deserialize_with = "deserialize_id"
    )]
    pub id: u64,

    /// Local time, `DD/MM/YYYY, HH:MM`
    #[serde(rename = "Incident Timestamp")]
    pub timestamp: String,

    #[serde(rename = "Incident Type")]
    pub kind: IncidentKind,

    #[serde(rename = "Keyword", default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    #[serde(rename = "Uptime", default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,

    #[serde(
        rename = "AdditionalInfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub info: Option<String>,
}

fn serialize_id<S: Serializer>(id: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_string())
}

/// Ids were written as strings, but numbers are accepted too
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n,
        RawId::Text(s) => s.trim().parse().unwrap_or(0),
    })
}

/// Details for a new incident
#[derive(Debug, Clone, Default)]
pub struct IncidentDetails {
    pub keyword: Option<String>,
    pub uptime_secs: Option<i64>,
    pub info: Option<String>,
}

impl IncidentDetails {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..Self::default()
        }
    }

    pub fn info(info: impl Into<String>) -> Self {
        Self {
            info: Some(info.into()),
            ..Self::default()
        }
    }

    pub fn with_uptime(mut self, uptime_secs: Option<i64>) -> Self {
        self.uptime_secs = uptime_secs;
        self
    }
}

/// Append-only JSON array of incidents
#[derive(Debug, Clone)]
pub struct IncidentLog {
    path: PathBuf,
}

impl IncidentLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every recognised incident in file order.
    ///
    /// A missing or blank file is an empty log; a file holding one object
    /// is a one-element log. Entries that do not parse as an `Incident`
    /// are skipped here but kept on disk by `append`.
    pub fn load(&self) -> Result<Vec<Incident>> {
        Ok(self
            .load_entries()?
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<Incident>(entry) {
                Ok(incident) => Some(incident),
                Err(e) => {
                    debug!("Skipping unrecognised incident entry: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Raw JSON entries, recognised or not
    fn load_entries(&self) -> Result<Vec<serde_json::Value>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| FpsmonError::IncidentLogCorruption(e.to_string()))?;

        Ok(match value {
            serde_json::Value::Array(entries) => entries,
            other => vec![other],
        })
    }

    /// Like `load_entries`, but a file that is not JSON at all is moved
    /// aside to `<name>.corrupt` and the history restarts empty
    fn load_entries_or_recover(&self) -> Result<Vec<serde_json::Value>> {
        match self.load_entries() {
            Err(FpsmonError::IncidentLogCorruption(e)) => {
                let backup = self.corrupt_backup_path();
                warn!(
                    "Incident log {} is not valid JSON ({}); moving it to {}",
                    self.path.display(),
                    e,
                    backup.display()
                );
                std::fs::rename(&self.path, &backup)?;
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn corrupt_backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }

    /// Append an incident with id = prior max + 1
    pub fn append(
        &self,
        kind: IncidentKind,
        details: IncidentDetails,
        now: DateTime<Utc>,
    ) -> Result<Incident> {
        let mut entries = self.load_entries_or_recover()?;
        let next_id = entries.iter().map(entry_id).max().unwrap_or(0) + 1;

        let uptime = details
            .uptime_secs
            .filter(|secs| *secs > 0)
            .map(format_uptime_incident);

        let incident = Incident {
            id: next_id,
            timestamp: format_incident_timestamp(now),
            kind,
            keyword: details.keyword,
            uptime,
            info: details.info,
        };
        entries.push(serde_json::to_value(&incident)?);

        write_json_atomic(&self.path, &entries)?;

        info!(
            "[{}] Logged incident: '{}' (ID: {})",
            incident.timestamp,
            kind.description(),
            incident.id
        );
        if let Some(ref keyword) = incident.keyword {
            debug!("  -> Keyword: '{}'", keyword);
        }
        if let Some(ref info) = incident.info {
            debug!("  -> Info: '{}'", info);
        }

        Ok(incident)
    }

    /// Newest first by id
    pub fn list(&self, limit: usize) -> Result<Vec<Incident>> {
        let mut incidents = self.load()?;
        incidents.sort_by(|a, b| b.id.cmp(&a.id));
        incidents.truncate(limit);
        Ok(incidents)
    }
}

/// Id of a raw entry, 0 when absent or unreadable
fn entry_id(entry: &serde_json::Value) -> u64 {
    match entry.get("Incident ID") {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// `DD/MM/YYYY, HH:MM` in local time
pub fn format_incident_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%d/%m/%Y, %H:%M").to_string()
}
