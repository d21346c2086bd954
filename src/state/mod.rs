// State module - Snapshot persistence for metrics, victories and uptime

use crate::error::{FpsmonError, Result};
use crate::metrics::{Bucket, MetricKind, MetricSeries, MetricsAggregator, Sample};
use crate::tracking::{UptimeTracker, VictoryState};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FPS_FILE: &str = "fps_data.json";
const PLAYERS_FILE: &str = "players_data.json";
const VICTORIES_FILE: &str = "victories_data.json";
const UPTIME_FILE: &str = "uptime_data.json";

/// On-disk form of one metric series
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeriesFile {
    #[serde(alias = "latestFPS", alias = "latestPlayerCount")]
    pub latest: Option<f64>,
    pub raw: VecDeque<Sample>,
    pub hourly: BTreeMap<String, Bucket>,
    pub daily: BTreeMap<String, Bucket>,
    pub weekly: BTreeMap<String, Bucket>,
    pub monthly: BTreeMap<String, Bucket>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl SeriesFile {
    fn from_series(series: &MetricSeries, now: DateTime<Utc>) -> Self {
        Self {
            latest: series.latest,
            raw: series.raw.clone(),
            hourly: series.hourly.clone(),
            daily: series.daily.clone(),
            weekly: series.weekly.clone(),
            monthly: series.monthly.clone(),
            last_updated: Some(now),
        }
    }

    fn into_series(self) -> MetricSeries {
        let mut series = MetricSeries {
            latest: self.latest,
            raw: self.raw,
            hourly: self.hourly,
            daily: self.daily,
            weekly: self.weekly,
            monthly: self.monthly,
        };
        series.normalize();
        series
    }
}

/// On-disk form of the victory tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VictoriesFile {
    #[serde(flatten)]
    pub state: VictoryState,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// On-disk form of the uptime tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeFile {
    #[serde(flatten)]
    pub tracker: UptimeTracker,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Everything restored at startup
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    pub metrics: MetricsAggregator,
    pub victories: VictoryState,
    pub uptime: UptimeTracker,
    /// When each metric file was last written
    pub fps_updated: Option<DateTime<Utc>>,
    pub players_updated: Option<DateTime<Utc>>,
}

impl PersistedState {
    pub fn last_updated(&self, kind: MetricKind) -> Option<DateTime<Utc>> {
        match kind {
            MetricKind::Fps => self.fps_updated,
            MetricKind::Players => self.players_updated,
        }
    }
}

/// Reads and writes the JSON snapshots in the data directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metric_path(&self, kind: MetricKind) -> PathBuf {
        match kind {
            MetricKind::Fps => self.dir.join(FPS_FILE),
            MetricKind::Players => self.dir.join(PLAYERS_FILE),
        }
    }

    pub fn victories_path(&self) -> PathBuf {
        self.dir.join(VICTORIES_FILE)
    }

    pub fn uptime_path(&self) -> PathBuf {
        self.dir.join(UPTIME_FILE)
    }

    pub fn load_series(&self, kind: MetricKind) -> Result<Option<SeriesFile>> {
        read_json(&self.metric_path(kind))
    }

    pub fn load_victories(&self) -> Result<Option<VictoriesFile>> {
        read_json(&self.victories_path())
    }

    pub fn load_uptime(&self) -> Result<Option<UptimeFile>> {
        read_json(&self.uptime_path())
    }

    /// Restore all snapshots; a missing or corrupt file yields empty state
    pub fn load(&self) -> PersistedState {
        let fps = lenient(self.load_series(MetricKind::Fps), FPS_FILE).unwrap_or_default();
        let players =
            lenient(self.load_series(MetricKind::Players), PLAYERS_FILE).unwrap_or_default();
        let victories = lenient(self.load_victories(), VICTORIES_FILE).unwrap_or_default();
        let uptime = lenient(self.load_uptime(), UPTIME_FILE).unwrap_or_default();

        let fps_updated = fps.last_updated;
        let players_updated = players.last_updated;
        let metrics = MetricsAggregator::from_series(fps.into_series(), players.into_series());

        let mut victory_state = victories.state;
        victory_state.normalize();

        info!(
            "Loaded {} FPS entries, {} player entries, {} victories",
            metrics.series(MetricKind::Fps).raw.len(),
            metrics.series(MetricKind::Players).raw.len(),
            victory_state.total
        );

        PersistedState {
            metrics,
            victories: victory_state,
            uptime: uptime.tracker,
            fps_updated,
            players_updated,
        }
    }

    /// Write every snapshot; all files are attempted even if one fails
    pub fn save(
        &self,
        metrics: &MetricsAggregator,
        victories: &VictoryState,
        uptime: &UptimeTracker,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let results = [
            write_json_atomic(
                &self.metric_path(MetricKind::Fps),
                &SeriesFile::from_series(metrics.series(MetricKind::Fps), now),
            ),
            write_json_atomic(
                &self.metric_path(MetricKind::Players),
                &SeriesFile::from_series(metrics.series(MetricKind::Players), now),
            ),
            write_json_atomic(
                &self.victories_path(),
                &VictoriesFile {
                    state: victories.clone(),
                    last_updated: Some(now),
                },
            ),
            write_json_atomic(
                &self.uptime_path(),
                &UptimeFile {
                    tracker: uptime.clone(),
                    last_updated: Some(now),
                },
            ),
        ];

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Snapshots saved to {}", self.dir.display());
                Ok(())
            }
        }
    }
}

fn lenient<T>(result: Result<Option<T>>, name: &str) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring snapshot {}: {}", name, e);
            None
        }
    }
}

/// Read a JSON file; `Ok(None)` if it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path).map_err(|e| {
        FpsmonError::Persistence(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let value = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        FpsmonError::Persistence(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    Ok(Some(value))
}

/// Write pretty JSON through a temp file and rename
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                FpsmonError::Persistence(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    // Serialize before touching the filesystem so a bad value leaves no temp file
    let json = serde_json::to_vec_pretty(value)?;
    let temp_path = path.with_extension("tmp");

    {
        let file = File::create(&temp_path).map_err(|e| {
            FpsmonError::Persistence(format!("Failed to create {}: {}", temp_path.display(), e))
        })?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&json).map_err(|e| {
            FpsmonError::Persistence(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        writer.flush().map_err(|e| {
            FpsmonError::Persistence(format!("Failed to flush {}: {}", temp_path.display(), e))
        })?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        FpsmonError::Persistence(format!("Failed to rename {}: {}", temp_path.display(), e))
    })?;

    Ok(())
}
