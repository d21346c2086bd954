use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Side that can win a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    #[serde(rename = "NATO")]
    Nato,
    #[serde(rename = "RUSSIA", alias = "USSR")]
    Russia,
}

impl Faction {
    /// Map a faction name as it appears in server logs
    pub fn from_log_name(name: &str) -> Option<Faction> {
        match name.to_ascii_uppercase().as_str() {
            "NATO" => Some(Faction::Nato),
            "RUSSIA" | "USSR" => Some(Faction::Russia),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Faction::Nato => "NATO",
            Faction::Russia => "RUSSIA",
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Faction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Faction::from_log_name(s).ok_or_else(|| format!("unknown faction: {}", s))
    }
}

/// One recorded round outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictoryEntry {
    pub faction: Faction,
    pub timestamp: DateTime<Utc>,
    /// Millisecond timestamp, strictly increasing across the history
    pub id: i64,
}

/// Win counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictoryTotals {
    pub nato: u64,
    pub russia: u64,
    pub total: u64,
}

/// Persistable victory state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VictoryState {
    pub nato: u64,
    pub russia: u64,
    pub total: u64,
    pub last_victory: Option<VictoryEntry>,
    pub first_victory: Option<DateTime<Utc>>,
    pub history: Vec<VictoryEntry>,
}

impl VictoryState {
    /// Fill in counters and markers that can be derived from the history
    pub fn normalize(&mut self) {
        if self.history.is_empty() {
            return;
        }

        if self.total == 0 && self.nato == 0 && self.russia == 0 {
            for entry in &self.history {
                match entry.faction {
                    Faction::Nato => self.nato += 1,
                    Faction::Russia => self.russia += 1,
                }
            }
            self.total = self.history.len() as u64;
        }

        if self.last_victory.is_none() {
            self.last_victory = self.history.last().cloned();
        }
        if self.first_victory.is_none() {
            self.first_victory = self.history.first().map(|e| e.timestamp);
        }
    }
}

/// Records round outcomes, discarding repeats of the same declaration
#[derive(Debug, Clone)]
pub struct VictoryTracker {
    state: VictoryState,
    window: Duration,
}

impl VictoryTracker {
    pub fn new(window: Duration) -> Self {
        Self::from_state(VictoryState::default(), window)
    }

    pub fn from_state(mut state: VictoryState, window: Duration) -> Self {
        state.normalize();
        Self { state, window }
    }

    pub fn state(&self) -> &VictoryState {
        &self.state
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a victory observed at `timestamp`.
    ///
    /// Rejected when the same faction already has an entry newer than
    /// `timestamp - window`.
    pub fn record_victory(&mut self, faction: Faction, timestamp: DateTime<Utc>) -> bool {
        let cutoff = timestamp - self.window;
        let duplicate = self
            .state
            .history
            .iter()
            .any(|e| e.faction == faction && e.timestamp > cutoff);

        if duplicate {
            debug!(
                %faction,
                window_minutes = self.window.num_minutes(),
                "duplicate victory within window, skipping"
            );
            return false;
        }

        let mut id = timestamp.timestamp_millis();
        if let Some(prev) = self.state.history.iter().map(|e| e.id).max() {
            if id <= prev {
                id = prev + 1;
            }
        }

        let entry = VictoryEntry {
            faction,
            timestamp,
            id,
        };
        self.state.history.push(entry.clone());
        self.state.last_victory = Some(entry);
        if self.state.first_victory.is_none() {
            self.state.first_victory = Some(timestamp);
        }

        match faction {
            Faction::Nato => self.state.nato += 1,
            Faction::Russia => self.state.russia += 1,
        }
        self.state.total += 1;

        info!(
            %faction,
            nato = self.state.nato,
            russia = self.state.russia,
            total = self.state.total,
            "victory recorded"
        );
        true
    }

    pub fn totals(&self) -> VictoryTotals {
        VictoryTotals {
            nato: self.state.nato,
            russia: self.state.russia,
            total: self.state.total,
        }
    }

    /// Newest first
    pub fn history(&self, limit: usize) -> Vec<VictoryEntry> {
        self.state.history.iter().rev().take(limit).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.history.len()
    }

    pub fn last_victory(&self) -> Option<&VictoryEntry> {
        self.state.last_victory.as_ref()
    }

    pub fn first_victory(&self) -> Option<DateTime<Utc>> {
        self.state.first_victory
    }
}
