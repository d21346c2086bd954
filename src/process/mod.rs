// Process module - Crash supervision of the game server process

mod backend;
mod incident;
mod pid;
mod restart;
mod supervisor;
mod types;

pub use backend::{ProcessBackend, SystemBackend};
pub use incident::{format_incident_timestamp, Incident, IncidentDetails, IncidentKind, IncidentLog};
pub use pid::PidRecord;
pub use restart::{RestartDecision, RestartPolicy, RestartTracker};
pub use supervisor::{CrashOutcome, CrashSupervisor, RoundStats};
pub use types::{
    format_uptime_incident, format_uptime_short, FoundProcess, SpawnedServer, SupervisorState,
    TrackedProcess,
};
