// Tracking module - Round outcomes and server session uptime

mod uptime;
mod victory;

pub use uptime::{UptimeComponents, UptimeSnapshot, UptimeStatus, UptimeTracker};
pub use victory::{Faction, VictoryEntry, VictoryState, VictoryTotals, VictoryTracker};
