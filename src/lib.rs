// Library exports for fpsmon

pub mod cli;
pub mod config;
pub mod error;
pub mod logs;
pub mod metrics;
pub mod monitor;
pub mod perf;
pub mod process;
pub mod state;
pub mod tracking;

pub use config::MonitorConfig;
pub use error::{FpsmonError, Result};
pub use monitor::{Monitor, TickReport};
