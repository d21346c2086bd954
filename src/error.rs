use thiserror::Error;

/// Main error type for the fpsmon monitor
#[derive(Debug, Error)]
pub enum FpsmonError {
    // Log source errors
    #[error("Log source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Failed to quarantine log file: {0}")]
    Quarantine(String),

    #[error("Stats log error: {0}")]
    StatsLog(String),

    // Process-related errors
    #[error("Process lookup failed: {0}")]
    ProcessLookup(String),

    #[error("Failed to spawn server process: {0}")]
    Spawn(String),

    #[error("Failed to terminate process {0}: {1}")]
    Terminate(u32, String),

    #[error("Restart not attempted: {0}")]
    RestartIneligible(String),

    #[error("PID record error: {0}")]
    PidRecord(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Incident log corrupted: {0}")]
    IncidentLogCorruption(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for fpsmon operations
pub type Result<T> = std::result::Result<T, FpsmonError>;
