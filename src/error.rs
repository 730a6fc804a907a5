//! Error types for the anomaly monitor

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Fetch failed or returned incomplete columns. The instrument is skipped
    /// for the current cycle.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Interpretation failed: {0}")]
    InterpretationFailed(String),

    #[error("Notification via {channel} failed: {reason}")]
    NotificationFailed { channel: String, reason: String },

    /// A stored alert record could not be compared with a new finding.
    #[error("State corruption: {0}")]
    StateCorruption(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config loading error: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}

impl MonitorError {
    /// Whether this error means "skip the instrument this cycle" rather than
    /// something worth surfacing louder.
    pub fn is_skippable(&self) -> bool {
        matches!(self, MonitorError::DataUnavailable(_) | MonitorError::Http(_))
    }
}
