//! Exporter-wide error types

use thiserror::Error;

/// Top-level error type for the exporter
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Result type alias for ExporterError
pub type Result<T> = std::result::Result<T, ExporterError>;
