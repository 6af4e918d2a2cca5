//! Exporter Configuration
//!
//! YAML-backed configuration model: gateway-wide defaults, per-service
//! credential overrides, batch and connect timeouts, and the two service
//! lists the probe set is flattened from. Snapshots are immutable and
//! versioned; the loader in [`loader`] swaps them atomically.

pub mod loader;

pub use loader::{ConfigSource, FileConfigSource};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ExporterError, Result};

fn default_timeout_seconds() -> u64 {
    55
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_auth_error_markers() -> Vec<String> {
    vec![
        "password authentication failed".to_string(),
        "access denied".to_string(),
        "authentication failed".to_string(),
        "login failed".to_string(),
    ]
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Username applied to services that do not set their own
    #[serde(default)]
    pub default_username: String,
    /// Password applied to services that do not set their own
    #[serde(default)]
    pub default_password: String,
    /// Wall-clock deadline for one probe batch, shared by every probe
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Connection establishment timeout applied per probe attempt
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    /// Substrings (matched case-insensitively) that classify a query
    /// failure as an authentication failure when the driver exposes no
    /// structured code
    #[serde(default = "default_auth_error_markers")]
    pub auth_error_markers: Vec<String>,
    #[serde(default)]
    pub status_services: Vec<StatusService>,
    #[serde(default)]
    pub query_services: Vec<QueryService>,
}

/// A service probed by HTTP GET against one or more status paths.
///
/// An empty `status_paths` list means the service URL itself is the
/// status endpoint and yields a single probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusService {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub status_paths: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A service probed by executing SQL queries through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryService {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Validate the loaded document before it replaces the active snapshot.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            return Err(ExporterError::Configuration(
                "timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_seconds == 0 {
            return Err(ExporterError::Configuration(
                "connect_timeout_seconds must be at least 1".to_string(),
            ));
        }

        for service in &self.status_services {
            if service.name.trim().is_empty() {
                return Err(ExporterError::Configuration(
                    "status service with empty name".to_string(),
                ));
            }
            let url = Url::parse(&service.url).map_err(|e| {
                ExporterError::Configuration(format!(
                    "status service '{}' has invalid url '{}': {e}",
                    service.name, service.url
                ))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ExporterError::Configuration(format!(
                    "status service '{}' must use http or https, got '{}'",
                    service.name,
                    url.scheme()
                )));
            }
            if service.status_paths.iter().any(|p| p.trim().is_empty()) {
                return Err(ExporterError::Configuration(format!(
                    "status service '{}' has an empty status path",
                    service.name
                )));
            }
        }

        for service in &self.query_services {
            if service.name.trim().is_empty() {
                return Err(ExporterError::Configuration(
                    "query service with empty name".to_string(),
                ));
            }
            if service.url.trim().is_empty() {
                return Err(ExporterError::Configuration(format!(
                    "query service '{}' has an empty url",
                    service.name
                )));
            }
            if service.queries.iter().any(|q| q.trim().is_empty()) {
                return Err(ExporterError::Configuration(format!(
                    "query service '{}' has an empty query",
                    service.name
                )));
            }
        }

        Ok(())
    }
}

/// One immutable, versioned configuration generation.
///
/// `version` increases by one per successful reload; callers compare
/// snapshot identity (`Arc::ptr_eq`) to detect "unchanged".
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub config: GatewayConfig,
}
