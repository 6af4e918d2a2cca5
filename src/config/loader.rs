//! Configuration Loading
//!
//! File-backed configuration source with modification polling. The
//! document is reloaded only when the backing file's mtime moves past
//! the one recorded at the last successful load; a failed reload leaves
//! the previous snapshot fully intact.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{ConfigSnapshot, GatewayConfig};
use crate::error::Result;

/// Source of configuration snapshots.
///
/// `current` hands out the active snapshot, loading on first use.
/// `reload_if_changed` returns the same `Arc` when the backing data is
/// unmodified, so callers detect change by snapshot identity.
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> Result<Arc<ConfigSnapshot>>;
    fn has_changed(&self) -> bool;
    fn reload_if_changed(&self) -> Result<Arc<ConfigSnapshot>>;
}

struct LoadedState {
    snapshot: Arc<ConfigSnapshot>,
    modified: SystemTime,
}

/// [`ConfigSource`] reading one YAML file, detecting change by mtime.
pub struct FileConfigSource {
    path: PathBuf,
    state: Mutex<Option<LoadedState>>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mtime(&self) -> std::io::Result<SystemTime> {
        fs::metadata(&self.path)?.modified()
    }

    fn load(&self, version: u64) -> Result<LoadedState> {
        let modified = self.mtime()?;
        let raw = fs::read_to_string(&self.path)?;
        let config: GatewayConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;

        debug!(
            config = %serde_json::to_string_pretty(&sanitize_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string()),
            "configuration document parsed"
        );
        info!(
            path = %self.path.display(),
            version,
            status_services = config.status_services.len(),
            query_services = config.query_services.len(),
            timeout_seconds = config.timeout_seconds,
            "✅ Configuration loaded"
        );

        Ok(LoadedState {
            snapshot: Arc::new(ConfigSnapshot {
                version,
                loaded_at: Utc::now(),
                config,
            }),
            modified,
        })
    }
}

impl ConfigSource for FileConfigSource {
    fn current(&self) -> Result<Arc<ConfigSnapshot>> {
        let mut state = self.state.lock();
        if let Some(loaded) = state.as_ref() {
            return Ok(Arc::clone(&loaded.snapshot));
        }
        let loaded = self.load(1)?;
        let snapshot = Arc::clone(&loaded.snapshot);
        *state = Some(loaded);
        Ok(snapshot)
    }

    fn has_changed(&self) -> bool {
        let state = self.state.lock();
        match state.as_ref() {
            None => true,
            Some(loaded) => match self.mtime() {
                Ok(modified) => modified > loaded.modified,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "config modification check failed, keeping active snapshot"
                    );
                    false
                }
            },
        }
    }

    fn reload_if_changed(&self) -> Result<Arc<ConfigSnapshot>> {
        let mut state = self.state.lock();
        let Some(loaded) = state.as_mut() else {
            let loaded = self.load(1)?;
            let snapshot = Arc::clone(&loaded.snapshot);
            *state = Some(loaded);
            return Ok(snapshot);
        };

        let modified = self.mtime()?;
        if modified <= loaded.modified {
            debug!(path = %self.path.display(), "configuration unmodified, keeping active snapshot");
            return Ok(Arc::clone(&loaded.snapshot));
        }

        // Errors here must not touch the active state
        let next = self.load(loaded.snapshot.version + 1)?;
        *loaded = next;
        Ok(Arc::clone(&loaded.snapshot))
    }
}

/// Mask password-like fields so a config document can be logged.
fn sanitize_for_logging(config: &GatewayConfig) -> serde_json::Value {
    let mut value = serde_json::json!(config);
    mask_sensitive(&mut value);
    value
}

fn mask_sensitive(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key.to_lowercase().contains("password") {
                    *val = serde_json::Value::String("***".to_string());
                } else {
                    mask_sensitive(val);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                mask_sensitive(item);
            }
        }
        _ => {}
    }
}
