//! Probe Model
//!
//! Immutable probe specifications flattened from configuration, the
//! per-cycle `Probe` instances executed by the scheduler, and the
//! protocol backend trait those instances dispatch to.

pub mod builder;
pub mod http;
pub mod sql;
pub mod status;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use status::{ProbeStatus, StatusCell};

/// Parameter label used when an action takes no per-probe parameter.
pub const PARAM_NONE: &str = "-";

/// Kind of check a probe performs, doubling as its `action` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// HTTP GET against a status endpoint
    StatusCheck,
    /// SQL query through a gateway-fronted database endpoint
    QueryCheck,
}

impl ActionKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            ActionKind::StatusCheck => "status_check",
            ActionKind::QueryCheck => "query_check",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Immutable description of one probe: everything needed to contact a
/// service and to label its metrics.
///
/// Specs are resolved once when a config snapshot is flattened and are
/// shared across scrape cycles. Credential fallback has already been
/// applied; `display_target` carries the redacted form used on labels.
#[derive(Clone)]
pub struct ProbeSpec {
    pub action: ActionKind,
    /// Real target the backend contacts (may embed credentials)
    pub target: String,
    /// Target as it appears on metric labels, secrets redacted
    pub display_target: String,
    /// Status path or query text, [`PARAM_NONE`] when absent
    pub param: String,
    pub username: String,
    pub password: String,
}

impl ProbeSpec {
    /// Label values `{action, target, user, param, status}` for one
    /// terminal status.
    pub fn label_values<'a>(&'a self, status: &'a str) -> [&'a str; 5] {
        [
            self.action.as_label(),
            &self.display_target,
            &self.username,
            &self.param,
            status,
        ]
    }
}

impl fmt::Debug for ProbeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeSpec")
            .field("action", &self.action)
            .field("target", &self.display_target)
            .field("param", &self.param)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Protocol adapter performing the actual service call for one action kind.
///
/// Implementations classify every outcome themselves and must not panic.
/// They never return `Unknown` or `ErrorTimeout`: deadline classification
/// belongs to the scheduler alone.
#[async_trait]
pub trait ProbeBackend: Send + Sync {
    async fn perform(&self, spec: &ProbeSpec) -> ProbeStatus;
}

/// The backends a collector dispatches probes to, one per action kind.
#[derive(Clone)]
pub struct BackendSet {
    status_check: Arc<dyn ProbeBackend>,
    query_check: Arc<dyn ProbeBackend>,
}

impl BackendSet {
    pub fn new(status_check: Arc<dyn ProbeBackend>, query_check: Arc<dyn ProbeBackend>) -> Self {
        Self {
            status_check,
            query_check,
        }
    }

    pub fn for_action(&self, action: ActionKind) -> Arc<dyn ProbeBackend> {
        match action {
            ActionKind::StatusCheck => Arc::clone(&self.status_check),
            ActionKind::QueryCheck => Arc::clone(&self.query_check),
        }
    }
}

/// Builds the protocol backends for one configuration generation, so
/// connect timeouts and auth markers follow reloads. Split out as a
/// trait so orchestration tests can substitute scripted backends.
pub trait BackendFactory: Send + Sync {
    fn build(&self, config: &crate::config::GatewayConfig) -> crate::error::Result<BackendSet>;
}

/// Production factory wiring the HTTP and SQL backends.
pub struct ProtocolBackendFactory;

impl BackendFactory for ProtocolBackendFactory {
    fn build(&self, config: &crate::config::GatewayConfig) -> crate::error::Result<BackendSet> {
        Ok(BackendSet::new(
            Arc::new(http::HttpStatusBackend::new(config.connect_timeout())?),
            Arc::new(sql::SqlQueryBackend::new(
                config.connect_timeout(),
                &config.auth_error_markers,
            )),
        ))
    }
}

/// One live probe execution: a spec paired with a write-once status cell
/// and the cancellation token standing in for its blocking resource.
///
/// Instances are built fresh for every scrape cycle, so the status cell
/// is written at most once per cycle without any reset path.
#[derive(Clone)]
pub struct Probe {
    spec: Arc<ProbeSpec>,
    status: Arc<StatusCell>,
    released: CancellationToken,
    backend: Arc<dyn ProbeBackend>,
}

impl Probe {
    pub fn new(spec: Arc<ProbeSpec>, backend: Arc<dyn ProbeBackend>) -> Self {
        Self {
            spec,
            status: Arc::new(StatusCell::new()),
            released: CancellationToken::new(),
            backend,
        }
    }

    pub fn spec(&self) -> &ProbeSpec {
        &self.spec
    }

    /// Terminal status recorded for this cycle, `Unknown` if none landed.
    pub fn status(&self) -> ProbeStatus {
        self.status.current()
    }

    /// Record a terminal status. First write wins; returns whether this
    /// call won the cell.
    pub fn record_status(&self, status: ProbeStatus) -> bool {
        self.status.record(status)
    }

    /// Reclaim the probe's blocking resource from any thread.
    ///
    /// Cancels the token the in-flight protocol future is raced against,
    /// which drops that future and with it the underlying connection.
    /// Idempotent, never fails.
    pub fn release_resource(&self) {
        self.released.cancel();
    }

    /// Run the protocol call and classify it into the status cell.
    ///
    /// Returns true only for a healthy probe. Protocol failures are
    /// classified, never propagated. When the resource is released
    /// mid-flight the call unblocks promptly and reports unhealthy
    /// without writing a status: that write belongs to the canceller.
    pub async fn execute(&self) -> bool {
        tokio::select! {
            status = self.backend.perform(&self.spec) => {
                self.status.record(status);
                status.is_success()
            }
            _ = self.released.cancelled() => false,
        }
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("spec", &self.spec)
            .field("status", &self.status.current())
            .field("released", &self.released.is_cancelled())
            .finish()
    }
}
