//! Probe status taxonomy and the write-once status cell

use std::fmt;
use std::sync::OnceLock;

use tracing::warn;

/// Classification of a single probe execution.
///
/// Every probe starts at `Unknown` and moves to exactly one terminal
/// status. Emitted metrics only ever carry terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStatus {
    /// No outcome recorded yet
    Unknown,
    /// The probed service answered healthy
    Success,
    /// The service rejected the configured credentials
    ErrorAuth,
    /// The probe was still in flight when the batch deadline expired
    ErrorTimeout,
    /// Any other failure: I/O, protocol errors, unexpected responses,
    /// empty result sets
    ErrorOther,
}

impl ProbeStatus {
    /// Metric label value for this status.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeStatus::Unknown => "unknown",
            ProbeStatus::Success => "success",
            ProbeStatus::ErrorAuth => "error_auth",
            ProbeStatus::ErrorTimeout => "error_timeout",
            ProbeStatus::ErrorOther => "error_other",
        }
    }

    /// The statuses a finished probe can end up with, in label order.
    pub fn terminal_statuses() -> [ProbeStatus; 4] {
        [
            ProbeStatus::Success,
            ProbeStatus::ErrorAuth,
            ProbeStatus::ErrorTimeout,
            ProbeStatus::ErrorOther,
        ]
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProbeStatus::Unknown)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeStatus::Success)
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Write-once cell holding the classification of one probe run.
///
/// The first terminal status recorded wins. Competing writers are
/// expected when probe completion races deadline cancellation; the
/// losing write is dropped and logged at warn level.
#[derive(Debug, Default)]
pub struct StatusCell {
    status: OnceLock<ProbeStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            status: OnceLock::new(),
        }
    }

    /// Record a terminal status. Returns true when this call won the cell.
    pub fn record(&self, status: ProbeStatus) -> bool {
        if !status.is_terminal() {
            warn!(status = %status, "refusing to record non-terminal probe status");
            return false;
        }
        let won = self.status.set(status).is_ok();
        if !won {
            warn!(
                recorded = %self.current(),
                ignored = %status,
                "probe status already recorded, dropping later write"
            );
        }
        won
    }

    /// Current status, `Unknown` until a terminal status lands.
    pub fn current(&self) -> ProbeStatus {
        self.status.get().copied().unwrap_or(ProbeStatus::Unknown)
    }
}
