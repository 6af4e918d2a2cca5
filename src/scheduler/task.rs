//! Timed Cancellable Tasks
//!
//! Wraps one probe for one batch. Timing state lives on the task object
//! itself: the worker running the probe records the start and stop
//! instants, and the scheduler's deadline path records the stop for
//! tasks it reaps. The stop instant is first-write-wins, so a cancelled
//! task keeps the duration observed at cancellation even if its worker
//! drains afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::probe::status::ProbeStatus;
use crate::probe::Probe;

/// How one task finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// The probe ran to completion; true means healthy
    Completed(bool),
    /// The worker could not produce a result (panicked probe or lost
    /// worker)
    Faulted,
}

/// Outcome of one probe execution within a batch.
///
/// `run_batch` returns these in submission order, so callers correlate
/// outcome to probe by position.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub duration: Duration,
    pub cancelled: bool,
    pub result: TaskResult,
}

impl ProbeOutcome {
    pub fn healthy(&self) -> bool {
        !self.cancelled && matches!(self.result, TaskResult::Completed(true))
    }
}

#[derive(Debug, Default)]
struct Timing {
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

/// One probe wrapped for execution within a batch.
pub struct TimedProbeTask {
    probe: Probe,
    timing: Mutex<Timing>,
    completion: Mutex<Option<TaskResult>>,
    cancelled: AtomicBool,
}

impl TimedProbeTask {
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            timing: Mutex::new(Timing::default()),
            completion: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completion.lock().is_some()
    }

    fn start_timer(&self) {
        let mut timing = self.timing.lock();
        if timing.started_at.is_none() {
            timing.started_at = Some(Instant::now());
        }
    }

    /// First write wins: a worker draining after deadline reaping must
    /// not overwrite the frozen stop instant.
    fn stop_timer(&self) {
        let mut timing = self.timing.lock();
        if timing.stopped_at.is_none() {
            timing.stopped_at = Some(Instant::now());
        }
    }

    /// Wall-clock duration observed so far.
    ///
    /// Zero until the task starts, live while it runs, frozen once a
    /// stop instant is recorded.
    pub fn duration(&self) -> Duration {
        let timing = self.timing.lock();
        match (timing.started_at, timing.stopped_at) {
            (Some(started), Some(stopped)) => stopped.saturating_duration_since(started),
            (Some(started), None) => started.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }

    /// Execute the wrapped probe on the calling worker.
    ///
    /// A panicking backend is contained here and recorded as a faulted
    /// completion; the worker loop stays alive.
    pub async fn run(&self) {
        if self.is_cancelled() {
            return;
        }
        self.start_timer();
        let outcome = {
            use futures::FutureExt;
            std::panic::AssertUnwindSafe(self.probe.execute())
                .catch_unwind()
                .await
        };
        self.stop_timer();
        let result = match outcome {
            Ok(healthy) => TaskResult::Completed(healthy),
            Err(_) => {
                tracing::error!(spec = ?self.probe.spec(), "probe panicked during execution");
                TaskResult::Faulted
            }
        };
        *self.completion.lock() = Some(result);
    }

    /// Deadline reaping: release the probe's blocking resource so its
    /// worker unblocks promptly, classify the run as timed out, freeze
    /// the duration and mark the task cancelled.
    ///
    /// Safe to call in any task state. A task that completed between
    /// the deadline check and this call is left untouched; a completion
    /// racing the timeout classification loses the status cell and is
    /// dropped there.
    pub fn cancel(&self) {
        self.probe.release_resource();
        if self.is_complete() {
            return;
        }
        self.probe.record_status(ProbeStatus::ErrorTimeout);
        self.stop_timer();
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Fold task state into the outcome reported for this batch slot.
    pub fn outcome(&self) -> ProbeOutcome {
        let completion = self.completion.lock().clone();
        let cancelled = self.is_cancelled();
        let result = match completion {
            Some(result) => result,
            // reaped by the deadline: classified, just never drained
            None if cancelled => TaskResult::Completed(false),
            None => TaskResult::Faulted,
        };
        ProbeOutcome {
            duration: self.duration(),
            cancelled,
            result,
        }
    }
}
