//! Bounded Probe Scheduler
//!
//! A resizable pool of long-lived worker tasks, one inbox channel per
//! worker. `run_batch` wraps probes in timed tasks, dispatches them
//! round-robin, waits for completions up to the batch deadline and
//! reaps stragglers through the task cancellation protocol. It always
//! returns one outcome per submitted probe, in submission order.
//!
//! The pool is resized between batches only; the scrape orchestrator's
//! cycle lock guarantees no batch is in flight during a resize.

pub mod task;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ExporterError, Result};
use crate::probe::Probe;
pub use task::{ProbeOutcome, TaskResult, TimedProbeTask};

/// How long a retiring or shutting-down worker gets to wind down.
const WORKER_RETIRE_GRACE: Duration = Duration::from_secs(5);

struct WorkItem {
    task: Arc<TimedProbeTask>,
    index: usize,
    done: mpsc::Sender<usize>,
}

struct Worker {
    id: usize,
    sender: mpsc::UnboundedSender<WorkItem>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

struct SchedulerCore {
    workers: Vec<Worker>,
    next_worker_id: usize,
}

/// Resizable worker pool executing probe batches under one deadline.
pub struct ProbeScheduler {
    core: tokio::sync::Mutex<SchedulerCore>,
}

impl ProbeScheduler {
    /// Create an empty pool; `resize` it before running batches.
    pub fn new() -> Self {
        Self {
            core: tokio::sync::Mutex::new(SchedulerCore {
                workers: Vec::new(),
                next_worker_id: 0,
            }),
        }
    }

    pub async fn pool_size(&self) -> usize {
        self.core.lock().await.workers.len()
    }

    /// Bring the pool to exactly `target` workers.
    ///
    /// Growing spawns fresh worker loops; shrinking signals the excess
    /// workers and waits briefly for them to wind down.
    pub async fn resize(&self, target: usize) {
        let mut core = self.core.lock().await;
        let current = core.workers.len();
        if target == current {
            return;
        }

        if target > current {
            info!("📈 Scaling up probe worker pool ({current} -> {target})");
            for _ in current..target {
                let id = core.next_worker_id;
                core.next_worker_id += 1;
                core.workers.push(spawn_worker(id));
            }
        } else {
            info!("📉 Scaling down probe worker pool ({current} -> {target})");
            let retired: Vec<Worker> = core.workers.split_off(target);
            retire_workers(retired).await;
        }
    }

    /// Execute one batch of probes under a shared wall-clock deadline.
    ///
    /// Every probe yields exactly one outcome: completed, cancelled at
    /// the deadline, or faulted when its worker could not produce a
    /// result. Deadline expiry is a normal outcome, never an error; the
    /// only error is dispatching a non-empty batch into an empty pool.
    pub async fn run_batch(
        &self,
        probes: Vec<Probe>,
        deadline: Duration,
    ) -> Result<Vec<ProbeOutcome>> {
        if probes.is_empty() {
            return Ok(Vec::new());
        }

        let senders: Vec<mpsc::UnboundedSender<WorkItem>> = {
            let core = self.core.lock().await;
            core.workers.iter().map(|w| w.sender.clone()).collect()
        };
        if senders.is_empty() {
            return Err(ExporterError::Scheduler(format!(
                "cannot run a batch of {} probes with zero workers",
                probes.len()
            )));
        }

        let tasks: Vec<Arc<TimedProbeTask>> = probes
            .into_iter()
            .map(|probe| Arc::new(TimedProbeTask::new(probe)))
            .collect();

        let (done_tx, mut done_rx) = mpsc::channel::<usize>(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let item = WorkItem {
                task: Arc::clone(task),
                index,
                done: done_tx.clone(),
            };
            let worker = index % senders.len();
            if senders[worker].send(item).is_err() {
                // the missing completion surfaces as a faulted outcome
                warn!(worker, index, "probe worker inbox closed, task not dispatched");
            }
        }
        drop(done_tx);

        let batch_deadline = Instant::now() + deadline;
        let mut pending = tasks.len();
        let mut deadline_hit = false;
        while pending > 0 {
            match tokio::time::timeout_at(batch_deadline, done_rx.recv()).await {
                Ok(Some(index)) => {
                    debug!(index, "probe task completed");
                    pending -= 1;
                }
                Ok(None) => {
                    warn!(pending, "probe workers dropped out mid-batch");
                    break;
                }
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        if deadline_hit {
            warn!(
                pending,
                deadline_secs = deadline.as_secs_f64(),
                "batch deadline expired, reaping unfinished probes"
            );
            for task in &tasks {
                if !task.is_complete() {
                    task.cancel();
                }
            }
        }

        let outcomes: Vec<ProbeOutcome> = tasks.iter().map(|task| task.outcome()).collect();
        debug!(
            total = outcomes.len(),
            cancelled = outcomes.iter().filter(|o| o.cancelled).count(),
            "probe batch finished"
        );
        Ok(outcomes)
    }

    /// Stop all workers, waiting up to `grace` for them to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        info!("🛑 Initiating probe scheduler shutdown");
        let workers: Vec<Worker> = {
            let mut core = self.core.lock().await;
            core.workers.drain(..).collect()
        };
        for worker in &workers {
            worker.shutdown.cancel();
        }
        let handles: Vec<JoinHandle<()>> = workers.into_iter().map(|w| w.handle).collect();
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(grace_secs = grace.as_secs_f64(), "probe workers did not stop in time");
        } else {
            info!("✅ Probe scheduler shutdown complete");
        }
    }
}

impl Default for ProbeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_worker(id: usize) -> Worker {
    let (sender, mut receiver) = mpsc::unbounded_channel::<WorkItem>();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        debug!(worker = id, "🎯 Probe worker started");
        loop {
            tokio::select! {
                item = receiver.recv() => match item {
                    Some(item) => {
                        item.task.run().await;
                        let _ = item.done.send(item.index).await;
                    }
                    None => break,
                },
                _ = token.cancelled() => break,
            }
        }
        debug!(worker = id, "✅ Probe worker stopped");
    });
    Worker {
        id,
        sender,
        shutdown,
        handle,
    }
}

async fn retire_workers(workers: Vec<Worker>) {
    for worker in &workers {
        worker.shutdown.cancel();
    }
    for Worker { id, handle, .. } in workers {
        if tokio::time::timeout(WORKER_RETIRE_GRACE, handle).await.is_err() {
            warn!(worker = id, "probe worker did not stop within grace period");
        }
    }
}
