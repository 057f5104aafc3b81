//! Discovery manager - Orchestrates job scheduler lifecycle.
//!
//! Holds the schedulers built at startup, starts one task per job, exposes
//! status and gate topology, and shuts everything down through a shared
//! cancellation token.

use crate::job::JobStatus;
use crate::runners::scheduler::JobScheduler;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long shutdown waits for running cycles before aborting them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Gate wiring of one job.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobTopology {
    pub job: String,
    pub interval_secs: u64,
    pub run_once: bool,
    /// Gates that must be done before the job runs
    pub waits_on: Vec<String>,
    /// Gate flipped by the job's first success
    pub owns: Option<String>,
}

/// Discovery manager - Runs every registered job on its own scheduler.
///
/// # Responsibilities
/// - Start one scheduler task per job
/// - Track status for all jobs
/// - Report which gates each job waits on and owns
/// - Graceful shutdown with a grace period
pub struct DiscoveryManager {
    pending: Vec<JobScheduler>,
    topology: Vec<JobTopology>,
    statuses: Vec<(String, Arc<Mutex<JobStatus>>)>,
    handles: Vec<(String, JoinHandle<()>)>,
    cancel: CancellationToken,
    grace: Duration,
}

impl DiscoveryManager {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            topology: Vec::new(),
            statuses: Vec::new(),
            handles: Vec::new(),
            cancel: CancellationToken::new(),
            grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Registers a scheduler; it starts with the next [`start`](Self::start).
    pub fn add(&mut self, scheduler: JobScheduler) {
        self.topology.push(JobTopology {
            job: scheduler.name().to_string(),
            interval_secs: scheduler.interval().as_secs(),
            run_once: scheduler.run_once(),
            waits_on: scheduler
                .dependencies()
                .iter()
                .map(|g| g.name().to_string())
                .collect(),
            owns: scheduler.owned_gate().map(|g| g.name().to_string()),
        });
        self.statuses
            .push((scheduler.name().to_string(), scheduler.status()));
        self.pending.push(scheduler);
    }

    /// Token cancelled on shutdown; jobs observe it at their checkpoints.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Starts every registered scheduler that is not running yet.
    ///
    /// # Returns
    /// Number of schedulers started
    pub fn start(&mut self) -> usize {
        info!(job_count = self.pending.len(), "Starting discovery manager");

        let mut started = 0;
        for scheduler in self.pending.drain(..) {
            let name = scheduler.name().to_string();
            let handle = scheduler.start(self.cancel.child_token());
            self.handles.push((name, handle));
            started += 1;
        }
        started
    }

    /// Status snapshot of every job, in registration order.
    pub async fn status(&self) -> Vec<(String, JobStatus)> {
        let mut out = Vec::with_capacity(self.statuses.len());
        for (name, status) in &self.statuses {
            out.push((name.clone(), status.lock().await.clone()));
        }
        out
    }

    /// Gate wiring of every job, in registration order.
    pub fn topology(&self) -> &[JobTopology] {
        &self.topology
    }

    /// Shuts down all schedulers.
    ///
    /// Cancels the shared token, waits up to the grace period for each task
    /// and aborts the ones still running.
    pub async fn shutdown(&mut self) {
        info!("Shutting down discovery manager");
        self.cancel.cancel();

        let deadline = tokio::time::Instant::now() + self.grace;
        let mut aborted = 0;
        for (name, mut handle) in self.handles.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(job = %name, error = %e, "Job scheduler task failed"),
                Err(_) => {
                    warn!(job = %name, "Job did not stop within grace period, aborting");
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        info!(aborted = aborted, "All job schedulers stopped");
    }
}

impl Default for DiscoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiscoveryManager {
    fn drop(&mut self) {
        self.cancel.cancel();
        for (_, handle) in self.handles.drain(..) {
            handle.abort();
        }
    }
}
