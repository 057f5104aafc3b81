//! Per-job interval scheduler.
//!
//! Each job gets its own scheduler task that ticks on the job's interval,
//! waits for the readiness gates the job depends on, runs the job and flips
//! the gate the job owns after its first success.

use crate::job::{Job, JobState, JobStatus};
use apigee_discovery::gate::{all_done, ReadinessGate};
use apigee_discovery::SyncError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Decides whether a tick may start an execution.
///
/// Starts are never closer together than the interval, however the ticks
/// themselves drift.
#[derive(Clone, Debug)]
pub(crate) struct Admission {
    interval: Duration,
    last_start: Option<Instant>,
}

impl Admission {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: None,
        }
    }

    /// Records `now` as a start and returns true when the interval has
    /// elapsed since the previous start.
    pub(crate) fn admit(&mut self, now: Instant) -> bool {
        match self.last_start {
            Some(previous) if now.saturating_duration_since(previous) < self.interval => false,
            _ => {
                self.last_start = Some(now);
                true
            }
        }
    }
}

/// Drives one [`Job`] on its own timer.
///
/// - Ticks every `job.interval()`
/// - Skips the tick while any dependency gate is not done
/// - Records every outcome in a shared [`JobStatus`]
/// - Flips the owned gate after the first success
/// - A failed execution is logged and retried on the next tick
/// - Cancellation is observed between ticks; a running execution is never
///   dropped, it returns `Cancelled` from its own checkpoints or completes
pub struct JobScheduler {
    job: Arc<dyn Job>,
    depends_on: Vec<ReadinessGate>,
    completes: Option<ReadinessGate>,
    status: Arc<Mutex<JobStatus>>,
}

impl JobScheduler {
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self {
            job,
            depends_on: Vec::new(),
            completes: None,
            status: Arc::new(Mutex::new(JobStatus::default())),
        }
    }

    /// Do not run until `gate` is done.
    pub fn depends_on(mut self, gate: ReadinessGate) -> Self {
        self.depends_on.push(gate);
        self
    }

    /// Flip `gate` after the first successful execution.
    pub fn completes(mut self, gate: ReadinessGate) -> Self {
        self.completes = Some(gate);
        self
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    pub fn interval(&self) -> Duration {
        self.job.interval()
    }

    pub fn run_once(&self) -> bool {
        self.job.run_once()
    }

    pub fn dependencies(&self) -> &[ReadinessGate] {
        &self.depends_on
    }

    pub fn owned_gate(&self) -> Option<&ReadinessGate> {
        self.completes.as_ref()
    }

    /// Returns a clone of the status tracker for external monitoring.
    pub fn status(&self) -> Arc<Mutex<JobStatus>> {
        Arc::clone(&self.status)
    }

    /// Starts the scheduling loop (non-blocking).
    ///
    /// The loop ends when `cancel` fires, or after the first success of a
    /// single-run job.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        let name = self.job.name().to_string();
        let period = self.job.interval();

        info!(
            job = %name,
            interval_secs = period.as_secs_f64(),
            depends_on = ?self.depends_on.iter().map(|g| g.name()).collect::<Vec<_>>(),
            "Starting job scheduler"
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut admission = Admission::new(period);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !all_done(&self.depends_on) {
                debug!(job = %name, "Dependencies not ready, skipping tick");
                self.status.lock().await.state = JobState::WaitingOnDependency;
                continue;
            }

            if !admission.admit(Instant::now()) {
                debug!(job = %name, "Interval not elapsed, skipping tick");
                continue;
            }

            {
                let mut status = self.status.lock().await;
                status.state = JobState::Running;
                status.last_run = Some(Utc::now());
            }

            // Jobs stop at their own checkpoints; the manager aborts
            // stragglers after the shutdown grace period.
            let outcome = self.job.execute(&cancel).await;

            match outcome {
                Ok(()) => {
                    let first_success = {
                        let mut status = self.status.lock().await;
                        status.state = JobState::Idle;
                        status.last_success = Some(Utc::now());
                        status.last_error = None;
                        status.run_count += 1;
                        status.run_count == 1
                    };

                    debug!(job = %name, "Job cycle succeeded");

                    if first_success {
                        if let Some(gate) = &self.completes {
                            if gate.mark_done() {
                                info!(job = %name, gate = %gate.name(), "Readiness gate done");
                            }
                        }
                    }

                    if self.job.run_once() {
                        info!(job = %name, "Single-run job finished");
                        break;
                    }
                }
                Err(SyncError::Cancelled) => {
                    self.status.lock().await.state = JobState::Idle;
                    break;
                }
                Err(e) => {
                    if e.is_recoverable() {
                        warn!(job = %name, error = %e, "Job cycle failed, will retry next tick");
                    } else {
                        error!(job = %name, error = %e, "Job cycle failed");
                    }
                    let mut status = self.status.lock().await;
                    status.state = JobState::Errored;
                    status.last_error = Some(e.to_string());
                    status.error_count += 1;
                }
            }
        }

        info!(job = %name, "Job scheduler stopped");
    }
}
