use apigee_discovery::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Unit of recurring discovery work.
///
/// Jobs are stateless with respect to scheduling: the interval timer, the
/// readiness gates and the status record all live in the
/// [`JobScheduler`](crate::runners::scheduler::JobScheduler) that drives them.
///
/// # Example
/// ```no_run
/// use apigee_discovery::SyncResult;
/// use async_trait::async_trait;
/// use discovery_agent::Job;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Job for Heartbeat {
///     fn name(&self) -> &str {
///         "heartbeat"
///     }
///
///     fn interval(&self) -> Duration {
///         Duration::from_secs(30)
///     }
///
///     async fn execute(&self, _cancel: &CancellationToken) -> SyncResult<()> {
///         tracing::info!("still here");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync {
    /// Unique job identifier, used in logs and status listings.
    fn name(&self) -> &str;

    /// Minimum time between two starts of `execute`.
    fn interval(&self) -> Duration;

    /// Stop scheduling after the first successful execution.
    fn run_once(&self) -> bool {
        false
    }

    /// Runs one cycle.
    ///
    /// Implementations check `cancel` at their own suspension points and
    /// return [`SyncError::Cancelled`](apigee_discovery::SyncError::Cancelled)
    /// without committing partial results.
    async fn execute(&self, cancel: &CancellationToken) -> SyncResult<()>;
}

/// Where a job currently is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    /// A gate the job waits on is not done yet
    WaitingOnDependency,
    Running,
    /// Last cycle failed; the job stays scheduled
    Errored,
}

/// Status information for a job.
#[derive(Clone, Debug, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    /// Start of the most recent execution
    pub last_run: Option<DateTime<Utc>>,
    /// End of the most recent successful execution
    pub last_success: Option<DateTime<Utc>>,
    /// Error of the most recent execution, cleared on success
    pub last_error: Option<String>,
    /// Total number of successful executions
    pub run_count: u64,
    /// Total number of failed executions
    pub error_count: u64,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            last_run: None,
            last_success: None,
            last_error: None,
            run_count: 0,
            error_count: 0,
        }
    }
}
