// src/engine/poll.rs
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{FlowError, FlowResult};
use super::task::Task;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Parameters for starting an external job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    /// Program and arguments for backends that run a command.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl JobRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Status reported for a job by its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    pub job_id: String,
    pub status: JobStatus,
    pub status_reason: Option<String>,
}

/// Backend that runs jobs whose completion is observed by polling.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait JobClient: Send + Sync {
    /// Start a job and return its identifier.
    async fn submit(&self, request: &JobRequest) -> anyhow::Result<String>;

    /// Describe the given jobs. Identifiers the backend does not know are
    /// absent from the result.
    async fn describe_jobs(&self, job_ids: &[String]) -> anyhow::Result<Vec<JobDetail>>;
}

/// Phase of one polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Submitting,
    Polling,
    Succeeded,
    Failed,
    NotFound,
    TimedOut,
    SubmitError,
}

impl PollPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollPhase::Submitting | PollPhase::Polling)
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollPhase::Submitting => "submitting",
            PollPhase::Polling => "polling",
            PollPhase::Succeeded => "succeeded",
            PollPhase::Failed => "failed",
            PollPhase::NotFound => "not-found",
            PollPhase::TimedOut => "timed-out",
            PollPhase::SubmitError => "submit-error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Per-run record; dropped once a terminal phase is reached.
///
/// `elapsed` is wall-clock time since submission, so slow status queries
/// and a zero poll interval still count toward the timeout.
#[derive(Debug)]
struct PollState {
    job_id: Option<String>,
    started: Instant,
    elapsed: Duration,
    phase: PollPhase,
}

impl PollState {
    fn enter(&mut self, phase: PollPhase) {
        debug!(
            job_id = self.job_id.as_deref().unwrap_or("-"),
            elapsed = ?self.elapsed,
            "Job phase {} -> {}",
            self.phase,
            phase
        );
        self.phase = phase;
    }
}

/// Submits a job, then polls its status until it reaches a terminal state.
///
/// `execute` blocks until the job succeeds, fails, disappears or exceeds
/// the configured timeout. A terminal status observed on a poll always wins
/// over the timeout check of that same poll.
pub struct PollJobTask {
    client: Arc<dyn JobClient>,
    request: JobRequest,
    settings: PollSettings,
}

impl PollJobTask {
    pub fn new(client: Arc<dyn JobClient>, request: JobRequest) -> Self {
        Self {
            client,
            request,
            settings: PollSettings::default(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub fn request(&self) -> &JobRequest {
        &self.request
    }
}

#[async_trait::async_trait]
impl Task for PollJobTask {
    async fn execute(&self) -> FlowResult<()> {
        let (complete, outcome) = oneshot::channel();
        let client = Arc::clone(&self.client);
        let request = self.request.clone();
        let settings = self.settings;

        tokio::spawn(async move {
            let result = drive(client.as_ref(), &request, settings).await;
            let _ = complete.send(result);
        });

        outcome.await.map_err(|_| FlowError::Interrupted {
            task: self.request.name.clone(),
        })?
    }

    fn kind(&self) -> &str {
        "PollJobTask"
    }
}

async fn drive(client: &dyn JobClient, request: &JobRequest, settings: PollSettings) -> FlowResult<()> {
    let mut state = PollState {
        job_id: None,
        started: Instant::now(),
        elapsed: Duration::ZERO,
        phase: PollPhase::Submitting,
    };

    let job_id = match client.submit(request).await {
        Ok(id) => id,
        Err(source) => {
            state.enter(PollPhase::SubmitError);
            warn!("Failed to submit job {}: {}", request.name, source);
            return Err(FlowError::Submit {
                job: request.name.clone(),
                source,
            });
        }
    };
    info!("Submitted job {} as {}", request.name, job_id);
    state.started = Instant::now();
    state.job_id = Some(job_id.clone());
    state.enter(PollPhase::Polling);

    loop {
        let details = client
            .describe_jobs(std::slice::from_ref(&job_id))
            .await
            .map_err(|source| FlowError::Poll {
                job_id: job_id.clone(),
                source,
            })?;
        state.elapsed = state.started.elapsed();

        let Some(detail) = details.into_iter().find(|d| d.job_id == job_id) else {
            state.enter(PollPhase::NotFound);
            return Err(FlowError::JobNotFound { job_id });
        };

        match detail.status {
            JobStatus::Succeeded => {
                state.enter(PollPhase::Succeeded);
                info!("Job {} succeeded after {:?}", job_id, state.elapsed);
                return Ok(());
            }
            JobStatus::Failed => {
                state.enter(PollPhase::Failed);
                return Err(FlowError::JobFailed {
                    job_id,
                    reason: detail.status_reason.unwrap_or_else(|| "unknown".to_string()),
                });
            }
            JobStatus::Pending | JobStatus::Running => {}
        }

        if state.elapsed >= settings.timeout {
            state.enter(PollPhase::TimedOut);
            return Err(FlowError::Timeout {
                job_id,
                elapsed: state.elapsed,
            });
        }

        if settings.poll_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(settings.poll_interval).await;
        }
    }
}
