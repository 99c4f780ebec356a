// src/platform/job.rs
use std::collections::HashMap;
use std::process::ExitStatus;
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::process::Child;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{JobClient, JobDetail, JobRequest, JobStatus};
use crate::utils::shell::spawn_detached;

enum ProcessJob {
    Running(Child),
    Exited(ExitStatus),
    Lost(String),
}

/// Job backend that runs each job as a background process on this host.
///
/// `request.command` holds the program and its arguments; `request.parameters`
/// are passed to the process as environment variables. Exit status zero
/// means the job succeeded. Jobs are dropped from the table once their
/// terminal status has been described.
#[derive(Default)]
pub struct ProcessJobClient {
    jobs: Mutex<HashMap<String, ProcessJob>>,
}

impl ProcessJobClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn detail(job_id: &str, job: &mut ProcessJob) -> JobDetail {
        if let ProcessJob::Running(child) = job {
            match child.try_wait() {
                Ok(Some(status)) => *job = ProcessJob::Exited(status),
                Ok(None) => {}
                Err(e) => *job = ProcessJob::Lost(e.to_string()),
            }
        }

        let (status, status_reason) = match job {
            ProcessJob::Running(_) => (JobStatus::Running, None),
            ProcessJob::Exited(status) if status.success() => (JobStatus::Succeeded, None),
            ProcessJob::Exited(status) => (JobStatus::Failed, Some(status.to_string())),
            ProcessJob::Lost(reason) => (JobStatus::Failed, Some(reason.clone())),
        };

        JobDetail {
            job_id: job_id.to_string(),
            status,
            status_reason,
        }
    }
}

#[async_trait::async_trait]
impl JobClient for ProcessJobClient {
    async fn submit(&self, request: &JobRequest) -> Result<String> {
        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| anyhow!("job {} has no command", request.name))?;

        let child = spawn_detached(program, args, &request.parameters)?;
        let job_id = format!("{}-{}", request.name, Uuid::new_v4());
        info!(
            "Started job {} (pid {:?}) on queue {}",
            job_id,
            child.id(),
            request.queue.as_deref().unwrap_or("local")
        );

        self.jobs.lock().insert(job_id.clone(), ProcessJob::Running(child));
        Ok(job_id)
    }

    async fn describe_jobs(&self, job_ids: &[String]) -> Result<Vec<JobDetail>> {
        let mut jobs = self.jobs.lock();
        let details = job_ids
            .iter()
            .filter_map(|id| jobs.get_mut(id).map(|job| Self::detail(id, job)))
            .collect::<Vec<_>>();

        // A terminal status is reported once, then the job is forgotten.
        for detail in &details {
            if detail.status.is_terminal() {
                jobs.remove(&detail.job_id);
            }
        }
        debug!("Described {} of {} jobs, {} still tracked", details.len(), job_ids.len(), jobs.len());
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::engine::{PollJobTask, Task};
    use crate::error::FlowError;

    fn request(name: &str, script: &str) -> JobRequest {
        JobRequest {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ..JobRequest::new(name)
        }
    }

    #[tokio::test]
    async fn test_unknown_job_is_absent() {
        let client = ProcessJobClient::new();
        let details = client.describe_jobs(&["nope".to_string()]).await.unwrap();
        assert!(details.is_empty());
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let client = ProcessJobClient::new();
        assert!(client.submit(&JobRequest::new("empty")).await.is_err());
    }

    #[tokio::test]
    async fn test_process_job_succeeds_through_polling() {
        let client = Arc::new(ProcessJobClient::new());
        let task = PollJobTask::new(client, request("sleepy", "sleep 0.1"))
            .with_poll_interval(Duration::from_millis(20))
            .with_timeout(Duration::from_secs(10));

        task.execute().await.unwrap();
    }

    #[tokio::test]
    async fn test_process_job_failure_reports_exit_status() {
        let client = Arc::new(ProcessJobClient::new());
        let task = PollJobTask::new(client, request("broken", "exit 4"))
            .with_poll_interval(Duration::from_millis(20));

        match task.execute().await.unwrap_err() {
            FlowError::JobFailed { job_id, reason } => {
                assert!(job_id.starts_with("broken-"));
                assert!(reason.contains('4'));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_finished_jobs_are_forgotten() {
        let client = Arc::new(ProcessJobClient::new());
        for name in ["first", "second", "third"] {
            PollJobTask::new(client.clone(), request(name, "true"))
                .with_poll_interval(Duration::from_millis(10))
                .execute()
                .await
                .unwrap();
        }
        assert!(client.jobs.lock().is_empty());

        let job_id = client.submit(&request("slow", "sleep 5")).await.unwrap();
        let details = client.describe_jobs(&[job_id.clone()]).await.unwrap();
        assert_eq!(details[0].status, JobStatus::Running);
        assert!(client.jobs.lock().contains_key(&job_id));
    }

    #[tokio::test]
    async fn test_parameters_become_environment() {
        let client = Arc::new(ProcessJobClient::new());
        let mut req = request("env", "test \"$STAGE\" = prod");
        req.parameters.insert("STAGE".to_string(), "prod".to_string());

        let task = PollJobTask::new(client, req).with_poll_interval(Duration::from_millis(20));
        task.execute().await.unwrap();
    }
}
