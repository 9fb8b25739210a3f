use std::path::PathBuf;
use chrono::{DateTime, Local};
use log::{info, warn};
use crate::runner::{JobId, JobRunner};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Running,
    Finished,
    Failed,
    Terminated,
}

impl JobState {
    pub fn is_done(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed | JobState::Terminated)
    }
}


/// One script invocation managed by the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub working_dir: PathBuf,
    pub script: PathBuf,
    pub args: Vec<String>,
    pub job_id: Option<JobId>,
    pub state: JobState,
    pub submitted_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    pub exit_status: Option<i32>,
    pub log_file: Option<PathBuf>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(name: &str, working_dir: PathBuf, script: PathBuf, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            working_dir,
            script,
            args,
            job_id: None,
            state: JobState::Waiting,
            submitted_at: None,
            finished_at: None,
            exit_status: None,
            log_file: None,
            error: None,
        }
    }

    /// Submits the job. Only a waiting job can be started; a submission
    /// failure marks it Failed.
    pub async fn start(&mut self, runner: &dyn JobRunner) -> JobState {
        if self.state != JobState::Waiting {
            return self.state;
        }
        match runner.run(&self.name, &self.working_dir, &self.script, &self.args).await {
            Ok(job_id) => {
                self.log_file = runner.log_file(&job_id).await;
                info!("Started job {} ({}) id {}", self.name, runner.name(), job_id);
                self.job_id = Some(job_id);
                self.submitted_at = Some(Local::now());
                self.state = JobState::Running;
            }
            Err(e) => {
                warn!("Failed to start job {}: {}", self.name, e);
                self.error = Some(e.to_string());
                self.finished_at = Some(Local::now());
                self.state = JobState::Failed;
            }
        }
        self.state
    }

    /// Refreshes a running job's state from the runner. Status query errors
    /// leave the job Running so it is checked again on the next poll.
    pub async fn update(&mut self, runner: &dyn JobRunner) -> JobState {
        if self.state != JobState::Running {
            return self.state;
        }
        let Some(job_id) = self.job_id.clone() else {
            return self.state;
        };
        match runner.is_running(&job_id).await {
            Ok(true) => {}
            Ok(false) => {
                let status = runner.exit_status(&job_id).await.unwrap_or_else(|e| {
                    warn!("Unable to get exit status for job {}: {}", self.name, e);
                    None
                });
                self.exit_status = status;
                self.finished_at = Some(Local::now());
                self.state = match status {
                    Some(code) if code != 0 => JobState::Failed,
                    _ => JobState::Finished,
                };
                info!(
                    "Job {} {} (exit status {}) after {}s",
                    self.name,
                    if self.state == JobState::Failed { "failed" } else { "finished" },
                    status.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
                    self.elapsed_secs().unwrap_or(0)
                );
            }
            Err(e) => warn!("Unable to check status of job {}: {}", self.name, e),
        }
        self.state
    }

    pub async fn terminate(&mut self, runner: &dyn JobRunner) {
        if self.state != JobState::Running {
            return;
        }
        if let Some(job_id) = &self.job_id {
            if let Err(e) = runner.terminate(job_id).await {
                warn!("Failed to terminate job {}: {}", self.name, e);
            }
        }
        self.finished_at = Some(Local::now());
        self.state = JobState::Terminated;
    }

    pub fn elapsed_secs(&self) -> Option<i64> {
        let start = self.submitted_at?;
        let end = self.finished_at.unwrap_or_else(Local::now);
        Some((end - start).num_seconds())
    }
}
