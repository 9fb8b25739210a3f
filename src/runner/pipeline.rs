use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::time::sleep;
use crate::config::defs::PipelineError;
use crate::runner::{Job, JobRunner, JobState};


#[derive(Debug, Clone)]
pub struct JobReport {
    pub name: String,
    pub state: JobState,
    pub exit_status: Option<i32>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub jobs: Vec<JobReport>,
    pub peak_running: usize,
}

impl PipelineSummary {
    fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }

    pub fn n_finished(&self) -> usize {
        self.count(JobState::Finished)
    }

    pub fn n_failed(&self) -> usize {
        self.count(JobState::Failed)
    }

    pub fn n_terminated(&self) -> usize {
        self.count(JobState::Terminated)
    }
}


/// Runs queued jobs through a JobRunner, keeping at most `max_concurrent`
/// of them running and polling for completion every `poll_interval`.
pub struct PipelineRunner {
    runner: Arc<dyn JobRunner>,
    max_concurrent: Option<usize>,
    poll_interval: Duration,
    jobs: Vec<Job>,
    waiting: VecDeque<usize>,
    peak_running: usize,
}

impl PipelineRunner {
    /// `max_concurrent` of None or Some(0) runs every queued job at once.
    pub fn new(runner: Arc<dyn JobRunner>, max_concurrent: Option<usize>, poll_interval: Duration) -> Self {
        Self {
            runner,
            max_concurrent: max_concurrent.filter(|&n| n > 0),
            poll_interval,
            jobs: Vec::new(),
            waiting: VecDeque::new(),
            peak_running: 0,
        }
    }

    pub fn queue_job(&mut self, name: &str, working_dir: PathBuf, script: PathBuf, args: Vec<String>) {
        debug!("Queued job {} in {}", name, working_dir.display());
        self.waiting.push_back(self.jobs.len());
        self.jobs.push(Job::new(name, working_dir, script, args));
    }

    pub fn n_waiting(&self) -> usize {
        self.waiting.len()
    }

    pub fn n_running(&self) -> usize {
        self.jobs.iter().filter(|j| j.state == JobState::Running).count()
    }

    pub fn n_finished(&self) -> usize {
        self.jobs.iter().filter(|j| j.state.is_done()).count()
    }

    pub fn is_running(&self) -> bool {
        self.n_waiting() > 0 || self.n_running() > 0
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    fn has_capacity(&self) -> bool {
        match self.max_concurrent {
            Some(max) => self.n_running() < max,
            None => true,
        }
    }

    async fn update_running(&mut self) {
        let runner = self.runner.clone();
        join_all(
            self.jobs
                .iter_mut()
                .filter(|j| j.state == JobState::Running)
                .map(|j| j.update(runner.as_ref())),
        )
            .await;
    }

    async fn start_waiting(&mut self) {
        let runner = self.runner.clone();
        while self.has_capacity() {
            let Some(idx) = self.waiting.pop_front() else { break };
            self.jobs[idx].start(runner.as_ref()).await;
        }
        self.peak_running = self.peak_running.max(self.n_running());
    }

    async fn terminate_all(&mut self) {
        let runner = self.runner.clone();
        for job in self.jobs.iter_mut().filter(|j| j.state == JobState::Running) {
            warn!("Terminating job {}", job.name);
            job.terminate(runner.as_ref()).await;
        }
        self.waiting.clear();
    }

    fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            jobs: self
                .jobs
                .iter()
                .map(|j| JobReport {
                    name: j.name.clone(),
                    state: j.state,
                    exit_status: j.exit_status,
                    log_file: j.log_file.clone(),
                })
                .collect(),
            peak_running: self.peak_running,
        }
    }

    /// Runs until every job is done or Ctrl-C is received.
    pub async fn run(&mut self) -> Result<PipelineSummary, PipelineError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
            .await
    }

    /// Runs until every job is done or `shutdown` completes. On shutdown all
    /// running jobs are terminated and PipelineError::Interrupted is returned.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<PipelineSummary, PipelineError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Running {} job(s) with the {} runner, max concurrent {}",
            self.jobs.len(),
            self.runner.name(),
            self.max_concurrent.map(|n| n.to_string()).unwrap_or_else(|| "unlimited".to_string())
        );

        loop {
            self.update_running().await;
            self.start_waiting().await;
            if !self.is_running() {
                break;
            }
            debug!(
                "{} waiting, {} running, {} done",
                self.n_waiting(),
                self.n_running(),
                self.n_finished()
            );

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = &mut shutdown => {
                    self.terminate_all().await;
                    return Err(PipelineError::Interrupted(format!(
                        "{} job(s) terminated",
                        self.jobs.iter().filter(|j| j.state == JobState::Terminated).count()
                    )));
                }
            }
        }

        let summary = self.summary();
        info!(
            "All jobs done: {} finished, {} failed, {} terminated",
            summary.n_finished(),
            summary.n_failed(),
            summary.n_terminated()
        );
        Ok(summary)
    }
}
