//! Job execution backends and the pipeline loop that drives them.
//!
//! A `JobRunner` starts a script with arguments in a working directory and
//! answers status queries by job id. `SimpleJobRunner` forks local processes;
//! `GridEngineJobRunner` submits to a Grid Engine cluster with qsub and polls
//! qstat. `PipelineRunner` queues jobs and keeps at most N of them running.

pub mod grid_engine;
pub mod job;
pub mod pipeline;
pub mod simple;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use crate::cli::RunnerKind;
use crate::config::defs::PipelineError;
use crate::utils::command::Toolbox;

pub use grid_engine::GridEngineJobRunner;
pub use job::{Job, JobState};
pub use pipeline::{PipelineRunner, PipelineSummary};
pub use simple::SimpleJobRunner;

pub type JobId = String;


#[async_trait]
pub trait JobRunner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts `script args..` in `working_dir` and returns its job id.
    async fn run(&self, name: &str, working_dir: &Path, script: &Path, args: &[String]) -> Result<JobId, PipelineError>;

    async fn is_running(&self, job_id: &JobId) -> Result<bool>;

    async fn terminate(&self, job_id: &JobId) -> Result<()>;

    /// Exit status of a finished job. None while running or when the backend
    /// cannot tell.
    async fn exit_status(&self, job_id: &JobId) -> Result<Option<i32>>;

    async fn log_file(&self, job_id: &JobId) -> Option<PathBuf>;

    async fn err_file(&self, job_id: &JobId) -> Option<PathBuf>;
}


#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub log_dir: PathBuf,
    pub join_logs: bool,
    pub ge_queue: Option<String>,
    pub toolbox: Toolbox,
}

pub fn make_runner(kind: RunnerKind, options: RunnerOptions) -> Arc<dyn JobRunner> {
    match kind {
        RunnerKind::Simple => Arc::new(SimpleJobRunner::new(options.log_dir, options.join_logs)),
        RunnerKind::GridEngine => Arc::new(GridEngineJobRunner::new(
            options.log_dir,
            options.ge_queue,
            options.join_logs,
            options.toolbox,
        )),
    }
}
