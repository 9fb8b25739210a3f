use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use tokio::sync::Mutex;
use crate::config::defs::{PipelineError, QACCT_TAG, QDEL_TAG, QSTAT_TAG, QSUB_TAG};
use crate::runner::{JobId, JobRunner};
use crate::utils::command::{capture_tool, run_tool, Toolbox};

lazy_static! {
    static ref QSUB_RE: Regex = Regex::new(r#"Your job (\d+) \("(.*)"\) has been submitted"#).unwrap();
}


/// Extracts the job id from qsub's confirmation message.
pub fn parse_qsub_output(stdout: &str) -> Option<JobId> {
    QSUB_RE.captures(stdout).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Maps job id to state code from plain `qstat` output. The first two lines
/// are the column header and separator.
pub fn parse_qstat_output(stdout: &str) -> HashMap<JobId, String> {
    stdout
        .lines()
        .skip(2)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            Some((fields[0].to_string(), fields[4].to_string()))
        })
        .collect()
}

/// Reads `exit_status` from `qacct -j` output.
pub fn parse_qacct_exit_status(stdout: &str) -> Option<i32> {
    stdout
        .lines()
        .find(|l| l.starts_with("exit_status"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

/// Grid Engine rejects job names starting with a digit or containing path
/// separators and a few other characters.
pub fn sanitize_job_name(name: &str) -> String {
    let mut clean: String = name
        .chars()
        .map(|c| match c {
            '/' | ':' | '@' | '\\' | '*' | '?' | ' ' => '_',
            c => c,
        })
        .collect();
    if clean.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        clean.insert(0, 'j');
    }
    clean
}


// Status checks for all running jobs in one poll arrive together; they share
// a single qstat listing taken within this window.
const QSTAT_SNAPSHOT_TTL: Duration = Duration::from_secs(2);

struct QstatSnapshot {
    taken: Instant,
    states: HashMap<JobId, String>,
}


/// Submits jobs to Grid Engine via qsub and tracks them with qstat.
pub struct GridEngineJobRunner {
    log_dir: PathBuf,
    queue: Option<String>,
    join_logs: bool,
    toolbox: Toolbox,
    names: Mutex<HashMap<JobId, String>>,
    snapshot: Mutex<Option<QstatSnapshot>>,
    snapshot_ttl: Duration,
}

impl GridEngineJobRunner {
    pub fn new(log_dir: PathBuf, queue: Option<String>, join_logs: bool, toolbox: Toolbox) -> Self {
        Self {
            log_dir,
            queue,
            join_logs,
            toolbox,
            names: Mutex::new(HashMap::new()),
            snapshot: Mutex::new(None),
            snapshot_ttl: QSTAT_SNAPSHOT_TTL,
        }
    }

    /// How long one qstat listing answers status queries.
    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    pub fn qsub_args(&self, name: &str, working_dir: &Path, script: &Path, args: &[String]) -> Vec<String> {
        let log_dir = self.log_dir.to_string_lossy().to_string();
        let mut qsub_args: Vec<String> = vec![
            "-b".to_string(), "y".to_string(),
            "-V".to_string(),
            "-N".to_string(), sanitize_job_name(name),
            "-wd".to_string(), working_dir.to_string_lossy().to_string(),
            "-o".to_string(), log_dir.clone(),
            "-e".to_string(), log_dir,
        ];
        if self.join_logs {
            qsub_args.push("-j".to_string());
            qsub_args.push("y".to_string());
        }
        if let Some(queue) = &self.queue {
            qsub_args.push("-q".to_string());
            qsub_args.push(queue.clone());
        }
        qsub_args.push(script.to_string_lossy().to_string());
        qsub_args.extend(args.iter().cloned());
        qsub_args
    }

    /// State of `job_id` from the current qstat listing, running qstat only
    /// when the cached listing is older than the snapshot ttl. The lock is held
    /// across the qstat call so concurrent callers wait for one listing.
    async fn qstat_state(&self, job_id: &JobId) -> Result<Option<String>> {
        let mut snapshot = self.snapshot.lock().await;
        let fresh = snapshot
            .as_ref()
            .map(|s| s.taken.elapsed() < self.snapshot_ttl)
            .unwrap_or(false);
        if !fresh {
            let cwd = std::env::current_dir()?;
            let output = run_tool(&self.toolbox, QSTAT_TAG, &[], &cwd).await?;
            *snapshot = Some(QstatSnapshot { taken: Instant::now(), states: parse_qstat_output(&output.stdout) });
        }
        Ok(snapshot.as_ref().and_then(|s| s.states.get(job_id).cloned()))
    }

    async fn invalidate_snapshot(&self) {
        *self.snapshot.lock().await = None;
    }
}

#[async_trait]
impl JobRunner for GridEngineJobRunner {
    fn name(&self) -> &'static str {
        "ge"
    }

    async fn run(&self, name: &str, working_dir: &Path, script: &Path, args: &[String]) -> Result<JobId, PipelineError> {
        std::fs::create_dir_all(&self.log_dir)?;
        let qsub_args = self.qsub_args(name, working_dir, script, args);
        let output = run_tool(&self.toolbox, QSUB_TAG, &qsub_args, working_dir)
            .await
            .map_err(|e| PipelineError::JobSubmission { name: name.to_string(), error: e.to_string() })?;

        let job_id = parse_qsub_output(&output.stdout).ok_or_else(|| PipelineError::JobSubmission {
            name: name.to_string(),
            error: format!("unexpected qsub output: {}", output.stdout.trim()),
        })?;
        debug!("Submitted {} as Grid Engine job {}", name, job_id);
        self.names.lock().await.insert(job_id.clone(), sanitize_job_name(name));
        // a listing taken before submission does not know this job
        self.invalidate_snapshot().await;
        Ok(job_id)
    }

    async fn is_running(&self, job_id: &JobId) -> Result<bool> {
        match self.qstat_state(job_id).await? {
            Some(state) => {
                if state.contains('E') {
                    warn!("Grid Engine job {} is in error state {}", job_id, state);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn terminate(&self, job_id: &JobId) -> Result<()> {
        let cwd = std::env::current_dir()?;
        run_tool(&self.toolbox, QDEL_TAG, &[job_id.clone()], &cwd).await?;
        self.invalidate_snapshot().await;
        Ok(())
    }

    async fn exit_status(&self, job_id: &JobId) -> Result<Option<i32>> {
        let cwd = std::env::current_dir()?;
        let output = capture_tool(&self.toolbox, QACCT_TAG, &["-j".to_string(), job_id.clone()], &cwd).await;
        match output {
            Ok(out) if out.success() => Ok(parse_qacct_exit_status(&out.stdout)),
            Ok(_) => Ok(None),
            Err(PipelineError::ToolNotFound(_)) => Ok(None),
            Err(e) => Err(anyhow!(e)),
        }
    }

    async fn log_file(&self, job_id: &JobId) -> Option<PathBuf> {
        let names = self.names.lock().await;
        names.get(job_id).map(|n| self.log_dir.join(format!("{}.o{}", n, job_id)))
    }

    async fn err_file(&self, job_id: &JobId) -> Option<PathBuf> {
        if self.join_logs {
            return None;
        }
        let names = self.names.lock().await;
        names.get(job_id).map(|n| self.log_dir.join(format!("{}.e{}", n, job_id)))
    }
}
