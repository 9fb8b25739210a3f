use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, warn};
use tempfile::Builder;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use crate::config::defs::PipelineError;
use crate::runner::{JobId, JobRunner};


struct LocalJob {
    child: Child,
    log: PathBuf,
    err: Option<PathBuf>,
    exit_status: Option<i32>,
    finished: bool,
}

impl LocalJob {
    fn poll(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        match self.child.try_wait()? {
            Some(status) => {
                self.exit_status = status.code();
                self.finished = true;
                Ok(false)
            }
            None => Ok(true),
        }
    }
}


/// Runs jobs as local child processes. stdout and stderr go to
/// `<log_dir>/<name>.o<pid>` and `<log_dir>/<name>.e<pid>`, or both to the
/// `.o` file when `join_logs` is set.
pub struct SimpleJobRunner {
    log_dir: PathBuf,
    join_logs: bool,
    jobs: Mutex<HashMap<JobId, LocalJob>>,
}

impl SimpleJobRunner {
    pub fn new(log_dir: PathBuf, join_logs: bool) -> Self {
        Self {
            log_dir,
            join_logs,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Opens a uniquely named log file before spawning; it is renamed to its
    /// pid-based name once the pid is known.
    fn open_log(&self, name: &str, stream: char) -> std::io::Result<(fs::File, PathBuf)> {
        let tmp = Builder::new()
            .prefix(&format!("{}.{}", name, stream))
            .suffix(".pending")
            .tempfile_in(&self.log_dir)?;
        let (file, path) = tmp.keep().map_err(|e| e.error)?;
        Ok((file, path))
    }

    fn final_log_path(&self, name: &str, stream: char, pid: u32) -> PathBuf {
        self.log_dir.join(format!("{}.{}{}", name, stream, pid))
    }
}

/// Sends SIGKILL to the process group led by `pid`. Returns false when the
/// group could not be signalled.
#[cfg(unix)]
async fn kill_process_group(pid: u32) -> bool {
    let status = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{}", pid)])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(s) if s.success() => true,
        Ok(s) => {
            debug!("kill of process group {} exited with {}", pid, s);
            false
        }
        Err(e) => {
            debug!("Unable to run kill for process group {}: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: u32) -> bool {
    false
}


#[async_trait]
impl JobRunner for SimpleJobRunner {
    fn name(&self) -> &'static str {
        "simple"
    }

    async fn run(&self, name: &str, working_dir: &Path, script: &Path, args: &[String]) -> Result<JobId, PipelineError> {
        let submission_error = |e: String| PipelineError::JobSubmission { name: name.to_string(), error: e };

        fs::create_dir_all(&self.log_dir).map_err(|e| submission_error(e.to_string()))?;
        let (out_file, out_tmp) = self.open_log(name, 'o').map_err(|e| submission_error(e.to_string()))?;
        let (stderr, err_tmp) = if self.join_logs {
            let dup = out_file.try_clone().map_err(|e| submission_error(e.to_string()))?;
            (Stdio::from(dup), None)
        } else {
            let (err_file, err_tmp) = self.open_log(name, 'e').map_err(|e| submission_error(e.to_string()))?;
            (Stdio::from(err_file), Some(err_tmp))
        };

        let mut command = Command::new(script);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file))
            .stderr(stderr);
        // own process group so terminate reaches the tools a QC script starts
        #[cfg(unix)]
        command.process_group(0);
        let spawned = command.spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = fs::remove_file(&out_tmp);
                if let Some(p) = &err_tmp {
                    let _ = fs::remove_file(p);
                }
                return Err(submission_error(format!("{}: {}", script.display(), e)));
            }
        };

        let pid = child.id().ok_or_else(|| submission_error("process exited before its pid was read".to_string()))?;
        let log = self.final_log_path(name, 'o', pid);
        fs::rename(&out_tmp, &log).map_err(|e| submission_error(e.to_string()))?;
        let err = match err_tmp {
            Some(tmp) => {
                let err = self.final_log_path(name, 'e', pid);
                fs::rename(&tmp, &err).map_err(|e| submission_error(e.to_string()))?;
                Some(err)
            }
            None => None,
        };

        let mut jobs = self.jobs.lock().await;
        // pids are recycled over a long run
        let job_id = if jobs.contains_key(&pid.to_string()) {
            format!("{}.{}", pid, jobs.len())
        } else {
            pid.to_string()
        };
        debug!("Started {} as pid {} (log {})", name, pid, log.display());
        jobs.insert(job_id.clone(), LocalJob {
            child,
            log,
            err,
            exit_status: None,
            finished: false,
        });
        Ok(job_id)
    }

    async fn is_running(&self, job_id: &JobId) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| anyhow!("Unknown job id {}", job_id))?;
        job.poll()
    }

    async fn terminate(&self, job_id: &JobId) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| anyhow!("Unknown job id {}", job_id))?;
        if !job.poll()? {
            return Ok(());
        }
        let group_killed = match job.child.id() {
            Some(pid) => kill_process_group(pid).await,
            None => false,
        };
        if !group_killed {
            if let Err(e) = job.child.start_kill() {
                warn!("Failed to kill job {}: {}", job_id, e);
                return Err(e.into());
            }
        }
        let status = job.child.wait().await?;
        job.exit_status = status.code();
        job.finished = true;
        Ok(())
    }

    async fn exit_status(&self, job_id: &JobId) -> Result<Option<i32>> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| anyhow!("Unknown job id {}", job_id))?;
        job.poll()?;
        Ok(job.exit_status)
    }

    async fn log_file(&self, job_id: &JobId) -> Option<PathBuf> {
        self.jobs.lock().await.get(job_id).map(|j| j.log.clone())
    }

    async fn err_file(&self, job_id: &JobId) -> Option<PathBuf> {
        self.jobs.lock().await.get(job_id).and_then(|j| j.err.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn wait_done(runner: &SimpleJobRunner, id: &JobId) -> Result<()> {
        for _ in 0..200 {
            if !runner.is_running(id).await? {
                return Ok(());
            }
            sleep(Duration::from_millis(25)).await;
        }
        Err(anyhow!("job {} did not finish", id))
    }

    #[tokio::test]
    async fn test_simple_runner_logs_and_status() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = SimpleJobRunner::new(dir.path().join("logs"), false);
        let args = vec!["-c".to_string(), "echo hello; echo problem >&2; exit 2".to_string()];
        let id = runner.run("job1", dir.path(), Path::new("/bin/sh"), &args).await?;
        wait_done(&runner, &id).await?;

        assert_eq!(runner.exit_status(&id).await?, Some(2));
        let log = runner.log_file(&id).await.ok_or_else(|| anyhow!("no log"))?;
        let err = runner.err_file(&id).await.ok_or_else(|| anyhow!("no err log"))?;
        assert_eq!(log.file_name().and_then(|n| n.to_str()), Some(format!("job1.o{}", id).as_str()));
        assert_eq!(fs::read_to_string(log)?.trim(), "hello");
        assert_eq!(fs::read_to_string(err)?.trim(), "problem");
        Ok(())
    }

    #[tokio::test]
    async fn test_simple_runner_join_logs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = SimpleJobRunner::new(dir.path().join("logs"), true);
        let args = vec!["-c".to_string(), "echo out; echo err >&2".to_string()];
        let id = runner.run("joined", dir.path(), Path::new("/bin/sh"), &args).await?;
        wait_done(&runner, &id).await?;

        assert!(runner.err_file(&id).await.is_none());
        let log = runner.log_file(&id).await.ok_or_else(|| anyhow!("no log"))?;
        let contents = fs::read_to_string(log)?;
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
        Ok(())
    }

    #[tokio::test]
    async fn test_simple_runner_working_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let work = dir.path().join("data");
        fs::create_dir(&work)?;
        let runner = SimpleJobRunner::new(dir.path().join("logs"), false);
        let args = vec!["-c".to_string(), "touch here.txt".to_string()];
        let id = runner.run("wd", &work, Path::new("/bin/sh"), &args).await?;
        wait_done(&runner, &id).await?;
        assert!(work.join("here.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_simple_runner_terminate() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = SimpleJobRunner::new(dir.path().join("logs"), false);
        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let id = runner.run("sleeper", dir.path(), Path::new("/bin/sh"), &args).await?;
        assert!(runner.is_running(&id).await?);
        runner.terminate(&id).await?;
        assert!(!runner.is_running(&id).await?);
        assert_eq!(runner.exit_status(&id).await?, None);
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn process_gone(pid: &str) -> bool {
        // an orphan killed by the group signal may linger as a zombie until reaped
        match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat.rsplit(')').next().map(|rest| rest.trim_start().starts_with('Z')).unwrap_or(false),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_simple_runner_terminate_kills_script_children() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pid_file = dir.path().join("tool.pid");
        let runner = SimpleJobRunner::new(dir.path().join("logs"), false);
        let args = vec![
            "-c".to_string(),
            format!("sleep 30 & echo $! > '{}'; wait", pid_file.display()),
        ];
        let id = runner.run("script", dir.path(), Path::new("/bin/sh"), &args).await?;

        let mut tool_pid = String::new();
        for _ in 0..200 {
            tool_pid = fs::read_to_string(&pid_file).unwrap_or_default().trim().to_string();
            if !tool_pid.is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(!tool_pid.is_empty());
        assert!(!process_gone(&tool_pid));

        runner.terminate(&id).await?;
        assert!(!runner.is_running(&id).await?);

        let mut gone = false;
        for _ in 0..200 {
            if process_gone(&tool_pid) {
                gone = true;
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(gone, "background tool {} survived terminate", tool_pid);
        Ok(())
    }

    #[tokio::test]
    async fn test_simple_runner_missing_script() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runner = SimpleJobRunner::new(dir.path().join("logs"), false);
        let res = runner.run("ghost", dir.path(), Path::new("/no/such/script.sh"), &[]).await;
        assert!(matches!(res, Err(PipelineError::JobSubmission { .. })));
        let leftover = fs::read_dir(dir.path().join("logs"))?.count();
        assert_eq!(leftover, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_job_id() {
        let runner = SimpleJobRunner::new(PathBuf::from("/tmp"), false);
        assert!(runner.is_running(&"999999".to_string()).await.is_err());
    }
}
