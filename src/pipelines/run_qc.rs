use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use log::{info, warn};
use regex::Regex;
use crate::cli::{Arguments, InputType};
use crate::config::defs::{PipelineError, RunConfig, LOG_DIR};
use crate::runner::{make_runner, JobRunner, JobState, PipelineRunner, PipelineSummary, RunnerOptions};
use crate::utils::command::{find_program, Toolbox};
use crate::utils::discovery::{discover_datasets, Dataset};
use crate::utils::file::file_path_manipulator;
use crate::utils::system::effective_max_jobs;


/// Resolves the QC script: a path relative to `cwd`, or a program on PATH.
pub fn resolve_script(script: Option<&String>, cwd: &Path) -> Result<PathBuf, PipelineError> {
    let raw = script.ok_or_else(|| PipelineError::InvalidConfig("--script is required".to_string()))?;
    let local = file_path_manipulator(Path::new(raw), Some(cwd), None, None, "");
    if local.is_file() {
        return Ok(local);
    }
    find_program(raw).ok_or_else(|| PipelineError::MissingInput(format!("QC script not found: {}", raw)))
}


/// Discovers datasets in every directory, in argument order, and applies the
/// `--test` limit across the whole run.
///
/// # Arguments
///
/// * `dirs` - Directories as given on the command line.
/// * `cwd` - Base for relative directories.
/// * `input_type` - Dataset layout to look for.
/// * `regexp` - Optional file name filter.
/// * `limit` - Keep only the first N datasets.
///
/// # Returns
/// The datasets to process. An error if none were found.
///
pub fn collect_datasets(
    dirs: &[String],
    cwd: &Path,
    input_type: InputType,
    regexp: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<Dataset>, PipelineError> {
    if dirs.is_empty() {
        return Err(PipelineError::InvalidConfig("at least one --dir is required".to_string()));
    }
    let pattern = regexp
        .map(Regex::new)
        .transpose()
        .map_err(|e| PipelineError::InvalidConfig(format!("bad --regexp: {}", e)))?;

    let mut datasets = Vec::new();
    for dir in dirs {
        let dir = file_path_manipulator(Path::new(dir), Some(cwd), None, None, "");
        let found = discover_datasets(&dir, input_type, pattern.as_ref())
            .map_err(|e| PipelineError::MissingInput(e.to_string()))?;
        if found.is_empty() {
            warn!("No {:?} datasets in {}", input_type, dir.display());
        } else {
            info!("{} dataset(s) in {}", found.len(), dir.display());
        }
        datasets.extend(found);
    }

    if let Some(n) = limit {
        if datasets.len() > n {
            info!("Test mode: keeping the first {} of {} dataset(s)", n, datasets.len());
            datasets.truncate(n);
        }
    }
    if datasets.is_empty() {
        return Err(PipelineError::MissingInput("no datasets found".to_string()));
    }
    Ok(datasets)
}


pub fn job_name(script: &Path, dataset: &Dataset) -> String {
    let stem = script
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "qc".to_string());
    format!("{}.{}", stem, dataset.name)
}


/// One job per dataset, run in the dataset's directory.
pub fn build_pipeline(
    runner: Arc<dyn JobRunner>,
    script: &Path,
    datasets: &[Dataset],
    max_concurrent: Option<usize>,
    poll_interval: Duration,
) -> PipelineRunner {
    let mut pipeline = PipelineRunner::new(runner, max_concurrent, poll_interval);
    for dataset in datasets {
        pipeline.queue_job(
            &job_name(script, dataset),
            dataset.dir.clone(),
            script.to_path_buf(),
            dataset.script_args(),
        );
    }
    pipeline
}


fn poll_interval(args: &Arguments) -> Result<Duration, PipelineError> {
    Duration::try_from_secs_f64(args.poll_interval)
        .map_err(|e| PipelineError::InvalidConfig(format!("bad --poll-interval {}: {}", args.poll_interval, e)))
}


pub fn log_dir_for(args: &Arguments, cwd: &Path) -> PathBuf {
    match &args.log_dir {
        Some(dir) => file_path_manipulator(Path::new(dir), Some(cwd), None, None, ""),
        None => cwd.join(LOG_DIR),
    }
}


/// Discovers, queues and runs every dataset with the given runner. Split out
/// from `run` so a runner can be supplied directly.
pub async fn run_with_runner(config: Arc<RunConfig>, runner: Arc<dyn JobRunner>) -> Result<PipelineSummary, PipelineError> {
    let args = &config.args;
    let script = resolve_script(args.script.as_ref(), &config.cwd)?;
    let datasets = collect_datasets(&args.dirs, &config.cwd, args.input_type, args.regexp.as_deref(), args.test)?;
    let max_jobs = effective_max_jobs(args.max_concurrent_jobs, args.runner, config.physical_cores);
    info!("QC script: {}", script.display());

    let mut pipeline = build_pipeline(runner, &script, &datasets, max_jobs, poll_interval(args)?);
    pipeline.run().await
}


/// Logs each job's outcome and turns failures into an error.
pub fn report(summary: &PipelineSummary) -> Result<(), PipelineError> {
    for job in &summary.jobs {
        let log = job
            .log_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "no log".to_string());
        match job.state {
            JobState::Finished => info!("{}: finished ({})", job.name, log),
            state => warn!("{}: {:?}, exit status {:?} ({})", job.name, state, job.exit_status, log),
        }
    }
    info!("Peak concurrent jobs: {}", summary.peak_running);
    let failed = summary.n_failed() + summary.n_terminated();
    if failed > 0 {
        return Err(PipelineError::JobsFailed(failed));
    }
    Ok(())
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Run QC Pipeline\n-------------\n");
    let args = &config.args;

    let log_dir = log_dir_for(args, &config.cwd);
    std::fs::create_dir_all(&log_dir)?;
    info!("Job logs: {}", log_dir.display());

    let runner = make_runner(args.runner, RunnerOptions {
        log_dir,
        join_logs: args.join_logs,
        ge_queue: args.ge_queue.clone(),
        toolbox: Toolbox::new(),
    });

    let summary = run_with_runner(config.clone(), runner).await?;
    report(&summary)
}
