mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use ngs_qc_pipelines::config::defs::PipelineError;
use ngs_qc_pipelines::pipelines::run_qc::{report, run_with_runner};
use ngs_qc_pipelines::runner::{JobRunner, JobState, PipelineRunner, SimpleJobRunner};
use ngs_qc_pipelines::InputType;
use common::{base_args, run_config, write_script};


fn simple_runner(log_dir: &std::path::Path) -> Arc<dyn JobRunner> {
    Arc::new(SimpleJobRunner::new(log_dir.to_path_buf(), false))
}


#[tokio::test]
async fn test_all_jobs_run_within_limit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "job.sh", "sleep 0.2\necho \"$1\" > \"$1.done\"")?;

    let mut pipeline = PipelineRunner::new(simple_runner(&dir.path().join("logs")), Some(2), Duration::from_millis(50));
    for i in 0..5 {
        let name = format!("job{}", i);
        pipeline.queue_job(&name, dir.path().to_path_buf(), script.clone(), vec![name.clone()]);
    }
    assert_eq!(pipeline.n_waiting(), 5);

    let summary = pipeline.run().await?;
    assert_eq!(summary.n_finished(), 5);
    assert_eq!(summary.n_failed(), 0);
    assert!(summary.peak_running <= 2);
    assert!(summary.peak_running >= 1);
    assert!(!pipeline.is_running());
    for i in 0..5 {
        assert!(dir.path().join(format!("job{}.done", i)).exists());
    }
    Ok(())
}


#[tokio::test]
async fn test_zero_limit_runs_everything_at_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "job.sh", "sleep 0.5")?;

    let mut pipeline = PipelineRunner::new(simple_runner(&dir.path().join("logs")), Some(0), Duration::from_millis(20));
    for i in 0..4 {
        pipeline.queue_job(&format!("job{}", i), dir.path().to_path_buf(), script.clone(), vec![]);
    }
    let summary = pipeline.run().await?;
    assert_eq!(summary.n_finished(), 4);
    assert_eq!(summary.peak_running, 4);
    Ok(())
}


#[tokio::test]
async fn test_failed_job_is_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "exit.sh", "exit \"$1\"")?;

    let mut pipeline = PipelineRunner::new(simple_runner(&dir.path().join("logs")), None, Duration::from_millis(20));
    pipeline.queue_job("ok", dir.path().to_path_buf(), script.clone(), vec!["0".to_string()]);
    pipeline.queue_job("bad", dir.path().to_path_buf(), script.clone(), vec!["3".to_string()]);

    let summary = pipeline.run().await?;
    assert_eq!(summary.n_finished(), 1);
    assert_eq!(summary.n_failed(), 1);
    let bad = summary.jobs.iter().find(|j| j.name == "bad").expect("bad job in summary");
    assert_eq!(bad.state, JobState::Failed);
    assert_eq!(bad.exit_status, Some(3));
    assert!(bad.log_file.as_ref().map(|p| p.exists()).unwrap_or(false));

    assert!(matches!(report(&summary), Err(PipelineError::JobsFailed(1))));
    Ok(())
}


#[tokio::test]
async fn test_shutdown_terminates_running_jobs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "slow.sh", "sleep 30")?;

    let mut pipeline = PipelineRunner::new(simple_runner(&dir.path().join("logs")), Some(1), Duration::from_millis(20));
    pipeline.queue_job("slow1", dir.path().to_path_buf(), script.clone(), vec![]);
    pipeline.queue_job("slow2", dir.path().to_path_buf(), script.clone(), vec![]);

    let result = pipeline.run_until(tokio::time::sleep(Duration::from_millis(300))).await;
    assert!(matches!(result, Err(PipelineError::Interrupted(_))));
    assert_eq!(pipeline.n_running(), 0);
    assert_eq!(pipeline.n_waiting(), 0);
    let states: Vec<JobState> = pipeline.jobs().iter().map(|j| j.state).collect();
    assert_eq!(states, vec![JobState::Terminated, JobState::Waiting]);
    Ok(())
}


#[tokio::test]
async fn test_run_qc_over_fastq_dirs() -> Result<()> {
    let cwd = tempfile::tempdir()?;
    let run1 = cwd.path().join("run1");
    let run2 = cwd.path().join("run2");
    fs::create_dir_all(&run1)?;
    fs::create_dir_all(&run2)?;
    fs::write(run1.join("PB_1.fastq"), "@r\nA\n+\nI\n")?;
    fs::write(run1.join("PB_2.fastq"), "@r\nA\n+\nI\n")?;
    fs::write(run2.join("KL_1.fastq"), "@r\nA\n+\nI\n")?;
    write_script(cwd.path(), "illumina_qc.sh", "echo qc > \"$1.qc\"")?;

    let mut args = base_args("run_qc_pipeline");
    args.script = Some("illumina_qc.sh".to_string());
    args.dirs = vec!["run1".to_string(), "run2".to_string()];
    args.input_type = InputType::Fastq;
    args.max_concurrent_jobs = 1;

    let log_dir = cwd.path().join("logs");
    let summary = run_with_runner(run_config(cwd.path(), args), simple_runner(&log_dir)).await?;
    assert_eq!(summary.n_finished(), 3);
    assert_eq!(summary.peak_running, 1);
    assert!(report(&summary).is_ok());

    assert!(run1.join("PB_1.fastq.qc").exists());
    assert!(run1.join("PB_2.fastq.qc").exists());
    assert!(run2.join("KL_1.fastq.qc").exists());
    let names: Vec<&str> = summary.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["illumina_qc.PB_1", "illumina_qc.PB_2", "illumina_qc.KL_1"]);
    assert!(fs::read_dir(&log_dir)?.count() >= 3);
    Ok(())
}


#[tokio::test]
async fn test_run_qc_test_limit_and_empty_dirs() -> Result<()> {
    let cwd = tempfile::tempdir()?;
    for n in ["a_F3.csfasta", "a_F3_QV.qual", "b_F3.csfasta", "b_F3_QV.qual"] {
        fs::write(cwd.path().join(n), "")?;
    }
    write_script(cwd.path(), "solid_qc.sh", "test -f \"$2\"")?;

    let mut args = base_args("run_qc_pipeline");
    args.script = Some("solid_qc.sh".to_string());
    args.dirs = vec![".".to_string()];
    args.test = Some(1);
    let summary = run_with_runner(run_config(cwd.path(), args.clone()), simple_runner(&cwd.path().join("logs"))).await?;
    assert_eq!(summary.jobs.len(), 1);
    assert_eq!(summary.n_finished(), 1);

    args.test = None;
    args.input_type = InputType::FastqGz;
    let result = run_with_runner(run_config(cwd.path(), args), simple_runner(&cwd.path().join("logs"))).await;
    assert!(matches!(result, Err(PipelineError::MissingInput(_))));
    Ok(())
}
