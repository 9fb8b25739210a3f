use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{info, warn};
use crate::config::defs::{PipelineError, RunConfig, FASTQC_TAG};
use crate::pipelines::fastq_screen::{qc_dir_for, run_screens, tally_screens, ScreenSettings};
use crate::pipelines::StepTally;
use crate::utils::command::fastqc::FastqcConfig;
use crate::utils::command::{check_min_version, generate_cli, run_tool, ToolConfig, Toolbox};
use crate::utils::fastx::count_fastq_reads;
use crate::utils::file::{base_name, require_file};


/// Report files FastQC leaves in `qc_dir` for a FASTQ.
pub fn fastqc_outputs(fastq: &Path, qc_dir: &Path) -> (PathBuf, PathBuf) {
    let base = base_name(fastq);
    (
        qc_dir.join(format!("{}_fastqc.zip", base)),
        qc_dir.join(format!("{}_fastqc.html", base)),
    )
}


/// Runs FastQC into `qc_dir`.
///
/// # Returns
/// The expected report files that were not written. These are reported as
/// warnings only.
pub async fn fastqc(toolbox: &Toolbox, fastq: &Path, qc_dir: &Path, threads: usize) -> Result<Vec<PathBuf>, PipelineError> {
    toolbox.require(FASTQC_TAG)?;
    check_min_version(toolbox, FASTQC_TAG).await;
    std::fs::create_dir_all(qc_dir)?;

    let config = ToolConfig::Fastqc(FastqcConfig {
        fastq: fastq.to_path_buf(),
        outdir: qc_dir.to_path_buf(),
        threads,
    });
    let args = generate_cli(FASTQC_TAG, &config).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    run_tool(toolbox, FASTQC_TAG, &args, qc_dir).await?;

    let (zip, html) = fastqc_outputs(fastq, qc_dir);
    let missing: Vec<PathBuf> = [zip, html].into_iter().filter(|p| !p.exists()).collect();
    for m in &missing {
        warn!("FastQC did not produce {}", m.display());
    }
    Ok(missing)
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    run_with_toolbox(config, &Toolbox::new()).await
}

pub async fn run_with_toolbox(config: Arc<RunConfig>, toolbox: &Toolbox) -> Result<(), PipelineError> {
    println!("\n-------------\n Illumina QC\n-------------\n");
    let args = &config.args;

    let fastq = require_file(args.file1.as_ref(), &config.cwd, "FASTQ (-i)")?;
    let qc_dir = qc_dir_for(args.out_dir.as_ref(), &fastq, &config.cwd);
    info!("FASTQ: {}", fastq.display());
    info!("QC directory: {}", qc_dir.display());

    let counted = fastq.clone();
    match tokio::task::spawn_blocking(move || count_fastq_reads(&counted)).await {
        Ok(Ok(n)) => info!("{} reads in {}", n, fastq.display()),
        Ok(Err(e)) => warn!("Unable to count reads in {}: {}", fastq.display(), e),
        Err(e) => warn!("Read count task failed: {}", e),
    }

    let mut tally = StepTally::new();

    match &args.screen_conf_dir {
        Some(conf_dir) => {
            let settings = ScreenSettings {
                conf_dir: PathBuf::from(conf_dir),
                colour_space: false,
                subset: args.subset,
                threads: args.threads,
            };
            if let Some(results) = tally.record("fastq_screen", run_screens(toolbox, &fastq, &qc_dir, &settings).await) {
                tally_screens(&mut tally, results);
            }
        }
        None => warn!("No fastq_screen conf dir configured, skipping fastq_screen"),
    }

    tally.record("fastqc", fastqc(toolbox, &fastq, &qc_dir, args.threads.max(1)).await);

    tally.finish()
}
