use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use log::{info, warn};
use crate::config::defs::{
    PipelineError, RunConfig, BOXPLOTTER_TAG, SOLID2FASTQ_TAG, SOLID_FILTER_STATS, SOLID_PREPROCESS_FILTER_TAG,
};
use crate::pipelines::fastq_screen::{qc_dir_for, run_screens, tally_screens, ScreenSettings};
use crate::pipelines::{collect_outputs, StepTally};
use crate::utils::command::preprocess_filter::{self, PreprocessFilterConfig};
use crate::utils::command::solid2fastq::Solid2FastqConfig;
use crate::utils::command::{generate_cli, run_tool, ToolConfig, Toolbox};
use crate::utils::fastx::count_csfasta_reads;
use crate::utils::file::{base_name, require_file, scratch_dir};
use crate::utils::stats::{append_filter_stats, FilterStats};


/// Converts a csfasta/qual pair to `<out_base>.fastq`. Does nothing if the
/// FASTQ already exists.
///
/// # Arguments
///
/// * `toolbox` - Program lookup.
/// * `csfasta` - Colour-space reads.
/// * `qual` - Matching qualities.
/// * `out_base` - Destination path without the `.fastq` extension.
///
/// # Returns
/// Path of the FASTQ.
///
pub async fn solid2fastq(toolbox: &Toolbox, csfasta: &Path, qual: &Path, out_base: &Path) -> Result<PathBuf, PipelineError> {
    let fastq = PathBuf::from(format!("{}.fastq", out_base.display()));
    if fastq.exists() {
        info!("{} already exists, skipping conversion", fastq.display());
        return Ok(fastq);
    }
    let work_dir = out_base.parent().unwrap_or_else(|| Path::new("."));
    let name = out_base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reads".to_string());

    let scratch = scratch_dir(work_dir, "tmp.solid2fastq.")?;
    let config = ToolConfig::Solid2Fastq(Solid2FastqConfig {
        csfasta: csfasta.to_path_buf(),
        qual: qual.to_path_buf(),
        prefix: scratch.path().join(&name),
    });
    let args = generate_cli(SOLID2FASTQ_TAG, &config).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    run_tool(toolbox, SOLID2FASTQ_TAG, &args, scratch.path()).await?;

    let missing = collect_outputs(scratch.path(), &[(format!("{}.fastq", name), fastq.clone())])?;
    if !missing.is_empty() {
        return Err(PipelineError::ToolExecution {
            tool: SOLID2FASTQ_TAG.to_string(),
            error: format!("no output {}", missing.join(", ")),
        });
    }
    Ok(fastq)
}


/// Runs the SOLiD preprocess filter and moves its filtered csfasta/qual into
/// `work_dir`.
///
/// # Returns
/// (filtered csfasta, filtered qual)
pub async fn preprocess_filter(
    toolbox: &Toolbox,
    csfasta: &Path,
    qual: &Path,
    work_dir: &Path,
) -> Result<(PathBuf, PathBuf), PipelineError> {
    let prefix = base_name(csfasta);
    let (cs_name, qual_name) = preprocess_filter::outputs(&prefix);
    let filtered_cs = work_dir.join(&cs_name);
    let filtered_qual = work_dir.join(&qual_name);
    if filtered_cs.exists() && filtered_qual.exists() {
        info!("Filtered files for {} already exist, skipping filter", prefix);
        return Ok((filtered_cs, filtered_qual));
    }

    let scratch = scratch_dir(work_dir, "tmp.preprocess_filter.")?;
    let config = ToolConfig::PreprocessFilter(PreprocessFilterConfig {
        csfasta: csfasta.to_path_buf(),
        qual: qual.to_path_buf(),
        prefix: prefix.clone(),
    });
    let args = generate_cli(SOLID_PREPROCESS_FILTER_TAG, &config).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    run_tool(toolbox, SOLID_PREPROCESS_FILTER_TAG, &args, scratch.path()).await?;

    let missing = collect_outputs(scratch.path(), &[
        (cs_name, filtered_cs.clone()),
        (qual_name, filtered_qual.clone()),
    ])?;
    if !missing.is_empty() {
        return Err(PipelineError::ToolExecution {
            tool: SOLID_PREPROCESS_FILTER_TAG.to_string(),
            error: format!("no output {}", missing.join(", ")),
        });
    }
    Ok((filtered_cs, filtered_qual))
}


/// Counts reads before and after filtering and appends the row to the run's
/// shared stats file.
pub async fn record_filter_stats(
    csfasta: &Path,
    filtered_csfasta: &Path,
    stats_file: &Path,
    lock_timeout: Duration,
) -> Result<FilterStats, PipelineError> {
    let before = csfasta.to_path_buf();
    let after = filtered_csfasta.to_path_buf();
    let (reads, filtered_reads) = tokio::task::spawn_blocking(move || -> std::io::Result<(u64, u64)> {
        Ok((count_csfasta_reads(&before)?, count_csfasta_reads(&after)?))
    })
        .await
        .map_err(|e| PipelineError::IOError(e.to_string()))??;

    let stats = FilterStats {
        file: csfasta
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        reads,
        filtered_reads,
    };
    append_filter_stats(stats_file, &stats, lock_timeout)
        .await
        .map_err(|e| match e.downcast::<PipelineError>() {
            Ok(pe) => pe,
            Err(other) => PipelineError::IOError(other.to_string()),
        })?;
    info!("{}: {} reads, {} after filter", stats.file, reads, filtered_reads);
    Ok(stats)
}


/// Produces the quality boxplot for a qual file in `qc_dir`.
pub async fn boxplot(toolbox: &Toolbox, qual: &Path, qc_dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(qc_dir)?;
    let args = generate_cli(BOXPLOTTER_TAG, &ToolConfig::Boxplotter(qual.to_path_buf()))
        .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    run_tool(toolbox, BOXPLOTTER_TAG, &args, qc_dir).await?;

    let qual_name = qual.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let produced = std::fs::read_dir(qc_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .any(|n| n.starts_with(&qual_name) && n.contains("boxplot"));
    if !produced {
        return Err(PipelineError::ToolExecution {
            tool: BOXPLOTTER_TAG.to_string(),
            error: format!("no boxplot for {}", qual_name),
        });
    }
    Ok(())
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    run_with_toolbox(config, &Toolbox::new()).await
}

/// SOLiD QC for one csfasta/qual pair. Every step is attempted even when an
/// earlier one fails, except where a step needs a previous step's output.
pub async fn run_with_toolbox(config: Arc<RunConfig>, toolbox: &Toolbox) -> Result<(), PipelineError> {
    println!("\n-------------\n SOLiD QC\n-------------\n");
    let args = &config.args;

    let csfasta = require_file(args.file1.as_ref(), &config.cwd, "csfasta (-i)")?;
    let qual = require_file(args.file2.as_ref(), &config.cwd, "qual (-I)")?;
    let work_dir = csfasta.parent().map(Path::to_path_buf).unwrap_or_else(|| config.cwd.clone());
    let qc_dir = qc_dir_for(args.out_dir.as_ref(), &csfasta, &config.cwd);
    let base = base_name(&csfasta);
    info!("csfasta: {}", csfasta.display());
    info!("qual: {}", qual.display());

    let mut tally = StepTally::new();

    let fastq = tally.record("solid2fastq", solid2fastq(toolbox, &csfasta, &qual, &work_dir.join(&base)).await);

    match (&fastq, &args.screen_conf_dir) {
        (Some(fastq), Some(conf_dir)) => {
            let settings = ScreenSettings {
                conf_dir: PathBuf::from(conf_dir),
                colour_space: true,
                subset: args.subset,
                threads: args.threads,
            };
            if let Some(results) = tally.record("fastq_screen", run_screens(toolbox, fastq, &qc_dir, &settings).await) {
                tally_screens(&mut tally, results);
            }
        }
        (None, _) => warn!("No FASTQ available, skipping fastq_screen"),
        (_, None) => warn!("No fastq_screen conf dir configured, skipping fastq_screen"),
    }

    let filtered = tally.record("preprocess filter", preprocess_filter(toolbox, &csfasta, &qual, &work_dir).await);
    if let Some((filtered_cs, filtered_qual)) = &filtered {
        let filtered_base = work_dir.join(base_name(filtered_cs));
        tally.record(
            "solid2fastq (filtered)",
            solid2fastq(toolbox, filtered_cs, filtered_qual, &filtered_base).await,
        );
        tally.record(
            "filter stats",
            record_filter_stats(
                &csfasta,
                filtered_cs,
                &work_dir.join(SOLID_FILTER_STATS),
                Duration::from_secs(args.lock_timeout),
            )
                .await,
        );
    }

    tally.record("boxplot", boxplot(toolbox, &qual, &qc_dir).await);

    tally.finish()
}
