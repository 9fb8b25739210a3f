use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{info, warn};
use crate::config::defs::{PipelineError, RunConfig, BOWTIE2_BUILD_TAG, BOWTIE_BUILD_TAG};
use crate::pipelines::{collect_outputs, StepTally};
use crate::utils::command::bowtie_build::{BowtieBuildConfig, BOWTIE2_INDEX_SUFFIXES, BOWTIE_INDEX_SUFFIXES};
use crate::utils::command::{check_min_version, generate_cli, run_tool, ToolConfig, Toolbox};
use crate::utils::file::{base_name, file_path_manipulator, require_file, scratch_dir};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Bowtie,
    BowtieColour,
    Bowtie2,
}

impl IndexKind {
    pub fn tool(&self) -> &'static str {
        match self {
            IndexKind::Bowtie | IndexKind::BowtieColour => BOWTIE_BUILD_TAG,
            IndexKind::Bowtie2 => BOWTIE2_BUILD_TAG,
        }
    }

    pub fn subdir(&self) -> &'static str {
        match self {
            IndexKind::Bowtie | IndexKind::BowtieColour => "bowtie",
            IndexKind::Bowtie2 => "bowtie2",
        }
    }

    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            IndexKind::Bowtie | IndexKind::BowtieColour => BOWTIE_INDEX_SUFFIXES,
            IndexKind::Bowtie2 => BOWTIE2_INDEX_SUFFIXES,
        }
    }

    pub fn basename(&self, name: &str) -> String {
        match self {
            IndexKind::BowtieColour => format!("{}_c", name),
            _ => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexStatus {
    Built(PathBuf),
    Skipped,
}


/// Builds one index in a scratch directory and moves the index files to
/// `<out_dir>/<subdir>/<basename><suffix>` once all of them exist.
///
/// # Arguments
///
/// * `toolbox` - Program lookup.
/// * `kind` - Which index to build.
/// * `fasta` - Reference sequences.
/// * `out_dir` - Parent of the `bowtie`/`bowtie2` directories.
/// * `threads` - Passed to bowtie2-build.
///
/// # Returns
/// IndexStatus::Skipped when the build program is not installed, otherwise
/// the index prefix.
///
pub async fn build_index(
    toolbox: &Toolbox,
    kind: IndexKind,
    fasta: &Path,
    out_dir: &Path,
    threads: usize,
) -> Result<IndexStatus, PipelineError> {
    let tool = kind.tool();
    if !toolbox.is_available(tool) {
        warn!("{} not found, skipping {:?} index", tool, kind);
        return Ok(IndexStatus::Skipped);
    }
    check_min_version(toolbox, tool).await;

    let basename = kind.basename(&base_name(fasta));
    let index_dir = out_dir.join(kind.subdir());
    let scratch = scratch_dir(out_dir, &format!("tmp.{}.", kind.subdir()))?;

    let config = BowtieBuildConfig {
        fasta: fasta.to_path_buf(),
        basename: basename.clone(),
        colour_space: kind == IndexKind::BowtieColour,
        threads,
    };
    let tool_config = match kind {
        IndexKind::Bowtie2 => ToolConfig::Bowtie2Build(config),
        _ => ToolConfig::BowtieBuild(config),
    };
    let args = generate_cli(tool, &tool_config).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    run_tool(toolbox, tool, &args, scratch.path()).await?;

    let absent: Vec<&str> = kind
        .suffixes()
        .iter()
        .copied()
        .filter(|s| !scratch.path().join(format!("{}{}", basename, s)).is_file())
        .collect();
    if !absent.is_empty() {
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("index {} incomplete, missing {}", basename, absent.join(", ")),
        });
    }

    let outputs: Vec<(String, PathBuf)> = kind
        .suffixes()
        .iter()
        .map(|s| {
            let file = format!("{}{}", basename, s);
            let dest = index_dir.join(&file);
            (file, dest)
        })
        .collect();
    collect_outputs(scratch.path(), &outputs)?;

    let prefix = index_dir.join(&basename);
    info!("Built {}", prefix.display());
    Ok(IndexStatus::Built(prefix))
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    run_with_toolbox(config, &Toolbox::new()).await
}

pub async fn run_with_toolbox(config: Arc<RunConfig>, toolbox: &Toolbox) -> Result<(), PipelineError> {
    println!("\n-------------\n Build Indexes\n-------------\n");
    let args = &config.args;

    let fasta = require_file(args.file1.as_ref(), &config.cwd, "FASTA (-i)")?;
    let out_dir = match &args.out_dir {
        Some(out) => file_path_manipulator(Path::new(out), Some(&config.cwd), None, None, ""),
        None => fasta.parent().map(Path::to_path_buf).unwrap_or_else(|| config.cwd.clone()),
    };
    std::fs::create_dir_all(&out_dir)?;
    info!("FASTA: {}", fasta.display());
    info!("Index directory: {}", out_dir.display());

    let mut tally = StepTally::new();
    let mut built = 0usize;
    for kind in [IndexKind::Bowtie, IndexKind::BowtieColour, IndexKind::Bowtie2] {
        let step = format!("{:?} index", kind);
        if let Some(IndexStatus::Built(_)) = tally.record(&step, build_index(toolbox, kind, &fasta, &out_dir, args.threads.max(1)).await) {
            built += 1;
        }
    }
    if built == 0 && tally.failed_steps().is_empty() {
        warn!("No index builder found on PATH, nothing was built");
    }

    tally.finish()
}
