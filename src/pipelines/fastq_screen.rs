use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{info, warn};
use crate::config::defs::{PipelineError, RunConfig, FASTQ_SCREENS, FASTQ_SCREEN_TAG, QC_DIR};
use crate::pipelines::{collect_outputs, StepTally};
use crate::utils::command::fastq_screen::{output_base, FastqScreenConfig};
use crate::utils::command::{check_min_version, generate_cli, run_tool, ToolConfig, Toolbox};
use crate::utils::file::{base_name, file_path_manipulator, require_file, scratch_dir};


#[derive(Debug, Clone)]
pub struct ScreenSettings {
    pub conf_dir: PathBuf,
    pub colour_space: bool,
    pub subset: u64,
    pub threads: usize,
}

impl ScreenSettings {
    pub fn conf_file(&self, screen: &str) -> PathBuf {
        let name = if self.colour_space {
            format!("fastq_screen_{}_color.conf", screen)
        } else {
            format!("fastq_screen_{}.conf", screen)
        };
        self.conf_dir.join(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScreenStatus {
    Done,
    Skipped,
    Failed(String),
}


/// Final names of one screen's outputs: `<qc_dir>/<base>_<screen>_screen.{txt,png}`.
pub fn screen_outputs(fastq: &Path, qc_dir: &Path, screen: &str) -> (PathBuf, PathBuf) {
    let base = base_name(fastq);
    (
        qc_dir.join(format!("{}_{}_screen.txt", base, screen)),
        qc_dir.join(format!("{}_{}_screen.png", base, screen)),
    )
}


/// Runs every standard screen against a FASTQ.
///
/// Each screen runs in its own scratch directory under `qc_dir`; the outputs
/// are renamed to include the screen name and moved into `qc_dir`. Screens
/// whose outputs already exist are skipped.
///
/// # Arguments
///
/// * `toolbox` - Program lookup.
/// * `fastq` - Input reads.
/// * `qc_dir` - Where the renamed outputs go.
/// * `settings` - Conf location and fastq_screen options.
///
/// # Returns
/// (screen name, status) for each screen.
///
pub async fn run_screens(
    toolbox: &Toolbox,
    fastq: &Path,
    qc_dir: &Path,
    settings: &ScreenSettings,
) -> Result<Vec<(String, ScreenStatus)>, PipelineError> {
    toolbox.require(FASTQ_SCREEN_TAG)?;
    let version = check_min_version(toolbox, FASTQ_SCREEN_TAG).await;
    let tool_base = output_base(fastq, version);
    std::fs::create_dir_all(qc_dir)?;

    let mut results = Vec::new();
    for &screen in FASTQ_SCREENS {
        let (txt, png) = screen_outputs(fastq, qc_dir, screen);
        if txt.exists() && png.exists() {
            info!("{} screen outputs already present for {}, skipping", screen, fastq.display());
            results.push((screen.to_string(), ScreenStatus::Skipped));
            continue;
        }

        let conf = settings.conf_file(screen);
        if !conf.is_file() {
            warn!("No conf file {} for {} screen", conf.display(), screen);
            results.push((screen.to_string(), ScreenStatus::Failed(format!("missing {}", conf.display()))));
            continue;
        }

        let scratch = scratch_dir(qc_dir, "tmp.fastq_screen.")?;
        let config = ToolConfig::FastqScreen(FastqScreenConfig {
            fastq: fastq.to_path_buf(),
            conf,
            outdir: scratch.path().to_path_buf(),
            subset: settings.subset,
            colour_space: settings.colour_space,
            threads: settings.threads,
        });
        let args = generate_cli(FASTQ_SCREEN_TAG, &config)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        if let Err(e) = run_tool(toolbox, FASTQ_SCREEN_TAG, &args, scratch.path()).await {
            results.push((screen.to_string(), ScreenStatus::Failed(e.to_string())));
            continue;
        }

        let missing = collect_outputs(scratch.path(), &[
            (format!("{}_screen.txt", tool_base), txt),
            (format!("{}_screen.png", tool_base), png),
        ])?;
        let status = if missing.is_empty() {
            ScreenStatus::Done
        } else {
            warn!("{} screen did not produce {}", screen, missing.join(", "));
            ScreenStatus::Failed(format!("missing {}", missing.join(", ")))
        };
        results.push((screen.to_string(), status));
    }
    Ok(results)
}


/// Records each screen as a step of a larger workflow.
pub fn tally_screens(tally: &mut StepTally, results: Vec<(String, ScreenStatus)>) {
    for (screen, status) in results {
        let step = format!("fastq_screen {}", screen);
        match status {
            ScreenStatus::Done | ScreenStatus::Skipped => {
                tally.record(&step, Ok(()));
            }
            ScreenStatus::Failed(reason) => tally.fail(&step, &reason),
        }
    }
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    run_with_toolbox(config, &Toolbox::new()).await
}

pub async fn run_with_toolbox(config: Arc<RunConfig>, toolbox: &Toolbox) -> Result<(), PipelineError> {
    println!("\n-------------\n FastQ Screen\n-------------\n");
    let args = &config.args;

    let fastq = require_file(args.file1.as_ref(), &config.cwd, "FASTQ (-i)")?;
    let conf_dir = args
        .screen_conf_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("--screen-conf-dir (or NGS_QC_FASTQ_SCREEN_CONF_DIR) is required".to_string()))?;
    let qc_dir = qc_dir_for(args.out_dir.as_ref(), &fastq, &config.cwd);

    let settings = ScreenSettings {
        conf_dir,
        colour_space: args.colour_space,
        subset: args.subset,
        threads: args.threads,
    };

    let results = run_screens(toolbox, &fastq, &qc_dir, &settings).await?;
    let mut tally = StepTally::new();
    tally_screens(&mut tally, results);
    tally.finish()
}


/// Output directory: `--out` if given, otherwise `qc` beside the input.
pub fn qc_dir_for(out_dir: Option<&String>, input: &Path, cwd: &Path) -> PathBuf {
    match out_dir {
        Some(out) => file_path_manipulator(Path::new(out), Some(cwd), None, None, ""),
        None => input
            .parent()
            .map(|p| p.join(QC_DIR))
            .unwrap_or_else(|| cwd.join(QC_DIR)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conf_file_names() {
        let mut s = ScreenSettings { conf_dir: PathBuf::from("/conf"), colour_space: false, subset: 10, threads: 1 };
        assert_eq!(s.conf_file("rRNA"), PathBuf::from("/conf/fastq_screen_rRNA.conf"));
        s.colour_space = true;
        assert_eq!(s.conf_file("rRNA"), PathBuf::from("/conf/fastq_screen_rRNA_color.conf"));
    }

    #[test]
    fn test_screen_outputs() {
        let (txt, png) = screen_outputs(Path::new("/d/s1.fastq.gz"), Path::new("/d/qc"), "model_organisms");
        assert_eq!(txt, PathBuf::from("/d/qc/s1_model_organisms_screen.txt"));
        assert_eq!(png, PathBuf::from("/d/qc/s1_model_organisms_screen.png"));
    }

    #[test]
    fn test_qc_dir_for() {
        let cwd = Path::new("/work");
        assert_eq!(qc_dir_for(None, Path::new("/d/s.fastq"), cwd), PathBuf::from("/d/qc"));
        assert_eq!(qc_dir_for(Some(&"out".to_string()), Path::new("/d/s.fastq"), cwd), PathBuf::from("/work/out"));
    }
}
