pub mod build_indexes;
pub mod fastq_screen;
pub mod illumina_qc;
pub mod run_qc;
pub mod solid_qc;

use std::path::{Path, PathBuf};
use log::{info, warn};
use crate::config::defs::PipelineError;
use crate::utils::file::move_file;


/// Records the outcome of best-effort steps: a failed step is logged and the
/// workflow carries on, the failure count is reported at the end.
#[derive(Debug, Default)]
pub struct StepTally {
    failed: Vec<String>,
}

impl StepTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<T>(&mut self, step: &str, result: Result<T, PipelineError>) -> Option<T> {
        match result {
            Ok(v) => {
                info!("{}: done", step);
                Some(v)
            }
            Err(e) => {
                warn!("{}: {}", step, e);
                self.failed.push(step.to_string());
                None
            }
        }
    }

    pub fn fail(&mut self, step: &str, reason: &str) {
        warn!("{}: {}", step, reason);
        self.failed.push(step.to_string());
    }

    pub fn failed_steps(&self) -> &[String] {
        &self.failed
    }

    pub fn finish(self) -> Result<(), PipelineError> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::StepsFailed(self.failed.len()))
        }
    }
}


/// Moves expected outputs from a scratch directory to their final names.
///
/// # Arguments
///
/// * `scratch` - Directory the tool wrote into.
/// * `outputs` - (file name in scratch, final destination) pairs.
///
/// # Returns
/// The file names that were not produced. Outputs that exist are moved even
/// when others are missing.
pub fn collect_outputs(scratch: &Path, outputs: &[(String, PathBuf)]) -> Result<Vec<String>, PipelineError> {
    let mut missing = Vec::new();
    for (name, dest) in outputs {
        let src = scratch.join(name);
        if src.is_file() {
            move_file(&src, dest)?;
        } else {
            missing.push(name.clone());
        }
    }
    Ok(missing)
}
