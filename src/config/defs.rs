use std::path::PathBuf;
use std::time::Duration;
use crate::cli::Arguments;
use lazy_static::lazy_static;
use std::collections::HashMap;
use thiserror::Error;

// External software
pub const GZIP_EXT: &str = "gz";
pub const FASTQ_SCREEN_TAG: &str = "fastq_screen";
pub const FASTQC_TAG: &str = "fastqc";
pub const SOLID2FASTQ_TAG: &str = "solid2fastq";
pub const SOLID_PREPROCESS_FILTER_TAG: &str = "SOLiD_preprocess_filter_v2.pl";
pub const BOXPLOTTER_TAG: &str = "qc_boxplotter";
pub const BOWTIE_BUILD_TAG: &str = "bowtie-build";
pub const BOWTIE2_BUILD_TAG: &str = "bowtie2-build";
pub const QSUB_TAG: &str = "qsub";
pub const QSTAT_TAG: &str = "qstat";
pub const QDEL_TAG: &str = "qdel";
pub const QACCT_TAG: &str = "qacct";


lazy_static! {
    pub static ref TOOL_VERSIONS: HashMap<&'static str, (u32, u32)> = {
        let mut m = HashMap::new();
        m.insert(FASTQ_SCREEN_TAG, (0, 3));
        m.insert(FASTQC_TAG, (0, 10));
        m.insert(BOWTIE_BUILD_TAG, (0, 12));
        m.insert(BOWTIE2_BUILD_TAG, (2, 0));

        m
    };
}

// fastq_screen switched from full-filename to stem-based output names at this version
pub const FASTQ_SCREEN_STEM_NAMING_VERSION: (u32, u32) = (0, 4);
pub const FASTQ_SCREEN_SUBSET: u64 = 1_000_000;
pub const FASTQ_SCREENS: &[&str] = &["model_organisms", "other_organisms", "rRNA"];

// Static Filenames
pub const QC_DIR: &str = "qc";
pub const LOG_DIR: &str = "logs";
pub const SOLID_FILTER_STATS: &str = "SOLiD_preprocess_filter.stats";
pub const LOCK_EXT: &str = "lock";

pub const CSFASTA_EXT: &str = "csfasta";
pub const QUAL_EXT: &str = "qual";
pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];
pub const SEQ_EXTS: &[&'static str] = &["csfasta", "qual", "fastq", "fq", "fasta", "fa", "gz"];

// Static Parameters
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 30.0;
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(300);
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_secs(1);


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Required program not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Job submission failed for {name}: {error}")]
    JobSubmission { name: String, error: String },

    #[error("Timed out after {timeout:?} waiting for lock on {path}")]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("{0} job(s) failed")]
    JobsFailed(usize),

    #[error("{0} step(s) failed")]
    StepsFailed(usize),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IOError(err.to_string())
    }
}


pub struct RunConfig {
    pub cwd: PathBuf,
    pub args: Arguments,
    pub physical_cores: usize,
}
