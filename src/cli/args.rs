use clap::{Parser, ValueEnum};
use crate::config::defs::{DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_POLL_INTERVAL_SECS, FASTQ_SCREEN_SUBSET};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum InputType {
    #[default]
    Solid,
    #[value(name = "solid_paired_end")]
    SolidPairedEnd,
    Fastq,
    #[value(name = "fastqgz")]
    FastqGz,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum RunnerKind {
    #[default]
    Simple,
    #[value(name = "ge")]
    GridEngine,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ngs-qc", version, about = "QC and preprocessing pipelines for SOLiD and Illumina sequencing data")]
pub struct Arguments {

    #[arg(short, long, help = "One of: run_qc_pipeline, solid_qc, illumina_qc, fastq_screen, build_indexes")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'i', long = "file1", help = "Primary input: csfasta (solid_qc), FASTQ (illumina_qc, fastq_screen) or FASTA (build_indexes)")]
    pub file1: Option<String>,

    #[arg(short = 'I', long = "file2", help = "Secondary input: qual file for solid_qc")]
    pub file2: Option<String>,

    #[arg(short = 'o', long = "out", help = "Output directory. Defaults to 'qc' next to the inputs, or the FASTA's directory for build_indexes.")]
    pub out_dir: Option<String>,

    #[arg(short = 's', long)]
    pub script: Option<String>,

    #[arg(short = 'd', long = "dir", help = "Directory to search for datasets; may be repeated")]
    pub dirs: Vec<String>,

    #[arg(long = "input", default_value = "solid", value_enum)]
    pub input_type: InputType,

    #[arg(long, default_value = "simple", value_enum)]
    pub runner: RunnerKind,

    #[arg(long, visible_alias = "limit", default_value_t = DEFAULT_MAX_CONCURRENT_JOBS, help = "Maximum number of jobs running at once. 0 means unlimited (ge) or one per physical core (simple).")]
    pub max_concurrent_jobs: usize,

    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS, help = "Seconds between job status checks")]
    pub poll_interval: f64,

    #[arg(long, env = "NGS_QC_GE_QUEUE")]
    pub ge_queue: Option<String>,

    #[arg(long, help = "Only process datasets whose file name matches this regular expression")]
    pub regexp: Option<String>,

    #[arg(long = "test", help = "Submit only the first N datasets")]
    pub test: Option<usize>,

    #[arg(long, help = "Directory for job logs. Defaults to 'logs' in the current directory.")]
    pub log_dir: Option<String>,

    #[arg(long, default_value_t = false)]
    pub join_logs: bool,

    #[arg(long, env = "NGS_QC_FASTQ_SCREEN_CONF_DIR")]
    pub screen_conf_dir: Option<String>,

    #[arg(long, default_value_t = FASTQ_SCREEN_SUBSET, help = "Number of reads fastq_screen samples")]
    pub subset: u64,

    #[arg(long = "color", default_value_t = false, help = "Treat input as colour-space (fastq_screen module)")]
    pub colour_space: bool,

    #[arg(long, default_value_t = 1)]
    pub threads: usize,

    #[arg(long, default_value_t = 300, help = "Seconds to wait for a stats file lock")]
    pub lock_timeout: u64,
}
