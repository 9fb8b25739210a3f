/// Functions and structs for locating external programs and creating their command lines

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use tokio::process::Command;
use crate::config::defs::{PipelineError, TOOL_VERSIONS};

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"^v?(\d+)\.(\d+)(?:\.(\d+))?").unwrap();
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolVersion {
    pub fn at_least(&self, (major, minor): (u32, u32)) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl std::fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}


/// Pulls the first version-looking token out of a tool's `--version` output,
/// e.g. `FastQ Screen v0.4.2` or `/usr/bin/bowtie-build-s version 1.3.1`.
pub fn parse_version(output: &str) -> Option<ToolVersion> {
    for token in output.split_whitespace() {
        if let Some(caps) = VERSION_RE.captures(token) {
            let major = caps.get(1)?.as_str().parse().ok()?;
            let minor = caps.get(2)?.as_str().parse().ok()?;
            let patch = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            return Some(ToolVersion { major, minor, patch });
        }
    }
    None
}


/// Searches PATH for an executable. Names containing a path separator are
/// checked directly.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}


/// Resolves tool tags to the programs actually invoked. Defaults to the tag
/// itself looked up on PATH; individual tools can be pointed elsewhere.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    overrides: HashMap<String, PathBuf>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, tag: &str, program: impl Into<PathBuf>) -> Self {
        self.overrides.insert(tag.to_string(), program.into());
        self
    }

    pub fn program(&self, tag: &str) -> PathBuf {
        self.overrides
            .get(tag)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(tag))
    }

    pub fn is_available(&self, tag: &str) -> bool {
        find_program(&self.program(tag).to_string_lossy()).is_some()
    }

    /// Errors with ToolNotFound unless the tool can be found.
    pub fn require(&self, tag: &str) -> Result<PathBuf, PipelineError> {
        let program = self.program(tag);
        find_program(&program.to_string_lossy()).ok_or_else(|| PipelineError::ToolNotFound(tag.to_string()))
    }
}


#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}


/// Runs a tool to completion, capturing its output.
///
/// # Arguments
///
/// * `toolbox` - Program lookup.
/// * `tag` - Tool tag, e.g. FASTQC_TAG.
/// * `args` - Command line from generate_cli.
/// * `working_dir` - Directory the tool runs in.
///
/// # Returns
/// ToolOutput on a zero exit status, PipelineError::ToolExecution otherwise.
///
pub async fn run_tool(toolbox: &Toolbox, tag: &str, args: &[String], working_dir: &Path) -> Result<ToolOutput, PipelineError> {
    let output = capture_tool(toolbox, tag, args, working_dir).await?;
    if !output.success() {
        return Err(PipelineError::ToolExecution {
            tool: tag.to_string(),
            error: format!("exit status {:?}: {}", output.code, output.stderr.trim()),
        });
    }
    Ok(output)
}

/// Like run_tool but a non-zero exit is returned rather than treated as an error.
pub async fn capture_tool(toolbox: &Toolbox, tag: &str, args: &[String], working_dir: &Path) -> Result<ToolOutput, PipelineError> {
    let program = toolbox.program(tag);
    debug!("Running {} {} in {}", program.display(), args.join(" "), working_dir.display());

    let output = Command::new(&program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::ToolNotFound(tag.to_string()),
            _ => PipelineError::ToolExecution { tool: tag.to_string(), error: e.to_string() },
        })?;

    Ok(ToolOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}


pub mod fastq_screen {
    use std::path::{Path, PathBuf};
    use crate::config::defs::FASTQ_SCREEN_STEM_NAMING_VERSION;
    use crate::utils::command::ToolVersion;
    use crate::utils::file::base_name;

    #[derive(Debug, Clone)]
    pub struct FastqScreenConfig {
        pub fastq: PathBuf,
        pub conf: PathBuf,
        pub outdir: PathBuf,
        pub subset: u64,
        pub colour_space: bool,
        pub threads: usize,
    }

    pub fn arg_generator(config: &FastqScreenConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        if config.colour_space {
            args_vec.push("--color".to_string());
        }
        args_vec.push("--subset".to_string());
        args_vec.push(config.subset.to_string());
        args_vec.push("--threads".to_string());
        args_vec.push(config.threads.to_string());
        args_vec.push("--conf".to_string());
        args_vec.push(config.conf.to_string_lossy().to_string());
        args_vec.push("--outdir".to_string());
        args_vec.push(config.outdir.to_string_lossy().to_string());
        args_vec.push(config.fastq.to_string_lossy().to_string());
        args_vec
    }

    /// Base name fastq_screen gives its outputs: older releases keep the whole
    /// file name, newer ones drop the FASTQ extensions.
    pub fn output_base(fastq: &Path, version: Option<ToolVersion>) -> String {
        let stem_naming = version.map(|v| v.at_least(FASTQ_SCREEN_STEM_NAMING_VERSION)).unwrap_or(true);
        if stem_naming {
            base_name(fastq)
        } else {
            fastq.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        }
    }
}

pub mod fastqc {
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct FastqcConfig {
        pub fastq: PathBuf,
        pub outdir: PathBuf,
        pub threads: usize,
    }

    pub fn arg_generator(config: &FastqcConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--outdir".to_string());
        args_vec.push(config.outdir.to_string_lossy().to_string());
        args_vec.push("--noextract".to_string());
        args_vec.push("--threads".to_string());
        args_vec.push(config.threads.to_string());
        args_vec.push(config.fastq.to_string_lossy().to_string());
        args_vec
    }
}

pub mod solid2fastq {
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct Solid2FastqConfig {
        pub csfasta: PathBuf,
        pub qual: PathBuf,
        pub prefix: PathBuf,
    }

    pub fn arg_generator(config: &Solid2FastqConfig) -> Vec<String> {
        vec![
            "-o".to_string(),
            config.prefix.to_string_lossy().to_string(),
            config.csfasta.to_string_lossy().to_string(),
            config.qual.to_string_lossy().to_string(),
        ]
    }
}

pub mod preprocess_filter {
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct PreprocessFilterConfig {
        pub csfasta: PathBuf,
        pub qual: PathBuf,
        pub prefix: String,
    }

    // Quality and polyclonal thresholds used by the SOLiD core facility runs
    pub fn arg_generator(config: &PreprocessFilterConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        for (flag, value) in [
            ("-o", config.prefix.as_str()),
            ("-x", "y"),
            ("-p", "3"),
            ("-q", "22"),
            ("-y", "y"),
            ("-e", "10"),
            ("-d", "9"),
        ] {
            args_vec.push(flag.to_string());
            args_vec.push(value.to_string());
        }
        args_vec.push("-f".to_string());
        args_vec.push(config.csfasta.to_string_lossy().to_string());
        args_vec.push("-g".to_string());
        args_vec.push(config.qual.to_string_lossy().to_string());
        args_vec
    }

    /// Output pair written by the filter for a given prefix.
    pub fn outputs(prefix: &str) -> (String, String) {
        (format!("{}_T_F3.csfasta", prefix), format!("{}_QV_T_F3.qual", prefix))
    }
}

pub mod bowtie_build {
    use std::path::PathBuf;

    pub const BOWTIE_INDEX_SUFFIXES: &[&str] = &[".1.ebwt", ".2.ebwt", ".3.ebwt", ".4.ebwt", ".rev.1.ebwt", ".rev.2.ebwt"];
    pub const BOWTIE2_INDEX_SUFFIXES: &[&str] = &[".1.bt2", ".2.bt2", ".3.bt2", ".4.bt2", ".rev.1.bt2", ".rev.2.bt2"];

    #[derive(Debug, Clone)]
    pub struct BowtieBuildConfig {
        pub fasta: PathBuf,
        pub basename: String,
        pub colour_space: bool,
        pub threads: usize,
    }

    pub fn bowtie_arg_generator(config: &BowtieBuildConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        if config.colour_space {
            args_vec.push("-C".to_string());
        }
        args_vec.push("-f".to_string());
        args_vec.push(config.fasta.to_string_lossy().to_string());
        args_vec.push(config.basename.clone());
        args_vec
    }

    pub fn bowtie2_arg_generator(config: &BowtieBuildConfig) -> Vec<String> {
        vec![
            "--threads".to_string(),
            config.threads.to_string(),
            "-f".to_string(),
            config.fasta.to_string_lossy().to_string(),
            config.basename.clone(),
        ]
    }
}

pub mod boxplotter {
    use std::path::PathBuf;

    pub fn arg_generator(qual: &PathBuf) -> Vec<String> {
        vec![qual.to_string_lossy().to_string()]
    }
}


/// Tool-specific configuration views accepted by generate_cli.
#[derive(Debug, Clone)]
pub enum ToolConfig {
    FastqScreen(fastq_screen::FastqScreenConfig),
    Fastqc(fastqc::FastqcConfig),
    Solid2Fastq(solid2fastq::Solid2FastqConfig),
    PreprocessFilter(preprocess_filter::PreprocessFilterConfig),
    BowtieBuild(bowtie_build::BowtieBuildConfig),
    Bowtie2Build(bowtie_build::BowtieBuildConfig),
    Boxplotter(PathBuf),
}

pub fn generate_cli(tool: &str, config: &ToolConfig) -> Result<Vec<String>> {
    use crate::config::defs::*;

    let cmd = match (tool, config) {
        (FASTQ_SCREEN_TAG, ToolConfig::FastqScreen(c)) => fastq_screen::arg_generator(c),
        (FASTQC_TAG, ToolConfig::Fastqc(c)) => fastqc::arg_generator(c),
        (SOLID2FASTQ_TAG, ToolConfig::Solid2Fastq(c)) => solid2fastq::arg_generator(c),
        (SOLID_PREPROCESS_FILTER_TAG, ToolConfig::PreprocessFilter(c)) => preprocess_filter::arg_generator(c),
        (BOWTIE_BUILD_TAG, ToolConfig::BowtieBuild(c)) => bowtie_build::bowtie_arg_generator(c),
        (BOWTIE2_BUILD_TAG, ToolConfig::Bowtie2Build(c)) => bowtie_build::bowtie2_arg_generator(c),
        (BOXPLOTTER_TAG, ToolConfig::Boxplotter(q)) => boxplotter::arg_generator(q),
        _ => return Err(anyhow!("Unknown tool or mismatched config: {}", tool)),
    };

    Ok(cmd)
}


/// Runs `<tool> --version` and parses the reported version.
pub async fn check_version(toolbox: &Toolbox, tool: &str) -> Result<ToolVersion> {
    let cwd = env::current_dir()?;
    let output = capture_tool(toolbox, tool, &["--version".to_string()], &cwd).await?;
    let text = if output.stdout.trim().is_empty() { &output.stderr } else { &output.stdout };
    parse_version(text).ok_or_else(|| anyhow!("Could not parse {} version from: {}", tool, text.trim()))
}

/// Version check that only warns: an unparseable or old version is reported
/// but the tool is still used.
pub async fn check_min_version(toolbox: &Toolbox, tool: &str) -> Option<ToolVersion> {
    match check_version(toolbox, tool).await {
        Ok(version) => {
            if let Some(&min) = TOOL_VERSIONS.get(tool) {
                if !version.at_least(min) {
                    warn!("{} version {} is older than the tested minimum {}.{}", tool, version, min.0, min.1);
                }
            }
            debug!("{} version {}", tool, version);
            Some(version)
        }
        Err(e) => {
            warn!("Unable to determine {} version: {}", tool, e);
            None
        }
    }
}
