use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ngs_qc_pipelines::config::defs::RunConfig;
use ngs_qc_pipelines::Arguments;

/// Writes an executable /bin/sh script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Arguments with the numeric defaults clap would fill in.
pub fn base_args(module: &str) -> Arguments {
    Arguments {
        module: module.to_string(),
        max_concurrent_jobs: 4,
        poll_interval: 0.05,
        subset: 1000,
        threads: 1,
        lock_timeout: 5,
        ..Default::default()
    }
}

pub fn run_config(cwd: &Path, args: Arguments) -> Arc<RunConfig> {
    Arc::new(RunConfig { cwd: cwd.to_path_buf(), args, physical_cores: 2 })
}
