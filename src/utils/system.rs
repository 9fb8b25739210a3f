// src/utils/system.rs: System functions

use std::time::Duration;

use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tokio::time::sleep;
use anyhow::Result;

use crate::cli::RunnerKind;


/// Determines number of physical cores and the current CPU load
///
/// # Returns
///
/// Result<(usize, f32)> physical cores, current cpu usage
pub async fn detect_cores_and_load() -> Result<(usize, f32)> {
    let refresh_kind = RefreshKind::nothing().with_cpu(Default::default());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_all();
    let physical_cores = System::physical_core_count().unwrap_or(1).max(1);
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    // usage is a delta between two refreshes at least this far apart
    sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(Duration::from_millis(100))).await;
    system.refresh_cpu_usage();
    let cpu_load = system.global_cpu_usage();
    Ok((physical_cores, cpu_load))
}


/// Resolves the concurrency cap for a run.
///
/// # Arguments
///
/// * `requested` - Value of --max-concurrent-jobs; 0 requests "no limit".
/// * `runner` - Job runner in use.
/// * `physical_cores` - From detect_cores_and_load.
///
/// # Returns
///
/// Option<usize>: None when jobs are unlimited. A local runner is always
/// bounded by the core count when no explicit limit is given.
pub fn effective_max_jobs(requested: usize, runner: RunnerKind, physical_cores: usize) -> Option<usize> {
    match (requested, runner) {
        (0, RunnerKind::GridEngine) => None,
        (0, RunnerKind::Simple) => Some(physical_cores.max(1)),
        (n, _) => Some(n),
    }
}
