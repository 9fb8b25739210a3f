/// Read-count statistics shared between concurrently running QC jobs
use std::path::Path;
use std::time::Duration;
use anyhow::Result;
use crate::utils::locks::append_line_locked;

pub const FILTER_STATS_HEADER: &str = "File\tReads\tReads after filter\tDifference\t% Filtered";


#[derive(Debug, Clone, PartialEq)]
pub struct FilterStats {
    pub file: String,
    pub reads: u64,
    pub filtered_reads: u64,
}

impl FilterStats {
    pub fn difference(&self) -> u64 {
        self.reads.saturating_sub(self.filtered_reads)
    }

    pub fn percent_filtered(&self) -> f64 {
        if self.reads == 0 {
            return 0.0;
        }
        self.difference() as f64 / self.reads as f64 * 100.0
    }

    pub fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{:.2}",
            self.file,
            self.reads,
            self.filtered_reads,
            self.difference(),
            self.percent_filtered()
        )
    }
}


/// Appends a row to a stats file shared by all jobs in a run, writing the header
/// first if the file does not exist yet. The check and the append happen under
/// the same lock.
///
/// # Arguments
///
/// * `stats_file` - Shared tab-delimited stats file.
/// * `stats` - Row to append.
/// * `timeout` - How long to wait for the lock.
///
pub async fn append_filter_stats(stats_file: &Path, stats: &FilterStats, timeout: Duration) -> Result<()> {
    append_line_locked(stats_file, &stats.to_row(), Some(FILTER_STATS_HEADER), timeout).await
}
