//! Cooperative lock files for files shared between concurrently running jobs.
//!
//! A lock on `path` is the file `path.lock`, created with `create_new` so that
//! exactly one process wins. Other processes poll until the lock disappears or
//! their timeout expires. This gives mutual exclusion for appends only; there is
//! no ordering guarantee and a crashed holder leaves a stale lock behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use log::{debug, warn};
use sysinfo::System;
use tokio::time::sleep;
use crate::config::defs::{PipelineError, LOCK_EXT, LOCK_RETRY_INTERVAL};


/// Held lock. Released on `unlock` or drop.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
    released: bool,
}

impl FileLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn unlock(mut self) -> io::Result<()> {
        self.released = true;
        remove_lock(&self.lock_path)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = remove_lock(&self.lock_path) {
                warn!("Failed to remove lock {}: {}", self.lock_path.display(), e);
            }
        }
    }
}


pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(LOCK_EXT);
    PathBuf::from(name)
}

fn remove_lock(lock_path: &Path) -> io::Result<()> {
    match fs::remove_file(lock_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn try_lock(lock_path: &Path) -> io::Result<bool> {
    try_lock_with(lock_path, |f| {
        let host = System::host_name().unwrap_or_else(|| "unknown".to_string());
        writeln!(f, "{}@{}", std::process::id(), host)
    })
}

/// Creates the lock file and records the holder with `write_holder`. A lock
/// whose holder could not be written is removed again.
fn try_lock_with<F>(lock_path: &Path, write_holder: F) -> io::Result<bool>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    match OpenOptions::new().write(true).create_new(true).open(lock_path) {
        Ok(mut f) => match write_holder(&mut f) {
            Ok(()) => Ok(true),
            Err(e) => {
                drop(f);
                if let Err(rm) = remove_lock(lock_path) {
                    warn!("Failed to remove lock {}: {}", lock_path.display(), rm);
                }
                Err(e)
            }
        },
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}


/// Waits until the lock on `path` can be taken.
///
/// # Arguments
///
/// * `path` - The shared file being protected (not the lock file itself).
/// * `timeout` - Give up after this long.
/// * `retry_interval` - Delay between attempts.
///
/// # Returns
/// FileLock guard, or PipelineError::LockTimeout.
///
pub async fn wait_for_lock(path: &Path, timeout: Duration, retry_interval: Duration) -> Result<FileLock, PipelineError> {
    let lock_path = lock_path_for(path);
    let start = Instant::now();

    loop {
        if try_lock(&lock_path)? {
            debug!("Acquired lock {}", lock_path.display());
            return Ok(FileLock { lock_path, released: false });
        }
        if start.elapsed() >= timeout {
            return Err(PipelineError::LockTimeout { path: path.to_path_buf(), timeout });
        }
        debug!("Waiting for lock {}", lock_path.display());
        sleep(retry_interval.min(timeout.saturating_sub(start.elapsed())).max(Duration::from_millis(1))).await;
    }
}


/// Removes the lock on `path` regardless of who holds it.
pub fn unlock_file(path: &Path) -> io::Result<()> {
    remove_lock(&lock_path_for(path))
}


/// Appends one line to `path` while holding its lock. When `header` is given
/// and the file is new or empty, the header is written first.
pub async fn append_line_locked(path: &Path, line: &str, header: Option<&str>, timeout: Duration) -> Result<()> {
    append_line_locked_with_retry(path, line, header, timeout, LOCK_RETRY_INTERVAL).await
}

pub async fn append_line_locked_with_retry(
    path: &Path,
    line: &str,
    header: Option<&str>,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<()> {
    let lock = wait_for_lock(path, timeout, retry_interval).await?;

    let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for append", path.display()))?;
    if is_new {
        if let Some(h) = header {
            writeln!(file, "{}", h)?;
        }
    }
    writeln!(file, "{}", line)?;
    file.flush()?;
    drop(file);

    lock.unlock()?;
    Ok(())
}
