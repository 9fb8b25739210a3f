//! Locating per-sample input datasets in a run directory.
//!
//! A dataset is the set of files one QC job needs, in the order they are
//! passed to the QC script: `[csfasta, qual]` for SOLiD fragment data,
//! `[f3_csfasta, f3_qual, f5_csfasta, f5_qual]` for SOLiD paired-end data, or
//! a single FASTQ.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;
use crate::cli::InputType;
use crate::config::defs::{CSFASTA_EXT, FASTQ_EXTS, GZIP_EXT, QUAL_EXT};
use crate::utils::file::base_name;

const F3_TAG: &str = "_F3";
const F5_TAGS: &[&str] = &["_F5-BC", "_F5-P2"];


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

impl Dataset {
    pub fn primary(&self) -> &Path {
        &self.files[0]
    }

    /// Script arguments: file names relative to the dataset directory.
    pub fn script_args(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| {
                f.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| f.to_string_lossy().into_owned())
            })
            .collect()
    }
}


/// Lists non-hidden regular files directly inside `dir`, sorted by name.
/// Symlinks count when they resolve to a regular file.
fn list_files(dir: &Path) -> Result<BTreeSet<String>> {
    if !dir.is_dir() {
        return Err(anyhow!("Not a directory: {}", dir.display()));
    }
    let mut names = BTreeSet::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let is_file = if entry.path_is_symlink() {
            entry.path().is_file()
        } else {
            entry.file_type().is_file()
        };
        if !is_file {
            if entry.path_is_symlink() && !entry.path().exists() {
                warn!("Skipping broken symlink {}", entry.path().display());
            }
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.insert(name);
    }
    Ok(names)
}

fn csfasta_root(name: &str) -> Option<&str> {
    name.strip_suffix(&format!(".{}", CSFASTA_EXT))
}

/// Finds the qual file partnering a csfasta root among `names`.
fn matching_qual(root: &str, names: &BTreeSet<String>) -> Option<String> {
    let mut candidates = vec![
        format!("{}_QV.{}", root, QUAL_EXT),
        format!("{}.{}", root, QUAL_EXT),
    ];
    if let Some(stripped) = root.strip_suffix(F3_TAG) {
        candidates.push(format!("{}_QV{}.{}", stripped, F3_TAG, QUAL_EXT));
    }
    candidates.into_iter().find(|c| names.contains(c))
}

fn is_f5(name: &str) -> bool {
    F5_TAGS.iter().any(|t| name.contains(t))
}


/// SOLiD fragment datasets: each csfasta with a matching qual.
pub fn solid_datasets(dir: &Path) -> Result<Vec<Dataset>> {
    let names = list_files(dir)?;
    let mut datasets = Vec::new();
    for name in &names {
        let Some(root) = csfasta_root(name) else { continue };
        match matching_qual(root, &names) {
            Some(qual) => datasets.push(Dataset {
                name: root.to_string(),
                dir: dir.to_path_buf(),
                files: vec![dir.join(name), dir.join(qual)],
            }),
            None => warn!("No qual file found for {}, skipping", dir.join(name).display()),
        }
    }
    Ok(datasets)
}


/// SOLiD paired-end datasets: F3 csfasta/qual plus the F5 partner found by
/// substituting the F3 tag with one of the F5 tags.
pub fn solid_paired_end_datasets(dir: &Path) -> Result<Vec<Dataset>> {
    let names = list_files(dir)?;
    let mut datasets = Vec::new();
    for name in &names {
        let Some(root) = csfasta_root(name) else { continue };
        if is_f5(root) {
            continue;
        }
        if !root.contains(F3_TAG) {
            debug!("{} is not an F3 file, skipping", name);
            continue;
        }
        let Some(f3_qual) = matching_qual(root, &names) else {
            warn!("No qual file found for {}, skipping", dir.join(name).display());
            continue;
        };

        let partner = F5_TAGS.iter().find_map(|tag| {
            let f5_root = root.replacen(F3_TAG, tag, 1);
            let f5_csfasta = format!("{}.{}", f5_root, CSFASTA_EXT);
            if !names.contains(&f5_csfasta) {
                return None;
            }
            let f5_qual = matching_qual(&f5_root, &names)?;
            Some((f5_csfasta, f5_qual))
        });

        match partner {
            Some((f5_csfasta, f5_qual)) => datasets.push(Dataset {
                name: root.replacen(F3_TAG, "_paired", 1),
                dir: dir.to_path_buf(),
                files: vec![dir.join(name), dir.join(f3_qual), dir.join(f5_csfasta), dir.join(f5_qual)],
            }),
            None => warn!("No F5 partner found for {}, skipping", dir.join(name).display()),
        }
    }
    Ok(datasets)
}


fn is_fastq(name: &str) -> bool {
    FASTQ_EXTS.iter().any(|e| name.ends_with(&format!(".{}", e)))
}

fn is_fastq_gz(name: &str) -> bool {
    FASTQ_EXTS.iter().any(|e| name.ends_with(&format!(".{}.{}", e, GZIP_EXT)))
}

fn single_file_datasets(dir: &Path, keep: fn(&str) -> bool) -> Result<Vec<Dataset>> {
    let names = list_files(dir)?;
    Ok(names
        .iter()
        .filter(|n| keep(n))
        .map(|n| {
            let path = dir.join(n);
            Dataset { name: base_name(&path), dir: dir.to_path_buf(), files: vec![path] }
        })
        .collect())
}

pub fn fastq_datasets(dir: &Path) -> Result<Vec<Dataset>> {
    single_file_datasets(dir, is_fastq)
}

pub fn fastq_gz_datasets(dir: &Path) -> Result<Vec<Dataset>> {
    single_file_datasets(dir, is_fastq_gz)
}


/// Finds the datasets of the requested type in `dir`.
///
/// # Arguments
///
/// * `dir` - Directory to search (not recursive).
/// * `input_type` - Which file layout to look for.
/// * `pattern` - Optional filter applied to the primary file name.
///
/// # Returns
/// Datasets sorted by primary file name.
///
pub fn discover_datasets(dir: &Path, input_type: InputType, pattern: Option<&Regex>) -> Result<Vec<Dataset>> {
    let datasets = match input_type {
        InputType::Solid => solid_datasets(dir)?,
        InputType::SolidPairedEnd => solid_paired_end_datasets(dir)?,
        InputType::Fastq => fastq_datasets(dir)?,
        InputType::FastqGz => fastq_gz_datasets(dir)?,
    };

    Ok(match pattern {
        Some(re) => datasets
            .into_iter()
            .filter(|d| {
                let name = d.primary().file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                re.is_match(&name)
            })
            .collect(),
        None => datasets,
    })
}
