use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use log::debug;
use tempfile::{Builder, TempDir};
use crate::config::defs::{PipelineError, SEQ_EXTS};


/// Checks the first two bytes of a file for the gzip magic number.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}


/// Strips known sequence-file extensions from the end of a path.
///
/// # Arguments
///
/// * `path` - e.g. `run1/sample_F3.csfasta` or `reads.fastq.gz`
///
/// # Returns
/// Tuple of the stripped path and the removed extensions in order, e.g.
/// (`reads`, [`fastq`, `gz`]).
///
pub fn extension_remover(path: &Path) -> (PathBuf, Vec<String>) {
    let mut stem = path.to_path_buf();
    let mut extensions = Vec::new();

    while let Some(ext) = stem.extension().and_then(|e| e.to_str()).map(|e| e.to_string()) {
        if !SEQ_EXTS.iter().any(|&e| e.eq_ignore_ascii_case(&ext)) {
            break;
        }
        extensions.insert(0, ext);
        stem.set_extension("");
    }

    (stem, extensions)
}


/// Bare file name of a path with sequence extensions removed.
pub fn base_name(path: &Path) -> String {
    let (stem, _) = extension_remover(path);
    stem.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}


/// Builds a new file path from a template path.
///
/// # Arguments
///
/// * `path` - Template path. Relative paths are resolved against `dir`.
/// * `dir` - Optional directory to place the result in.
/// * `prefix` - Optional string added in front of the file name.
/// * `suffix` - Optional string appended to the extension-stripped file name.
/// * `delimiter` - Joins prefix/suffix to the file name.
///
/// # Returns
/// PathBuf of the manipulated path.
///
pub fn file_path_manipulator(
    path: &Path,
    dir: Option<&Path>,
    prefix: Option<&str>,
    suffix: Option<&str>,
    delimiter: &str,
) -> PathBuf {
    let parent = match dir {
        Some(d) if path.is_relative() => {
            match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => d.join(p),
                _ => d.to_path_buf(),
            }
        }
        _ => path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    if prefix.is_none() && suffix.is_none() {
        return match path.file_name() {
            Some(name) => parent.join(name),
            None => parent,
        };
    }

    let mut name = base_name(path);
    if let Some(p) = prefix {
        name = format!("{}{}{}", p, delimiter, name);
    }
    if let Some(s) = suffix {
        name = format!("{}{}{}", name, delimiter, s);
    }
    parent.join(name)
}


/// Resolves an input argument and checks that it exists as a file.
pub fn require_file(arg: Option<&String>, cwd: &Path, what: &str) -> Result<PathBuf, PipelineError> {
    let raw = arg.ok_or_else(|| PipelineError::MissingInput(format!("{} not given", what)))?;
    let path = file_path_manipulator(Path::new(raw), Some(cwd), None, None, "");
    if !path.is_file() {
        return Err(PipelineError::MissingInput(format!("{} not found: {}", what, path.display())));
    }
    Ok(path)
}


/// Moves a file, falling back to copy-and-delete across filesystems.
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
    }
}


/// Creates a scratch directory inside `parent`, removed when dropped.
/// Outputs are built here and only moved into place once complete, so a
/// crashed step never leaves partial files in the final location.
pub fn scratch_dir(parent: &Path, prefix: &str) -> io::Result<TempDir> {
    fs::create_dir_all(parent)?;
    let dir = Builder::new().prefix(prefix).tempdir_in(parent)?;
    debug!("Created scratch dir {}", dir.path().display());
    Ok(dir)
}
