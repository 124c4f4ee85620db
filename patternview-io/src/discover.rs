//! Pattern file discovery.
//!
//! An expression containing glob metacharacters (`[`, `*`, `?`) is
//! expanded with [`glob`]. Anything else names a directory, or a file
//! whose directory should be listed; only immediate children are
//! considered. Both modes keep regular files with a supported extension.

use crate::{Error, Result};
use log::debug;
use patternview_core::FileKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Whether `expr` should be expanded as a glob.
#[must_use]
pub fn is_glob(expr: &str) -> bool {
    expr.contains(['[', '*', '?'])
}

fn is_pattern_file(path: &Path) -> bool {
    FileKind::from_path(path).is_some() && path.is_file()
}

fn expand_glob(expr: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob::glob(expr)? {
        paths.push(entry.map_err(glob::GlobError::into_error)?);
    }
    Ok(paths)
}

/// Directory listed for a non-glob expression.
#[must_use]
pub fn listing_dir(expr: &str) -> PathBuf {
    let path = Path::new(expr);
    if path.is_dir() {
        return path.to_path_buf();
    }
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        paths.push(entry?.path());
    }
    Ok(paths)
}

/// Resolves a path or glob expression into pattern files.
///
/// The result is sorted by path; display order is established later by
/// classification.
///
/// # Errors
/// Returns [`Error::NoFilesFound`] if nothing matches, [`Error::Glob`]
/// for an invalid glob, and I/O errors if a directory cannot be read.
pub fn discover(expr: &str) -> Result<Vec<PathBuf>> {
    let candidates = if is_glob(expr) {
        expand_glob(expr)?
    } else {
        list_dir(&listing_dir(expr))?
    };

    let mut paths: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|p| is_pattern_file(p))
        .collect();
    paths.sort();
    debug!("discovered {} pattern files for {expr}", paths.len());

    if paths.is_empty() {
        return Err(Error::NoFilesFound {
            pattern: expr.to_string(),
        });
    }
    Ok(paths)
}
