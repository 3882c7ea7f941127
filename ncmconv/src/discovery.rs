//! Locating NCM files on disk.

use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::error::{NcmError, Result};

pub const NCM_EXTENSION: &str = "ncm";

/// Reported each time the scan enters a directory.
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress<'a> {
    pub current_dir: &'a Path,
    /// Share of directories entered so far, in `(0, 1]`.
    pub fraction: f64,
}

/// Whether `path` carries the `.ncm` extension, ignoring case.
pub fn is_ncm_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(NCM_EXTENSION))
}

/// Collect NCM files under `root`, sorted by path.
///
/// Only `root` itself is listed unless `recursive` is set. Directories are
/// counted up front so progress can be reported as a fraction. Unreadable
/// entries below `root` are logged and skipped.
pub fn scan(
    root: &Path,
    recursive: bool,
    mut on_progress: impl FnMut(ScanProgress<'_>),
) -> Result<Vec<PathBuf>> {
    if !std::fs::metadata(root)?.is_dir() {
        return Err(NcmError::Io(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} is not a directory", root.display()),
        )));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = || {
        WalkDir::new(root)
            .max_depth(max_depth)
            .sort_by_file_name()
    };
    let is_walked_dir = |entry: &DirEntry| entry.file_type().is_dir() && entry.depth() < max_depth;

    let total_dirs = walker()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(is_walked_dir)
        .count()
        .max(1);

    let mut scanned = 0usize;
    let mut found = Vec::new();
    for entry in walker() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if is_walked_dir(&entry) {
            scanned += 1;
            #[allow(clippy::cast_precision_loss)]
            let fraction = (scanned as f64 / total_dirs as f64).min(1.0);
            on_progress(ScanProgress {
                current_dir: entry.path(),
                fraction,
            });
        } else if !entry.file_type().is_dir() && is_ncm_path(entry.path()) {
            found.push(entry.into_path());
        }
    }

    found.sort();
    Ok(found)
}
