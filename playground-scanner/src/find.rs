//! Bounded directory enumeration over `walkdir`.
//!
//! Errors reading the root are fatal. Errors below the root (a directory
//! removed mid-walk, a permission-denied subtree) are logged and skipped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::ScanError;

#[derive(Debug, Clone)]
pub struct FindOptions {
    pub root: PathBuf,
    /// Levels below `root` to descend; `0` yields only the root.
    pub max_depth: usize,
    /// Only directories are offered to the predicate.
    pub dirs_only: bool,
    /// The root itself is never yielded.
    pub exclude_root: bool,
    /// Do not descend into a directory the predicate matched.
    pub prune_matches: bool,
}

impl FindOptions {
    pub fn dirs(root: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            root: root.into(),
            max_depth,
            dirs_only: true,
            exclude_root: false,
            prune_matches: false,
        }
    }

    pub fn excluding_root(mut self) -> Self {
        self.exclude_root = true;
        self
    }

    pub fn pruning_matches(mut self) -> Self {
        self.prune_matches = true;
        self
    }
}

/// Paths under `options.root` (within `max_depth`) accepted by `predicate`,
/// in walk order with siblings sorted by file name.
pub fn find<P>(options: &FindOptions, mut predicate: P) -> Result<Vec<PathBuf>, ScanError>
where
    P: FnMut(&DirEntry) -> bool,
{
    let mut walker = WalkDir::new(&options.root)
        .max_depth(options.max_depth)
        .sort_by_file_name()
        .into_iter();

    let mut matches = Vec::new();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(root_error(&options.root, err)),
            Err(err) => {
                tracing::debug!(error = %err, "skipping entry that vanished or is unreadable");
                continue;
            }
        };

        let is_dir = entry.file_type().is_dir();
        if options.dirs_only && !is_dir {
            continue;
        }
        if options.exclude_root && entry.depth() == 0 {
            continue;
        }
        if predicate(&entry) {
            matches.push(entry.path().to_path_buf());
            if options.prune_matches && is_dir {
                walker.skip_current_dir();
            }
        }
    }
    Ok(matches)
}

fn root_error(root: &Path, err: walkdir::Error) -> ScanError {
    match err.io_error().map(|io| io.kind()) {
        Some(ErrorKind::NotFound) => ScanError::RootNotFound {
            path: root.to_path_buf(),
        },
        _ => ScanError::Walk(err),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
