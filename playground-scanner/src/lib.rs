//! Depth-bounded project discovery for `playground-scanner`.
//!
//! `scan(layout)` walks the tree under `layout.root()` and loads every
//! project root it finds. A directory that directly contains a manifest is a
//! project root and is not descended into; any other directory is a
//! container whose subdirectories are classified the same way, until the
//! depth budget runs out. The root is classified like any other directory,
//! so a tree whose root holds a manifest is a single project.
//!
//! Immediate subtrees of the root are scanned concurrently (one blocking task
//! each) and joined before anything is merged; results are merged in
//! file-name order so repeated scans of an unchanged tree agree.

pub mod error;
pub mod find;

use std::path::{Path, PathBuf};

use playground_core::{load_manifest, ProjectRecord, Registry, TreeLayout};
use tokio::task::JoinSet;

pub use error::ScanError;
pub use find::{find, FindOptions};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A manifest that was found but could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedManifest {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything one scan produced.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Loaded records, in merge order (later entries win on identity collision).
    pub records: Vec<ProjectRecord>,
    pub skipped: Vec<SkippedManifest>,
}

impl ScanReport {
    /// Fresh registry populated from this report.
    pub fn into_registry(self) -> Registry {
        Registry::from_records(self.records)
    }

    fn merge(&mut self, other: ScanReport) {
        self.records.extend(other.records);
        self.skipped.extend(other.skipped);
    }

    fn absorb(&mut self, manifest: &Path, layout: &TreeLayout) {
        match load_manifest(manifest, layout) {
            Ok(record) => {
                tracing::debug!(
                    project = %record.name,
                    path = %record.project_path.display(),
                    "loaded manifest",
                );
                self.records.push(record);
            }
            Err(err) => {
                tracing::warn!(path = %manifest.display(), error = %err, "skipping manifest");
                self.skipped.push(SkippedManifest {
                    path: manifest.to_path_buf(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Scan the whole tree described by `layout`.
///
/// Fails only when the root is missing, not a directory, or unreadable.
pub async fn scan(layout: &TreeLayout) -> Result<ScanReport, ScanError> {
    let root_class = {
        let layout = layout.clone();
        tokio::task::spawn_blocking(move || classify_root(&layout))
            .await
            .map_err(|err| ScanError::Join(err.to_string()))??
    };

    let children = match root_class {
        RootClass::Project(report) => return Ok(report),
        RootClass::Container(children) => children,
    };

    let mut tasks = JoinSet::new();
    for (index, child) in children.into_iter().enumerate() {
        let layout = layout.clone();
        tasks.spawn_blocking(move || (index, scan_subtree(&layout, &child)));
    }

    let mut settled = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        settled.push(joined.map_err(|err| ScanError::Join(err.to_string()))?);
    }
    settled.sort_by_key(|(index, _)| *index);

    let mut report = ScanReport::default();
    for (_, subtree) in settled {
        report.merge(subtree);
    }
    tracing::debug!(
        root = %layout.root().display(),
        projects = report.records.len(),
        skipped = report.skipped.len(),
        "scan complete",
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

enum RootClass {
    Project(ScanReport),
    Container(Vec<PathBuf>),
}

fn classify_root(layout: &TreeLayout) -> Result<RootClass, ScanError> {
    let root = layout.root();
    let meta = std::fs::metadata(root).map_err(|e| error::io_err(root, e))?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    if layout.has_manifest(root) {
        let mut report = ScanReport::default();
        report.absorb(&layout.manifest_path(root), layout);
        return Ok(RootClass::Project(report));
    }

    if layout.depth() == 0 {
        return Ok(RootClass::Container(vec![]));
    }
    let children = find(&FindOptions::dirs(root, 1).excluding_root(), |_| true)?;
    Ok(RootClass::Container(children))
}

fn scan_subtree(layout: &TreeLayout, dir: &Path) -> ScanReport {
    let mut report = ScanReport::default();
    let Some(budget) = layout.remaining_depth(dir) else {
        return report;
    };

    let options = FindOptions::dirs(dir, budget).pruning_matches();
    let project_dirs = match find(&options, |entry| layout.has_manifest(entry.path())) {
        Ok(dirs) => dirs,
        Err(err) => {
            // Subtree removed between enumeration and walk.
            tracing::debug!(path = %dir.display(), error = %err, "subtree vanished during scan");
            return report;
        }
    };

    for project_dir in project_dirs {
        report.absorb(&layout.manifest_path(&project_dir), layout);
    }
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
