//! Tree layout: where the root is, how deep projects may sit, and what a
//! manifest is called.
//!
//! Depth is counted in directory hops from `root` to the directory holding a
//! manifest. `root` itself is hop 0, so `depth = 0` means only the root may be
//! a project.
//!
//! Every helper here is pure path arithmetic except [`TreeLayout::has_manifest`]
//! and [`TreeLayout::enclosing_project`], which stat the filesystem.

use std::path::{Path, PathBuf};

use crate::types::ManifestFormat;

pub const DEFAULT_DEPTH: usize = 2;
pub const DEFAULT_MANIFEST: &str = "package.json";
pub const DEFAULT_IDENTITY_FIELD: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLayout {
    root: PathBuf,
    depth: usize,
    manifest: String,
    identity_field: String,
}

impl TreeLayout {
    /// Layout with the default manifest (`package.json`) and identity field (`name`).
    ///
    /// `root` is taken as-is; callers that compare against paths reported by
    /// the OS should pass a canonical path.
    pub fn new(root: impl Into<PathBuf>, depth: usize) -> Self {
        Self {
            root: root.into(),
            depth,
            manifest: DEFAULT_MANIFEST.to_string(),
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
        }
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest
    }

    pub fn identity_field(&self) -> &str {
        &self.identity_field
    }

    pub fn manifest_format(&self) -> ManifestFormat {
        ManifestFormat::for_file_name(&self.manifest)
    }

    /// `<dir>/<manifest>`, without touching the disk.
    pub fn manifest_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.manifest)
    }

    /// Number of directory hops from root to `path`; `None` outside the root.
    pub fn hops(&self, path: &Path) -> Option<usize> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|rel| rel.components().count())
    }

    /// Directory lies under root, at most `depth` hops down.
    pub fn dir_within_depth(&self, dir: &Path) -> bool {
        self.hops(dir).is_some_and(|hops| hops <= self.depth)
    }

    /// Remaining hop budget below `dir`, if `dir` is within depth.
    pub fn remaining_depth(&self, dir: &Path) -> Option<usize> {
        self.hops(dir)
            .and_then(|hops| self.depth.checked_sub(hops))
    }

    /// File name matches the configured manifest name.
    pub fn is_manifest(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == self.manifest)
    }

    /// `path` is a manifest whose directory is within depth.
    pub fn manifest_within_depth(&self, path: &Path) -> bool {
        self.is_manifest(path)
            && path.parent().is_some_and(|dir| self.dir_within_depth(dir))
    }

    /// `dir` directly contains a manifest file.
    pub fn has_manifest(&self, dir: &Path) -> bool {
        self.manifest_path(dir).is_file()
    }

    /// Nearest strict ancestor of `dir` (up to and including root) that is a
    /// project root. A directory beneath a project root is never classified
    /// on its own.
    pub fn enclosing_project(&self, dir: &Path) -> Option<PathBuf> {
        if !dir.starts_with(&self.root) {
            return None;
        }
        dir.ancestors()
            .skip(1)
            .take_while(|ancestor| ancestor.starts_with(&self.root))
            .find(|ancestor| self.has_manifest(ancestor))
            .map(Path::to_path_buf)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
