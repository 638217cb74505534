//! Which directories are subscribed with the watch backend.
//!
//! The set is kept equal to: the root, plus every existing directory within
//! `depth` hops of it. Watches are non-recursive, so a change below the
//! bound never produces an event, and the set's size depends only on how
//! many directories sit within the bound.

use std::collections::{BTreeSet, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use playground_core::TreeLayout;
use playground_scanner::{find, FindOptions, ScanError};

use crate::error::{io_err, MonitorError};

/// Seam over the watch backend: subscribe or drop a single directory.
pub trait PathWatcher: Send {
    fn watch(&mut self, path: &Path) -> notify::Result<()>;
    fn unwatch(&mut self, path: &Path) -> notify::Result<()>;
}

impl PathWatcher for RecommendedWatcher {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        Watcher::watch(self, path, RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        Watcher::unwatch(self, path)
    }
}

pub struct WatchSetManager<W> {
    layout: TreeLayout,
    watcher: W,
    watched: BTreeSet<PathBuf>,
}

impl<W: PathWatcher> WatchSetManager<W> {
    pub fn new(layout: TreeLayout, watcher: W) -> Self {
        Self {
            layout,
            watcher,
            watched: BTreeSet::new(),
        }
    }

    /// Subscribe the root and every directory within depth.
    ///
    /// Failing to watch the root is fatal; a directory that cannot be
    /// watched is logged and skipped.
    pub fn establish(&mut self) -> Result<usize, MonitorError> {
        let root = self.layout.root().to_path_buf();
        match std::fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ScanError::NotADirectory { path: root }.into()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ScanError::RootNotFound { path: root }.into())
            }
            Err(err) => return Err(io_err(&root, err)),
        }
        if !self.watched.contains(&root) {
            self.watcher.watch(&root)?;
            self.watched.insert(root.clone());
        }
        self.on_directory_added(&root);
        tracing::debug!(watched = self.watched.len(), "watch set established");
        Ok(self.watched.len())
    }

    /// Walking up from `dir`, the root is reached within `depth` steps.
    pub fn reaches_root_within_depth(&self, dir: &Path) -> bool {
        dir.ancestors()
            .take(self.layout.depth() + 1)
            .any(|ancestor| ancestor == self.layout.root())
    }

    /// A directory appeared: subscribe it, and any subdirectories it already
    /// has, when within the bound. Returns the newly watched directories,
    /// parents before children.
    ///
    /// Each directory is listed only after its own watch is live, so a child
    /// created during the walk is either listed or reported as an event.
    pub fn on_directory_added(&mut self, dir: &Path) -> Vec<PathBuf> {
        if !self.reaches_root_within_depth(dir) {
            tracing::trace!(path = %dir.display(), "directory beyond depth, not watched");
            return vec![];
        }

        let mut added = Vec::new();
        let mut queue = VecDeque::from([dir.to_path_buf()]);
        while let Some(next) = queue.pop_front() {
            if !self.watched.contains(&next) {
                if let Err(err) = self.watcher.watch(&next) {
                    log_watch_failure(&next, &err);
                    continue;
                }
                tracing::debug!(path = %next.display(), "watching directory");
                self.watched.insert(next.clone());
                added.push(next.clone());
            }
            if self.layout.remaining_depth(&next).is_some_and(|left| left > 0) {
                queue.extend(subdirectories(&next));
            }
        }
        added
    }

    /// A directory went away: drop it and everything watched beneath it.
    /// Returns the unsubscribed directories.
    pub fn on_directory_removed(&mut self, dir: &Path) -> Vec<PathBuf> {
        let gone: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|watched| watched.starts_with(dir))
            .cloned()
            .collect();
        for path in &gone {
            self.watched.remove(path);
            // The backend usually drops the watch itself once the inode is gone.
            if let Err(err) = self.watcher.unwatch(path) {
                tracing::trace!(path = %path.display(), error = %err, "unwatch after removal");
            }
        }
        if !gone.is_empty() {
            tracing::debug!(path = %dir.display(), dropped = gone.len(), "unwatched removed directory");
        }
        gone
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    /// Watched directories, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    /// Release every subscription. Safe to call more than once.
    pub fn close(&mut self) {
        for path in std::mem::take(&mut self.watched) {
            if let Err(err) = self.watcher.unwatch(&path) {
                tracing::trace!(path = %path.display(), error = %err, "unwatch on close");
            }
        }
    }
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    match find(&FindOptions::dirs(dir, 1).excluding_root(), |_| true) {
        Ok(dirs) => dirs,
        Err(err) => {
            tracing::debug!(path = %dir.display(), error = %err, "directory gone before listing");
            vec![]
        }
    }
}

/// A vanished directory is routine; anything else (e.g. the inotify watch
/// limit) means events below `path` will be missed.
fn log_watch_failure(path: &Path, err: &notify::Error) {
    if is_vanished(err) {
        tracing::debug!(path = %path.display(), error = %err, "directory vanished before watch");
    } else {
        tracing::warn!(path = %path.display(), error = %err, "could not watch directory, changes below it will be missed");
    }
}

fn is_vanished(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::PathNotFound => true,
        notify::ErrorKind::Io(io) => io.kind() == ErrorKind::NotFound,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Records subscriptions instead of talking to the OS.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingWatcher {
    pub active: BTreeSet<PathBuf>,
    /// Every successful `watch`, in call order.
    pub history: Vec<PathBuf>,
    pub unwatched: Vec<PathBuf>,
    /// Paths whose `watch` fails as if the backend ran out of watches.
    pub refuse: BTreeSet<PathBuf>,
}

#[cfg(test)]
impl PathWatcher for RecordingWatcher {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        if !path.is_dir() {
            return Err(notify::Error::path_not_found().add_path(path.to_path_buf()));
        }
        if self.refuse.contains(path) {
            return Err(notify::Error::generic("no space left on device").add_path(path.to_path_buf()));
        }
        self.active.insert(path.to_path_buf());
        self.history.push(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        self.unwatched.push(path.to_path_buf());
        if self.active.remove(path) {
            Ok(())
        } else {
            Err(notify::Error::watch_not_found())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> (TempDir, WatchSetManager<RecordingWatcher>) {
        let tmp = TempDir::new().expect("tempdir");
        for dir in ["@orgA/project-01", "deep-pkg/nested-dir/deep-dir", "empty-dir"] {
            fs::create_dir_all(tmp.path().join(dir)).expect("mkdir");
        }
        let manager = WatchSetManager::new(TreeLayout::new(tmp.path(), 2), RecordingWatcher::default());
        (tmp, manager)
    }

    fn rel(root: &Path, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.strip_prefix(root).expect("under root").display().to_string())
            .collect()
    }

    #[test]
    fn establish_watches_root_and_dirs_within_depth() {
        let (tmp, mut manager) = tree();
        let count = manager.establish().expect("establish");
        assert_eq!(count, 6);
        assert_eq!(
            rel(tmp.path(), &manager.watched_paths()),
            ["", "@orgA", "@orgA/project-01", "deep-pkg", "deep-pkg/nested-dir", "empty-dir"]
        );
    }

    #[test]
    fn establish_fails_when_root_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let mut manager = WatchSetManager::new(
            TreeLayout::new(tmp.path().join("gone"), 2),
            RecordingWatcher::default(),
        );
        assert!(manager.establish().is_err());
    }

    #[test]
    fn ancestor_walk_respects_depth() {
        let (tmp, manager) = tree();
        let root = tmp.path();
        assert!(manager.reaches_root_within_depth(root));
        assert!(manager.reaches_root_within_depth(&root.join("a")));
        assert!(manager.reaches_root_within_depth(&root.join("a/b")));
        assert!(!manager.reaches_root_within_depth(&root.join("a/b/c")));
        assert!(!manager.reaches_root_within_depth(Path::new("/unrelated/a")));
    }

    #[test]
    fn added_directory_within_bound_is_watched_with_children() {
        let (tmp, mut manager) = tree();
        manager.establish().expect("establish");

        fs::create_dir_all(tmp.path().join("new-proj/src/deeper")).expect("mkdir");
        let added = manager.on_directory_added(&tmp.path().join("new-proj"));
        assert_eq!(rel(tmp.path(), &added), ["new-proj", "new-proj/src"]);
        assert!(!manager.is_watched(&tmp.path().join("new-proj/src/deeper")));
    }

    #[test]
    fn added_directory_beyond_bound_is_ignored() {
        let (tmp, mut manager) = tree();
        manager.establish().expect("establish");
        let before = manager.watched_paths();

        let beyond = tmp.path().join("deep-pkg/nested-dir/deep-dir");
        assert!(manager.on_directory_added(&beyond).is_empty());
        assert_eq!(manager.watched_paths(), before);
    }

    #[test]
    fn re_adding_watched_directory_is_noop() {
        let (tmp, mut manager) = tree();
        manager.establish().expect("establish");
        assert!(manager.on_directory_added(&tmp.path().join("empty-dir")).is_empty());
    }

    #[test]
    fn removed_directory_drops_descendants_only() {
        let (tmp, mut manager) = tree();
        manager.establish().expect("establish");

        let gone = manager.on_directory_removed(&tmp.path().join("@orgA"));
        assert_eq!(rel(tmp.path(), &gone), ["@orgA", "@orgA/project-01"]);
        assert_eq!(
            rel(tmp.path(), &manager.watched_paths()),
            ["", "deep-pkg", "deep-pkg/nested-dir", "empty-dir"]
        );
    }

    #[test]
    fn close_releases_everything_and_is_repeatable() {
        let (_tmp, mut manager) = tree();
        manager.establish().expect("establish");
        manager.close();
        assert!(manager.is_empty());
        assert!(manager.watcher.active.is_empty());
        manager.close();
        assert!(manager.is_empty());
    }

    #[test]
    fn root_that_is_a_file_fails_establish() {
        let tmp = TempDir::new().expect("tempdir");
        let file = tmp.path().join("plain.txt");
        fs::write(&file, "x").expect("write");
        let mut manager = WatchSetManager::new(TreeLayout::new(&file, 2), RecordingWatcher::default());
        let err = manager.establish().unwrap_err();
        assert!(
            matches!(err, MonitorError::Scan(ScanError::NotADirectory { .. })),
            "got: {err}"
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn parents_are_watched_before_children() {
        let (tmp, mut manager) = tree();
        manager.establish().expect("establish");
        let history = &manager.watcher.history;
        for dir in history {
            if let Some(parent) = dir.parent().filter(|p| p.starts_with(tmp.path())) {
                let child_at = history.iter().position(|p| p == dir);
                let parent_at = history.iter().position(|p| p == parent);
                assert!(parent_at < child_at, "{} watched before its parent", dir.display());
            }
        }
    }

    #[test]
    fn refused_watch_skips_subtree_but_keeps_siblings() {
        let (tmp, mut manager) = tree();
        manager.watcher.refuse.insert(tmp.path().join("@orgA"));
        manager.establish().expect("establish");
        assert!(!manager.is_watched(&tmp.path().join("@orgA")));
        assert!(!manager.is_watched(&tmp.path().join("@orgA/project-01")));
        assert!(manager.is_watched(&tmp.path().join("deep-pkg/nested-dir")));
        assert!(manager.is_watched(&tmp.path().join("empty-dir")));
    }

    #[test]
    fn only_missing_paths_count_as_vanished() {
        assert!(is_vanished(&notify::Error::path_not_found()));
        assert!(is_vanished(&notify::Error::io(std::io::Error::from(ErrorKind::NotFound))));
        assert!(!is_vanished(&notify::Error::generic("no space left on device")));
        assert!(!is_vanished(&notify::Error::io(std::io::Error::from(
            ErrorKind::PermissionDenied
        ))));
    }
}
