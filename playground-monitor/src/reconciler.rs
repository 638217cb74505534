//! Applies one filesystem change to the registry and the watch set.
//!
//! Every outcome is soft: an unreadable manifest leaves the registry as it
//! was, a path outside the depth bound is ignored, and a change that races
//! with a later one is settled by stat'ing the disk at apply time.

use std::path::{Path, PathBuf};

use playground_core::{load_manifest, ManifestError, ProjectName, ProjectRecord, Registry, TreeLayout};
use playground_scanner::{find, FindOptions};
use tokio::sync::RwLock;

use crate::events::FsEvent;
use crate::watch_set::{PathWatcher, WatchSetManager};

/// What applying an event did. An event may produce several outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Upserted(ProjectName),
    Evicted(ProjectName),
    WatchAdded(Vec<PathBuf>),
    WatchRemoved(Vec<PathBuf>),
    SoftFailure { path: PathBuf, reason: String },
    Ignored,
}

enum Load {
    Loaded(ProjectRecord),
    /// The manifest sits beneath another project root.
    Nested,
    Failed(ManifestError),
}

#[derive(Debug, Clone)]
pub struct ChangeReconciler {
    layout: TreeLayout,
}

impl ChangeReconciler {
    pub fn new(layout: TreeLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    pub async fn apply<W: PathWatcher>(
        &self,
        event: FsEvent,
        registry: &RwLock<Registry>,
        watch_set: &mut WatchSetManager<W>,
    ) -> Vec<Reconciled> {
        tracing::trace!(?event, "reconciling");
        let outcomes = match event {
            FsEvent::Added(path) | FsEvent::Changed(path) => {
                self.manifest_written(&path, registry).await
            }
            FsEvent::Removed(path) => self.manifest_removed(&path, registry).await,
            FsEvent::DirectoryAdded(dir) => self.directory_added(&dir, registry, watch_set).await,
            FsEvent::DirectoryRemoved(dir) => {
                self.directory_removed(&dir, registry, watch_set).await
            }
        };
        if outcomes.is_empty() {
            vec![Reconciled::Ignored]
        } else {
            outcomes
        }
    }

    // -----------------------------------------------------------------------
    // Manifest files
    // -----------------------------------------------------------------------

    async fn manifest_written(&self, path: &Path, registry: &RwLock<Registry>) -> Vec<Reconciled> {
        if !self.layout.manifest_within_depth(path) {
            return vec![];
        }
        let Some(dir) = path.parent().map(Path::to_path_buf) else {
            return vec![];
        };

        match self.load(path.to_path_buf()).await {
            Load::Loaded(record) => {
                let mut outcomes = Vec::new();
                let mut registry = registry.write().await;
                // The directory is now a project root; anything registered
                // beneath it is no longer a project of its own.
                let nested = registry
                    .remove_where(|r| r.project_path != dir && r.project_path.starts_with(&dir));
                for nested in nested {
                    tracing::info!(project = %nested.name, path = %nested.project_path.display(), "evicted nested project");
                    outcomes.push(Reconciled::Evicted(nested.name));
                }
                let name = record.name.clone();
                let replaced = registry.remove_where(|r| r.project_path == dir && r.name != name);
                for old in replaced {
                    tracing::info!(project = %old.name, renamed_to = %name, "identity renamed in place");
                    outcomes.push(Reconciled::Evicted(old.name));
                }
                registry.upsert(record);
                tracing::info!(project = %name, path = %dir.display(), "registered project");
                outcomes.push(Reconciled::Upserted(name));
                outcomes
            }
            Load::Nested => vec![],
            Load::Failed(err) => {
                // A half-written file is indistinguishable from a broken one;
                // the next write will bring it back.
                tracing::warn!(path = %path.display(), error = %err, "manifest unreadable, registry unchanged");
                vec![Reconciled::SoftFailure {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                }]
            }
        }
    }

    async fn manifest_removed(&self, path: &Path, registry: &RwLock<Registry>) -> Vec<Reconciled> {
        if !self.layout.manifest_within_depth(path) {
            return vec![];
        }
        if path.is_file() {
            // Replaced by rename-over or recreated before we got here.
            return self.manifest_written(path, registry).await;
        }
        let Some(dir) = path.parent() else {
            return vec![];
        };

        let mut outcomes = Vec::new();
        let evicted = registry.write().await.remove_by_path(dir);
        if let Some(evicted) = evicted {
            tracing::info!(project = %evicted.name, path = %dir.display(), "evicted project");
            outcomes.push(Reconciled::Evicted(evicted.name));
        }
        // The directory is a container again: projects beneath it surface.
        outcomes.extend(self.catch_up(dir.to_path_buf(), true, registry).await);
        outcomes
    }

    // -----------------------------------------------------------------------
    // Directories
    // -----------------------------------------------------------------------

    async fn directory_added<W: PathWatcher>(
        &self,
        dir: &Path,
        registry: &RwLock<Registry>,
        watch_set: &mut WatchSetManager<W>,
    ) -> Vec<Reconciled> {
        let mut outcomes = Vec::new();
        let added = watch_set.on_directory_added(dir);
        if !added.is_empty() {
            outcomes.push(Reconciled::WatchAdded(added));
        }
        // Manifests written before the watch existed produced no event.
        outcomes.extend(self.catch_up(dir.to_path_buf(), false, registry).await);
        outcomes
    }

    async fn directory_removed<W: PathWatcher>(
        &self,
        dir: &Path,
        registry: &RwLock<Registry>,
        watch_set: &mut WatchSetManager<W>,
    ) -> Vec<Reconciled> {
        if dir.is_dir() {
            // Renamed back, or an ambiguous removal for a path that survived.
            return self.directory_added(dir, registry, watch_set).await;
        }
        let mut outcomes = Vec::new();
        let dropped = watch_set.on_directory_removed(dir);
        if !dropped.is_empty() {
            outcomes.push(Reconciled::WatchRemoved(dropped));
        }

        let layout = &self.layout;
        let mut registry = registry.write().await;
        if let Some(evicted) = registry.remove_by_path(dir) {
            tracing::info!(project = %evicted.name, path = %dir.display(), "evicted project");
            outcomes.push(Reconciled::Evicted(evicted.name));
        }
        // A moved-away subtree reports only its top directory.
        let orphans = registry.remove_where(|r| {
            r.project_path.starts_with(dir) && !layout.has_manifest(&r.project_path)
        });
        for orphan in orphans {
            tracing::info!(project = %orphan.name, path = %orphan.project_path.display(), "evicted project");
            outcomes.push(Reconciled::Evicted(orphan.name));
        }
        outcomes
    }

    /// Register project roots found at or below `dir` that are not already
    /// registered. With `below_only`, `dir` itself is not considered.
    async fn catch_up(
        &self,
        dir: PathBuf,
        below_only: bool,
        registry: &RwLock<Registry>,
    ) -> Vec<Reconciled> {
        let Some(budget) = self.layout.remaining_depth(&dir) else {
            return vec![];
        };
        let layout = self.layout.clone();
        let found = tokio::task::spawn_blocking(move || -> Vec<PathBuf> {
            if layout.enclosing_project(&dir).is_some() {
                return vec![];
            }
            let mut options = FindOptions::dirs(&dir, budget).pruning_matches();
            if below_only {
                options = options.excluding_root();
            }
            find(&options, |entry| layout.has_manifest(entry.path())).unwrap_or_default()
        })
        .await;
        let project_dirs = match found {
            Ok(dirs) => dirs,
            Err(err) => {
                tracing::warn!(error = %err, "catch-up task failed");
                return vec![];
            }
        };

        let mut outcomes = Vec::new();
        for project_dir in project_dirs {
            if registry.read().await.contains_path(&project_dir) {
                continue;
            }
            let manifest = self.layout.manifest_path(&project_dir);
            outcomes.extend(self.manifest_written(&manifest, registry).await);
        }
        outcomes
    }

    async fn load(&self, path: PathBuf) -> Load {
        let layout = self.layout.clone();
        let manifest = path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let dir = path.parent().unwrap_or(layout.root());
            if layout.enclosing_project(dir).is_some() {
                tracing::debug!(path = %path.display(), "manifest nested in a project, ignored");
                return Load::Nested;
            }
            match load_manifest(&path, &layout) {
                Ok(record) => Load::Loaded(record),
                Err(err) => Load::Failed(err),
            }
        })
        .await;
        match joined {
            Ok(load) => load,
            Err(err) => Load::Failed(ManifestError::Io {
                path: manifest,
                source: std::io::Error::other(err.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch_set::RecordingWatcher;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        reconciler: ChangeReconciler,
        registry: RwLock<Registry>,
        watch_set: WatchSetManager<RecordingWatcher>,
    }

    impl Fixture {
        fn new(depth: usize) -> Self {
            let tmp = TempDir::new().expect("tempdir");
            let layout = TreeLayout::new(tmp.path(), depth);
            let mut watch_set = WatchSetManager::new(layout.clone(), RecordingWatcher::default());
            watch_set.establish().expect("establish");
            Self {
                reconciler: ChangeReconciler::new(layout),
                registry: RwLock::new(Registry::new()),
                watch_set,
                tmp,
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.tmp.path().join(rel)
        }

        fn write(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, content).expect("write");
            path
        }

        async fn apply(&mut self, event: FsEvent) -> Vec<Reconciled> {
            self.reconciler
                .apply(event, &self.registry, &mut self.watch_set)
                .await
        }

        async fn names(&self) -> Vec<String> {
            self.registry
                .read()
                .await
                .list_identities()
                .into_iter()
                .map(|n| n.0)
                .collect()
        }
    }

    fn name(n: &str) -> ProjectName {
        ProjectName::from(n)
    }

    // -----------------------------------------------------------------------
    // Manifest writes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn written_manifest_within_depth_is_registered() {
        let mut fx = Fixture::new(2);
        let path = fx.write("@orgA/project-01/package.json", r#"{"name":"@orgA/project-01"}"#);
        let out = fx.apply(FsEvent::Added(path)).await;
        assert_eq!(out, [Reconciled::Upserted(name("@orgA/project-01"))]);
        assert_eq!(fx.names().await, ["@orgA/project-01"]);
    }

    #[tokio::test]
    async fn manifest_beyond_depth_is_ignored() {
        let mut fx = Fixture::new(2);
        let path = fx.write("a/b/c/package.json", r#"{"name":"deep"}"#);
        let out = fx.apply(FsEvent::Added(path)).await;
        assert_eq!(out, [Reconciled::Ignored]);
        assert!(fx.names().await.is_empty());
    }

    #[tokio::test]
    async fn other_files_are_ignored() {
        let mut fx = Fixture::new(2);
        let path = fx.write("proj/README.md", "hello");
        assert_eq!(fx.apply(FsEvent::Changed(path)).await, [Reconciled::Ignored]);
    }

    #[tokio::test]
    async fn broken_rewrite_keeps_previous_record() {
        let mut fx = Fixture::new(2);
        let path = fx.write("proj/package.json", r#"{"name":"proj","v":1}"#);
        fx.apply(FsEvent::Added(path.clone())).await;

        fs::write(&path, r#"{"name":"pr"#).expect("partial write");
        let out = fx.apply(FsEvent::Changed(path)).await;
        assert!(matches!(out.as_slice(), [Reconciled::SoftFailure { .. }]), "got: {out:?}");
        let record = fx.registry.read().await.get("proj").expect("still there");
        assert_eq!(record.manifest["v"], 1);
    }

    #[tokio::test]
    async fn rename_in_place_evicts_old_identity() {
        let mut fx = Fixture::new(2);
        let path = fx.write("proj/package.json", r#"{"name":"old"}"#);
        fx.apply(FsEvent::Added(path.clone())).await;

        fs::write(&path, r#"{"name":"new"}"#).expect("rewrite");
        let out = fx.apply(FsEvent::Changed(path)).await;
        assert_eq!(out, [Reconciled::Evicted(name("old")), Reconciled::Upserted(name("new"))]);
        assert_eq!(fx.names().await, ["new"]);
    }

    #[tokio::test]
    async fn manifest_inside_project_is_ignored() {
        let mut fx = Fixture::new(3);
        let outer = fx.write("app/package.json", r#"{"name":"app"}"#);
        fx.apply(FsEvent::Added(outer)).await;
        let inner = fx.write("app/packages/package.json", r#"{"name":"inner"}"#);
        assert_eq!(fx.apply(FsEvent::Added(inner)).await, [Reconciled::Ignored]);
        assert_eq!(fx.names().await, ["app"]);
    }

    #[tokio::test]
    async fn new_outer_manifest_evicts_nested_projects() {
        let mut fx = Fixture::new(3);
        let inner = fx.write("app/packages/package.json", r#"{"name":"inner"}"#);
        fx.apply(FsEvent::Added(inner)).await;
        let outer = fx.write("app/package.json", r#"{"name":"app"}"#);
        let out = fx.apply(FsEvent::Added(outer)).await;
        assert_eq!(out, [Reconciled::Evicted(name("inner")), Reconciled::Upserted(name("app"))]);
    }

    #[tokio::test]
    async fn vanished_manifest_is_a_soft_failure() {
        let mut fx = Fixture::new(2);
        let path = fx.write("proj/package.json", r#"{"name":"proj"}"#);
        fx.apply(FsEvent::Added(path.clone())).await;
        fs::remove_file(&path).expect("rm");

        // The add is stale by the time it is applied.
        let out = fx.apply(FsEvent::Added(path.clone())).await;
        assert!(
            matches!(out.as_slice(), [Reconciled::SoftFailure { path: p, .. }] if *p == path),
            "got: {out:?}"
        );
        assert_eq!(fx.names().await, ["proj"]);
    }

    // -----------------------------------------------------------------------
    // Manifest removal
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn removed_manifest_evicts_project() {
        let mut fx = Fixture::new(2);
        let path = fx.write("proj/package.json", r#"{"name":"proj"}"#);
        fx.apply(FsEvent::Added(path.clone())).await;
        fs::remove_file(&path).expect("rm");

        let out = fx.apply(FsEvent::Removed(path)).await;
        assert_eq!(out, [Reconciled::Evicted(name("proj"))]);
        assert!(fx.names().await.is_empty());
    }

    #[tokio::test]
    async fn removal_of_recreated_manifest_reloads() {
        let mut fx = Fixture::new(2);
        let path = fx.write("proj/package.json", r#"{"name":"proj","v":1}"#);
        fx.apply(FsEvent::Added(path.clone())).await;
        fs::write(&path, r#"{"name":"proj","v":2}"#).expect("rewrite");

        let out = fx.apply(FsEvent::Removed(path)).await;
        assert_eq!(out, [Reconciled::Upserted(name("proj"))]);
        assert_eq!(fx.registry.read().await.get("proj").expect("proj").manifest["v"], 2);
    }

    #[tokio::test]
    async fn removing_outer_manifest_surfaces_nested_project() {
        let mut fx = Fixture::new(3);
        let outer = fx.write("app/package.json", r#"{"name":"app"}"#);
        fx.write("app/packages/package.json", r#"{"name":"inner"}"#);
        fx.apply(FsEvent::Added(outer.clone())).await;
        fs::remove_file(&outer).expect("rm");

        let out = fx.apply(FsEvent::Removed(outer)).await;
        assert_eq!(out, [Reconciled::Evicted(name("app")), Reconciled::Upserted(name("inner"))]);
    }

    // -----------------------------------------------------------------------
    // Directories
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn added_directory_is_watched_and_caught_up() {
        let mut fx = Fixture::new(2);
        fx.write("fresh/package.json", r#"{"name":"fresh"}"#);

        let out = fx.apply(FsEvent::DirectoryAdded(fx.path("fresh"))).await;
        assert_eq!(
            out,
            [
                Reconciled::WatchAdded(vec![fx.path("fresh")]),
                Reconciled::Upserted(name("fresh")),
            ]
        );
        assert!(fx.watch_set.is_watched(&fx.path("fresh")));
    }

    #[tokio::test]
    async fn removed_directory_evicts_and_unwatches() {
        let mut fx = Fixture::new(2);
        let path = fx.write("@orgA/project-01/package.json", r#"{"name":"p1"}"#);
        fx.apply(FsEvent::DirectoryAdded(fx.path("@orgA"))).await;
        assert_eq!(fx.names().await, ["p1"]);
        assert!(fx.watch_set.is_watched(&fx.path("@orgA/project-01")));

        fs::remove_dir_all(path.parent().expect("dir")).expect("rm -r");
        let out = fx.apply(FsEvent::DirectoryRemoved(fx.path("@orgA/project-01"))).await;
        assert_eq!(
            out,
            [
                Reconciled::WatchRemoved(vec![fx.path("@orgA/project-01")]),
                Reconciled::Evicted(name("p1")),
            ]
        );
        assert!(fx.names().await.is_empty());
    }

    #[tokio::test]
    async fn removing_container_sweeps_projects_beneath() {
        let mut fx = Fixture::new(2);
        fx.write("@orgA/one/package.json", r#"{"name":"one"}"#);
        fx.write("@orgA/two/package.json", r#"{"name":"two"}"#);
        fx.write("other/package.json", r#"{"name":"other"}"#);
        fx.apply(FsEvent::DirectoryAdded(fx.path("@orgA"))).await;
        fx.apply(FsEvent::DirectoryAdded(fx.path("other"))).await;

        fs::remove_dir_all(fx.path("@orgA")).expect("rm -r");
        let out = fx.apply(FsEvent::DirectoryRemoved(fx.path("@orgA"))).await;
        let evicted: Vec<_> = out
            .iter()
            .filter_map(|o| match o {
                Reconciled::Evicted(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(evicted, ["one", "two"]);
        assert_eq!(fx.names().await, ["other"]);
    }

    #[tokio::test]
    async fn vanished_directory_is_ignored() {
        let mut fx = Fixture::new(2);
        let out = fx.apply(FsEvent::DirectoryAdded(fx.path("ghost"))).await;
        assert_eq!(out, [Reconciled::Ignored]);
        assert!(!fx.watch_set.is_watched(&fx.path("ghost")));
        assert!(fx.names().await.is_empty());
    }

    #[tokio::test]
    async fn removal_of_unknown_directory_is_ignored() {
        let mut fx = Fixture::new(2);
        fx.write("kept/package.json", r#"{"name":"kept"}"#);
        fx.apply(FsEvent::DirectoryAdded(fx.path("kept"))).await;

        let out = fx.apply(FsEvent::DirectoryRemoved(fx.path("never-there"))).await;
        assert_eq!(out, [Reconciled::Ignored]);
        assert_eq!(fx.names().await, ["kept"]);
        assert!(fx.watch_set.is_watched(&fx.path("kept")));
    }

    #[tokio::test]
    async fn removal_of_surviving_directory_is_treated_as_add() {
        let mut fx = Fixture::new(2);
        fx.write("back/package.json", r#"{"name":"back"}"#);

        let out = fx.apply(FsEvent::DirectoryRemoved(fx.path("back"))).await;
        assert_eq!(
            out,
            [
                Reconciled::WatchAdded(vec![fx.path("back")]),
                Reconciled::Upserted(name("back")),
            ]
        );
        assert!(fx.watch_set.is_watched(&fx.path("back")));
        assert_eq!(fx.names().await, ["back"]);
    }

    #[tokio::test]
    async fn rename_in_place_keeps_other_projects() {
        let mut fx = Fixture::new(2);
        let path = fx.write("proj/package.json", r#"{"name":"old"}"#);
        let other = fx.write("other/package.json", r#"{"name":"other"}"#);
        fx.apply(FsEvent::Added(path.clone())).await;
        fx.apply(FsEvent::Added(other)).await;

        fs::write(&path, r#"{"name":"new"}"#).expect("rewrite");
        fx.apply(FsEvent::Changed(path)).await;
        assert_eq!(fx.names().await, ["new", "other"]);
    }
}
