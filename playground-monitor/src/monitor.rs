use std::cmp::Ordering;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use notify::{recommended_watcher, Event, RecommendedWatcher};
use playground_core::{ProjectName, ProjectRecord, Registry, TreeLayout};
use playground_scanner::{scan, ScanError};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::error::{io_err, MonitorError};
use crate::events::translate;
use crate::reconciler::ChangeReconciler;
use crate::watch_set::WatchSetManager;

type SharedWatchSet = Arc<Mutex<WatchSetManager<RecommendedWatcher>>>;

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub root: PathBuf,
    /// Registered identities after collisions collapsed.
    pub projects: usize,
    /// Manifests found but not loadable.
    pub skipped: usize,
    /// Directories under watch; `0` when watching is off.
    pub watched: usize,
    pub duration_ms: u128,
}

/// Owns one registry and at most one live watch session over it.
///
/// Lifecycle: `new` → `refresh` (repeatable) → `close`. Reads never block on
/// a scan for longer than the registry swap.
pub struct ProjectMonitor {
    config: MonitorConfig,
    registry: Arc<RwLock<Registry>>,
    session: Mutex<Option<WatchSession>>,
}

impl ProjectMonitor {
    /// Validate `config`; no filesystem access happens until [`refresh`](Self::refresh).
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Arc::new(RwLock::new(Registry::new())),
            session: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Rescan the tree and replace the registry, then (re)establish watching
    /// when configured. Returns once watching is live.
    ///
    /// Any active session is stopped first, so no queued event can land on
    /// the new snapshot. Events raised while the scan runs are buffered and
    /// applied on top of it. If the root is missing or unreadable, or the
    /// watch cannot be set up, the call fails, the previous snapshot is kept,
    /// and watching stays off.
    pub async fn refresh(&self) -> Result<RefreshSummary, MonitorError> {
        let started = Instant::now();
        let mut session = self.session.lock().await;
        if let Some(active) = session.take() {
            if let Err(err) = active.stop().await {
                tracing::warn!(error = %err, "previous watch session ended with error");
            }
        }

        let root = self.resolve_root().await?;
        let layout = self.config.layout_at(root.clone());

        // Watches go in before the scan: anything created after this point
        // either shows up in the scan or queues an event, so nothing falls
        // between the two.
        let pending = if self.config.watch {
            Some(PendingSession::establish(layout.clone()).await?)
        } else {
            None
        };

        let report = scan(&layout).await?;
        let skipped = report.skipped.len();
        let fresh = report.into_registry();
        let projects = fresh.len();
        *self.registry.write().await = fresh;

        let watched = match pending {
            Some(pending) => {
                let watched = pending.watched();
                *session = Some(pending.spawn(self.registry.clone()));
                watched
            }
            None => 0,
        };
        drop(session);

        if self.config.settle_ms > 0 {
            tokio::time::sleep(self.config.settle()).await;
        }

        let summary = RefreshSummary {
            root,
            projects,
            skipped,
            watched,
            duration_ms: started.elapsed().as_millis(),
        };
        tracing::info!(
            root = %summary.root.display(),
            projects = summary.projects,
            skipped = summary.skipped,
            watched = summary.watched,
            duration_ms = summary.duration_ms,
            "refresh complete",
        );
        Ok(summary)
    }

    /// Registered identities in lexical order.
    pub async fn list_projects(&self) -> Vec<ProjectName> {
        self.registry.read().await.list_identities()
    }

    pub async fn list_projects_by<F>(&self, compare: F) -> Vec<ProjectName>
    where
        F: FnMut(&ProjectName, &ProjectName) -> Ordering,
    {
        self.registry.read().await.list_identities_by(compare)
    }

    /// Copy of the record registered under `name`.
    pub async fn get_project_data(&self, name: &str) -> Option<ProjectRecord> {
        self.registry.read().await.get(name)
    }

    /// Copies of every record, sorted by identity.
    pub async fn projects(&self) -> Vec<ProjectRecord> {
        self.registry.read().await.records()
    }

    /// Directories currently watched, sorted. Empty when not watching.
    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(active) => active.watch_set.lock().await.watched_paths(),
            None => vec![],
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(WatchSession::is_running)
    }

    /// Stop watching and release every subscription. The registry keeps its
    /// last contents. Calling this again is a no-op.
    pub async fn close(&self) {
        let Some(active) = self.session.lock().await.take() else {
            return;
        };
        match active.stop().await {
            Ok(()) => tracing::debug!("watch session closed"),
            Err(err) => tracing::warn!(error = %err, "watch session ended with error"),
        }
    }

    async fn resolve_root(&self) -> Result<PathBuf, MonitorError> {
        let root = self.config.validate()?.to_path_buf();
        // Watch events carry real paths (e.g. /private/var/... on macOS).
        tokio::fs::canonicalize(&root).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                MonitorError::Scan(ScanError::RootNotFound { path: root.clone() })
            } else {
                io_err(&root, err)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Watch session
// ---------------------------------------------------------------------------

/// Watches installed and buffering events, with nothing draining them yet.
struct PendingSession {
    watch_set: WatchSetManager<RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl PendingSession {
    async fn establish(layout: TreeLayout) -> Result<Self, MonitorError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;

        let mut watch_set = WatchSetManager::new(layout, watcher);
        let watch_set = tokio::task::spawn_blocking(move || {
            watch_set.establish()?;
            Ok::<_, MonitorError>(watch_set)
        })
        .await
        .map_err(|err| MonitorError::Join(format!("watch setup: {err}")))??;

        Ok(Self { watch_set, event_rx })
    }

    fn watched(&self) -> usize {
        self.watch_set.len()
    }

    /// Start draining buffered and future events into `registry`.
    fn spawn(self, registry: Arc<RwLock<Registry>>) -> WatchSession {
        let reconciler = ChangeReconciler::new(self.watch_set.layout().clone());
        let watch_set = Arc::new(Mutex::new(self.watch_set));
        let (shutdown, _) = broadcast::channel::<()>(1);
        let handle = tokio::spawn(reconcile_task(
            reconciler,
            registry,
            watch_set.clone(),
            self.event_rx,
            shutdown.subscribe(),
        ));
        WatchSession {
            shutdown,
            watch_set,
            handle: Some(handle),
        }
    }
}

/// One notify watcher plus the task draining its events, for one refresh.
struct WatchSession {
    shutdown: broadcast::Sender<()>,
    watch_set: SharedWatchSet,
    handle: Option<JoinHandle<Result<(), MonitorError>>>,
}

impl WatchSession {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the task, wait for it to drain, and surface how it ended.
    async fn stop(mut self) -> Result<(), MonitorError> {
        let _ = self.shutdown.send(());
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let result = handle_join("reconciler", handle.await);
        self.watch_set.lock().await.close();
        result
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn reconcile_task(
    reconciler: ChangeReconciler,
    registry: Arc<RwLock<Registry>>,
    watch_set: SharedWatchSet,
    mut event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), MonitorError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else {
                    return Err(MonitorError::ChannelClosed("watch events"));
                };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };

                let mut watch_set = watch_set.lock().await;
                let changes = {
                    let registry = registry.read().await;
                    translate(&event, |path| {
                        watch_set.is_watched(path) || registry.contains_path(path)
                    })
                };
                // One event at a time, in delivery order.
                for change in changes {
                    let outcomes = reconciler.apply(change, &registry, &mut *watch_set).await;
                    tracing::trace!(?outcomes, "event applied");
                }
            }
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), MonitorError>, tokio::task::JoinError>,
) -> Result<(), MonitorError> {
    match result {
        Ok(inner) => inner,
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => Err(MonitorError::Join(format!("{task}: {err}"))),
    }
}
