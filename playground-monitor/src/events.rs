//! Translation of raw notify events into the five changes the reconciler
//! understands.

use std::path::{Path, PathBuf};

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// A file appeared.
    Added(PathBuf),
    /// A file's content changed.
    Changed(PathBuf),
    /// A file went away.
    Removed(PathBuf),
    DirectoryAdded(PathBuf),
    DirectoryRemoved(PathBuf),
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Added(path)
            | FsEvent::Changed(path)
            | FsEvent::Removed(path)
            | FsEvent::DirectoryAdded(path)
            | FsEvent::DirectoryRemoved(path) => path,
        }
    }
}

/// Map one notify event to zero or more [`FsEvent`]s, in path order.
///
/// A removed path cannot be stat'ed, so when the backend does not say
/// whether it was a file or a directory, `known_dir` decides (typically:
/// the path is in the watch set or anchors a registered project).
pub fn translate<F>(event: &Event, mut known_dir: F) -> Vec<FsEvent>
where
    F: FnMut(&Path) -> bool,
{
    let paths = &event.paths;
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => paths
            .iter()
            .map(|p| FsEvent::DirectoryAdded(p.clone()))
            .collect(),
        EventKind::Create(CreateKind::File) => {
            paths.iter().map(|p| FsEvent::Added(p.clone())).collect()
        }
        EventKind::Create(_) => paths.iter().map(|p| appeared(p)).collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().map(|p| vanished(p, &mut known_dir)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().map(|p| appeared(p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to] => vec![vanished(from, &mut known_dir), appeared(to)],
            _ => vec![],
        },
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|p| {
                if p.exists() {
                    appeared(p)
                } else {
                    vanished(p, &mut known_dir)
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => vec![],
        EventKind::Modify(_) | EventKind::Access(AccessKind::Close(AccessMode::Write)) => paths
            .iter()
            .filter(|p| !p.is_dir())
            .map(|p| FsEvent::Changed(p.clone()))
            .collect(),

        EventKind::Remove(RemoveKind::Folder) => paths
            .iter()
            .map(|p| FsEvent::DirectoryRemoved(p.clone()))
            .collect(),
        EventKind::Remove(_) => paths.iter().map(|p| vanished(p, &mut known_dir)).collect(),

        _ => vec![],
    }
}

fn appeared(path: &Path) -> FsEvent {
    if path.is_dir() {
        FsEvent::DirectoryAdded(path.to_path_buf())
    } else {
        FsEvent::Added(path.to_path_buf())
    }
}

fn vanished<F>(path: &Path, known_dir: &mut F) -> FsEvent
where
    F: FnMut(&Path) -> bool,
{
    if known_dir(path) {
        FsEvent::DirectoryRemoved(path.to_path_buf())
    } else {
        FsEvent::Removed(path.to_path_buf())
    }
}
