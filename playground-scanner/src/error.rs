use std::path::PathBuf;

use thiserror::Error;

/// Fatal scan failures. Anything below the root (a vanished subdirectory,
/// an unreadable manifest) is soft and never reaches this type.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan root does not exist: {path}")]
    RootNotFound { path: PathBuf },

    #[error("scan root is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("scan task join failure: {0}")]
    Join(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ScanError {
    let path = path.into();
    if source.kind() == std::io::ErrorKind::NotFound {
        return ScanError::RootNotFound { path };
    }
    ScanError::Io { path, source }
}
