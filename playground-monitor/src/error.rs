use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced to monitor callers. Manifest-level problems never
/// appear here; they are logged and reflected only as registry absence.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("must provide 'root' when initializing the project monitor")]
    MissingRoot,

    #[error("invalid monitor configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse monitor config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scan error: {0}")]
    Scan(#[from] playground_scanner::ScanError),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("task join failure: {0}")]
    Join(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MonitorError {
    MonitorError::Io {
        path: path.into(),
        source,
    }
}
