//! Error types for playground-core.

use std::path::PathBuf;

use thiserror::Error;

/// Why a single manifest could not be turned into a project record.
///
/// Every variant is recoverable from the caller's point of view: a manifest
/// observed mid-write, truncated, or deleted between enumeration and read
/// surfaces here and is logged and skipped by the scanner and the reconciler.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Read failure (vanished file, permission denied, etc.).
    #[error("I/O error reading manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content is not valid JSON.
    #[error("failed to parse manifest {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Content is not valid YAML.
    #[error("failed to parse manifest {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Parsed, but the top level is not a key-value mapping.
    #[error("manifest {path} is not a key-value document")]
    NotAnObject { path: PathBuf },

    /// The identity field is absent, empty, or not a string.
    #[error("manifest {path} has no string '{field}' field")]
    MissingIdentity { path: PathBuf, field: String },
}

impl ManifestError {
    /// Path of the manifest this error concerns.
    pub fn path(&self) -> &PathBuf {
        match self {
            ManifestError::Io { path, .. }
            | ManifestError::Json { path, .. }
            | ManifestError::Yaml { path, .. }
            | ManifestError::NotAnObject { path }
            | ManifestError::MissingIdentity { path, .. } => path,
        }
    }

    /// `true` when the manifest file no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ManifestError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
