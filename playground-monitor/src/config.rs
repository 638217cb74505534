//! Monitor configuration.
//!
//! ```yaml
//! root: /home/me/playground   # required
//! depth: 2
//! manifest: package.json
//! identity_field: name
//! watch: true
//! settle_ms: 0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use playground_core::layout::{DEFAULT_DEPTH, DEFAULT_IDENTITY_FIELD, DEFAULT_MANIFEST};
use playground_core::TreeLayout;
use serde::{Deserialize, Serialize};

use crate::error::{io_err, MonitorError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_manifest")]
    pub manifest: String,
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
    /// Keep the registry current from filesystem events after each refresh.
    #[serde(default = "default_watch")]
    pub watch: bool,
    /// Pause after a refresh before returning.
    #[serde(default)]
    pub settle_ms: u64,
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_manifest() -> String {
    DEFAULT_MANIFEST.to_string()
}

fn default_identity_field() -> String {
    DEFAULT_IDENTITY_FIELD.to_string()
}

fn default_watch() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            root: None,
            depth: default_depth(),
            manifest: default_manifest(),
            identity_field: default_identity_field(),
            watch: default_watch(),
            settle_ms: 0,
        }
    }
}

impl MonitorConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load from a YAML file; parse errors carry the file path.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Self::from_yaml_str(&contents).map_err(|source| MonitorError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Check the configuration and return the configured root.
    pub fn validate(&self) -> Result<&Path, MonitorError> {
        let root = self.root.as_deref().ok_or(MonitorError::MissingRoot)?;
        if root.as_os_str().is_empty() {
            return Err(MonitorError::MissingRoot);
        }
        let bare_name = Path::new(&self.manifest)
            .file_name()
            .is_some_and(|name| name == self.manifest.as_str());
        if !bare_name {
            return Err(MonitorError::InvalidConfig(format!(
                "manifest must be a plain file name, got '{}'",
                self.manifest
            )));
        }
        if self.identity_field.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "identity_field must not be empty".to_string(),
            ));
        }
        Ok(root)
    }

    /// Layout anchored at an already-resolved root.
    pub(crate) fn layout_at(&self, root: PathBuf) -> TreeLayout {
        TreeLayout::new(root, self.depth)
            .with_manifest(self.manifest.clone())
            .with_identity_field(self.identity_field.clone())
    }
}
