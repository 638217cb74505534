//! Manifest loading: read bytes, parse as key-value data, extract identity.
//!
//! Nothing beyond the identity field is validated.

use std::path::Path;

use serde_json::Value;

use crate::error::ManifestError;
use crate::layout::TreeLayout;
use crate::types::{ManifestFormat, ProjectName, ProjectRecord};

/// Read and parse the manifest at `path` into a record anchored at its
/// parent directory.
pub fn load_manifest(path: &Path, layout: &TreeLayout) -> Result<ProjectRecord, ManifestError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (name, manifest) =
        parse_manifest(path, &contents, layout.manifest_format(), layout.identity_field())?;
    let project_path = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| layout.root().to_path_buf());
    Ok(ProjectRecord {
        name,
        manifest,
        project_path,
    })
}

/// Parse manifest text. `path` is only used for error context.
pub fn parse_manifest(
    path: &Path,
    contents: &str,
    format: ManifestFormat,
    identity_field: &str,
) -> Result<(ProjectName, Value), ManifestError> {
    let value: Value = match format {
        ManifestFormat::Json => {
            serde_json::from_str(contents).map_err(|source| ManifestError::Json {
                path: path.to_path_buf(),
                source,
            })?
        }
        ManifestFormat::Yaml => {
            serde_yaml::from_str(contents).map_err(|source| ManifestError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        }
    };

    let Value::Object(map) = &value else {
        return Err(ManifestError::NotAnObject {
            path: path.to_path_buf(),
        });
    };

    let name = map
        .get(identity_field)
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(ProjectName::from)
        .ok_or_else(|| ManifestError::MissingIdentity {
            path: path.to_path_buf(),
            field: identity_field.to_string(),
        })?;

    Ok((name, value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
