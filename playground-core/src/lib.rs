//! Playground core library: domain types, tree layout, manifest loading,
//! in-memory registry.
//!
//! - [`types`]: newtypes and records
//! - [`layout`]: root/depth/manifest naming and hop arithmetic
//! - [`manifest`]: read + parse one manifest
//! - [`registry`]: the identity → record map
//! - [`error`]: [`ManifestError`]

pub mod error;
pub mod layout;
pub mod manifest;
pub mod registry;
pub mod types;

pub use error::ManifestError;
pub use layout::TreeLayout;
pub use manifest::{load_manifest, parse_manifest};
pub use registry::Registry;
pub use types::{ManifestFormat, ProjectName, ProjectRecord};
