//! In-memory project registry.
//!
//! # Ownership
//!
//! A `Registry` is owned by exactly one monitor. Reads hand out clones
//! ([`Registry::get`], [`Registry::records`]); nothing returns a reference
//! into the map, so later mutation cannot disturb a caller's copy.
//!
//! # Collisions
//!
//! Identity is the key. When two manifests declare the same identity the
//! most recently upserted record replaces the earlier one: no merge, no
//! error.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use crate::types::{ProjectName, ProjectRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    entries: HashMap<ProjectName, ProjectRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry by upserting `records` in order (later wins).
    pub fn from_records(records: impl IntoIterator<Item = ProjectRecord>) -> Self {
        let mut registry = Self::new();
        for record in records {
            registry.upsert(record);
        }
        registry
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Insert or replace the record for `record.name`.
    ///
    /// A directory holds one manifest, so any *other* identity anchored at the
    /// same `project_path` is dropped too (a package renamed in place).
    /// Returns the record previously stored under this identity.
    pub fn upsert(&mut self, record: ProjectRecord) -> Option<ProjectRecord> {
        self.entries
            .retain(|name, existing| *name == record.name || existing.project_path != record.project_path);
        self.entries.insert(record.name.clone(), record)
    }

    /// Remove the entry whose `project_path` equals `path` exactly.
    pub fn remove_by_path(&mut self, path: &Path) -> Option<ProjectRecord> {
        let name = self
            .entries
            .iter()
            .find(|(_, record)| record.project_path == path)
            .map(|(name, _)| name.clone())?;
        self.entries.remove(&name)
    }

    /// Remove every entry matching `predicate`; returns them sorted by identity.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<ProjectRecord>
    where
        F: FnMut(&ProjectRecord) -> bool,
    {
        let names: Vec<ProjectName> = self
            .entries
            .iter()
            .filter(|(_, record)| predicate(record))
            .map(|(name, _)| name.clone())
            .collect();
        let mut removed: Vec<ProjectRecord> = names
            .iter()
            .filter_map(|name| self.entries.remove(name))
            .collect();
        removed.sort_by(|a, b| a.name.cmp(&b.name));
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Copy of the record for `name`.
    pub fn get(&self, name: &str) -> Option<ProjectRecord> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Some entry is anchored exactly at `path`.
    pub fn contains_path(&self, path: &Path) -> bool {
        self.entries.values().any(|record| record.project_path == path)
    }

    /// Identities in lexical order.
    pub fn list_identities(&self) -> Vec<ProjectName> {
        self.list_identities_by(|a, b| a.cmp(b))
    }

    /// Identities sorted with a caller-supplied comparator.
    pub fn list_identities_by<F>(&self, mut compare: F) -> Vec<ProjectName>
    where
        F: FnMut(&ProjectName, &ProjectName) -> Ordering,
    {
        let mut names: Vec<ProjectName> = self.entries.keys().cloned().collect();
        names.sort_by(|a, b| compare(a, b));
        names
    }

    /// Cloned snapshot of every record, sorted by identity.
    pub fn records(&self) -> Vec<ProjectRecord> {
        let mut records: Vec<ProjectRecord> = self.entries.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
