//! Sources of raw specification documents, keyed by service identifier.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Provides the raw JSON document for a service.
///
/// `Ok(None)` means the store has no document for the identifier; `Err` is
/// reserved for I/O or access failures.
pub trait SpecStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the backing storage cannot be read.
    fn fetch(&self, service_id: &str) -> anyhow::Result<Option<String>>;
}

/// Documents held in memory; used by tests and embedders that bundle specs.
#[derive(Debug, Default, Clone)]
pub struct InMemorySpecStore {
    documents: HashMap<String, String>,
}

impl InMemorySpecStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, service_id: impl Into<String>, document: impl Into<String>) {
        self.documents.insert(service_id.into(), document.into());
    }

    /// Builder-style [`Self::insert`].
    #[must_use]
    pub fn with(mut self, service_id: impl Into<String>, document: impl Into<String>) -> Self {
        self.insert(service_id, document);
        self
    }
}

impl SpecStore for InMemorySpecStore {
    fn fetch(&self, service_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.documents.get(service_id).cloned())
    }
}

/// Reads `<root>/<service_id>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySpecStore {
    root: PathBuf,
}

impl DirectorySpecStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SpecStore for DirectorySpecStore {
    fn fetch(&self, service_id: &str) -> anyhow::Result<Option<String>> {
        // Identifiers name a file directly under the root, never a path.
        if service_id.is_empty()
            || service_id.contains(['/', '\\'])
            || service_id.contains("..")
        {
            return Ok(None);
        }
        let path = self.root.join(format!("{service_id}.json"));
        match std::fs::read_to_string(&path) {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}
