//! Document registry and locking
//!
//! The registry is the explicit replacement for process-wide server
//! lookups: callers construct one and pass it into the merge engine and
//! traversal helpers. It caches parsed documents by canonical path,
//! reloading them when the on-disk timestamp changes, and owns one mutation
//! lock per server.
//!
//! Lock ordering: registry lookups are lock-free (DashMap) and must never
//! be performed while holding a server lock taken through another registry
//! call; `mutate` acquires the server lock before the document's write lock
//! and nothing else.

use crate::document::{ConfigDocument, IncludeEntry};
use crate::error::ConfigError;
use crate::result::{Result, ResultExt};
use crate::server::ServerLayout;
use crate::variables::VariableLookup;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to a cached document
pub type SharedDocument = Arc<RwLock<ConfigDocument>>;

/// Cache of configuration documents plus per-server mutation locks
#[derive(Default)]
pub struct DocumentRegistry {
    documents: DashMap<PathBuf, SharedDocument>,
    server_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a document, reusing the cached parse unless the file changed on
    /// disk. Documents reached through includes pass their parent's layout.
    pub fn load(&self, path: &Path, layout: Option<&ServerLayout>) -> Result<SharedDocument> {
        let canonical = path
            .canonicalize()
            .map_err(|e| ConfigError::io_error(path, e))?;

        if let Some(existing) = self.documents.get(&canonical) {
            let doc = Arc::clone(&existing);
            drop(existing);
            if doc.read().has_changed() {
                tracing::debug!("reloading stale {}", canonical.display());
                let reloaded = ConfigDocument::load(&canonical, layout.cloned())?;
                *doc.write() = reloaded;
            }
            return Ok(doc);
        }

        let doc = ConfigDocument::load(&canonical, layout.cloned())?;
        let entry = self
            .documents
            .entry(canonical)
            .or_insert_with(|| Arc::new(RwLock::new(doc)));
        Ok(Arc::clone(&entry))
    }

    /// Drop a cached document
    pub fn invalidate(&self, path: &Path) {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.documents.remove(&canonical);
    }

    /// The mutation lock for a server key (see
    /// [`ConfigDocument::lock_key`])
    pub fn server_lock(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            &self
                .server_locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Run a mutation with the owning server's lock held, then the
    /// document's write lock
    pub fn mutate<R>(
        &self,
        path: &Path,
        f: impl FnOnce(&mut ConfigDocument) -> R,
    ) -> Result<R> {
        let doc = self.load(path, None)?;
        let key = doc.read().lock_key();
        let server_lock = self.server_lock(&key);
        let _guard = server_lock.lock();
        let mut writer = doc.write();
        Ok(f(&mut writer))
    }

    /// Include entries of a document, computed through the document's lazy
    /// cache
    pub fn include_entries(
        &self,
        path: &Path,
        vars: Option<&dyn VariableLookup>,
    ) -> Result<Vec<IncludeEntry>> {
        let doc = self.load(path, None)?;
        let mut writer = doc.write();
        Ok(writer.local_includes(vars).to_vec())
    }

    /// Every file of the configuration graph rooted at `root`: default
    /// dropins, includes (recursively), override dropins. Cyclic includes
    /// are visited once. Documents reached through the graph that fail to
    /// parse are skipped with a warning; only the root stays fatal.
    pub fn all_config_files(
        &self,
        root: &Path,
        vars: Option<&dyn VariableLookup>,
    ) -> Result<Vec<PathBuf>> {
        self.load(root, None)?;
        let mut visited = HashSet::new();
        let mut files = Vec::new();
        self.collect_files(root, None, vars, &mut visited, &mut files)?;
        Ok(files)
    }

    fn collect_files(
        &self,
        path: &Path,
        layout: Option<&ServerLayout>,
        vars: Option<&dyn VariableLookup>,
        visited: &mut HashSet<PathBuf>,
        files: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let Some(doc) = self.load(path, layout).recoverable()? else {
            return Ok(());
        };
        let (canonical, layout, defaults, includes, overrides) = {
            let mut writer = doc.write();
            let canonical = writer.path().to_path_buf();
            if !visited.insert(canonical.clone()) {
                return Ok(());
            }
            (
                canonical,
                writer.layout().cloned(),
                writer.default_dropin_files(),
                writer.local_includes(vars).to_vec(),
                writer.override_dropin_files(),
            )
        };
        files.push(canonical);
        for dropin in defaults {
            self.collect_files(&dropin, layout.as_ref(), vars, visited, files)?;
        }
        for include in includes {
            if let Some(target) = include.path {
                self.collect_files(&target, layout.as_ref(), vars, visited, files)?;
            }
        }
        for dropin in overrides {
            self.collect_files(&dropin, layout.as_ref(), vars, visited, files)?;
        }
        Ok(())
    }
}
