//! Scoped variable store with deferred batch resolution
//!
//! The store holds `name -> (value, type, origin)` entries. Additions made
//! inside a `start_context()`/`end_context()` batch may reference variables
//! defined later in the same batch; the outermost `end_context()` resolves
//! the whole batch dependency-first with cycle protection.

use super::resolver::{self, contains_reference, referenced_names};
use super::types::VariableType;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Names the runtime predefines for every server. These resolve to
/// directories of the installation layout and are surfaced as "known but
/// unresolved" when no layout has populated them yet.
pub const PREDEFINED_VARS: &[&str] = &[
    "wlp.install.dir",
    "wlp.user.dir",
    "wlp.server.name",
    "shared.app.dir",
    "shared.config.dir",
    "shared.resource.dir",
    "server.config.dir",
    "server.output.dir",
    "usr.extension.dir",
];

/// Origin of a variable definition, used for jump-to-definition style tooling
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DocumentLocation {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
}

impl DocumentLocation {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            xpath: None,
            line: None,
            col: None,
        }
    }

    pub fn with_position(mut self, line: u32, col: u32) -> Self {
        self.line = Some(line);
        self.col = Some(col);
        self
    }
}

/// Read access to variables, implemented by the global store and by
/// element-local scopes that fall back to their parent.
pub trait VariableLookup {
    fn value(&self, name: &str) -> Option<&str>;
    fn var_type(&self, name: &str) -> Option<VariableType>;
    fn document_location(&self, name: &str) -> Option<&DocumentLocation>;

    fn is_defined(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// True only for the root (global) store
    fn is_global_scope(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    var_type: VariableType,
    location: Option<DocumentLocation>,
}

#[derive(Debug, Clone)]
struct DeferredVar {
    name: String,
    raw_value: String,
    var_type: Option<VariableType>,
    location: Option<DocumentLocation>,
}

/// The global variable store
#[derive(Debug, Default)]
pub struct VariableStore {
    entries: IndexMap<String, Entry>,
    deferred: Vec<DeferredVar>,
    context_depth: u32,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable. If the value still contains a `${...}` reference and a
    /// batch context is active, resolution is deferred to the outermost
    /// `end_context()`; otherwise the value is resolved immediately against
    /// the variables known so far. Unresolvable references stay literal.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        var_type: Option<VariableType>,
        location: Option<DocumentLocation>,
    ) {
        let name = name.into();
        let value = value.into();
        if contains_reference(&value) && self.context_depth > 0 {
            // Later additions of the same name in one batch win, matching the
            // merge engine's "a value declaration sets unconditionally" rule.
            self.deferred.retain(|d| d.name != name);
            self.deferred.push(DeferredVar {
                name,
                raw_value: value,
                var_type,
                location,
            });
            return;
        }
        let resolved = resolver::resolve(self, &value, None).into_text();
        self.insert(name, resolved, var_type, location);
    }

    /// Add a value known to already be fully resolved
    pub fn add_resolved(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        var_type: Option<VariableType>,
        location: Option<DocumentLocation>,
    ) {
        self.insert(name.into(), value.into(), var_type, location);
    }

    fn insert(
        &mut self,
        name: String,
        value: String,
        var_type: Option<VariableType>,
        location: Option<DocumentLocation>,
    ) {
        let var_type = var_type.unwrap_or_else(|| VariableType::compute(&value));
        self.entries.insert(
            name,
            Entry {
                value,
                var_type,
                location,
            },
        );
    }

    /// Open a batch context. Contexts are re-entrant; only the outermost
    /// `end_context()` triggers deferred resolution.
    pub fn start_context(&mut self) {
        self.context_depth += 1;
    }

    pub fn end_context(&mut self) {
        if self.context_depth == 0 {
            return;
        }
        self.context_depth -= 1;
        if self.context_depth == 0 {
            self.resolve_deferred();
        }
    }

    /// Resolve every deferred entry, dependencies first. Runs on an explicit
    /// work stack so deep reference chains cannot overflow the call stack;
    /// a reference back to a variable currently being resolved is skipped
    /// and stays literal in that variable's value.
    fn resolve_deferred(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);
        let mut pending: IndexMap<String, DeferredVar> = IndexMap::new();
        for var in deferred {
            pending.insert(var.name.clone(), var);
        }

        enum Task {
            Enter(String),
            Finish(String),
        }

        let mut in_progress: HashSet<String> = HashSet::new();
        let roots: Vec<String> = pending.keys().rev().cloned().collect();
        let mut stack: Vec<Task> = roots.into_iter().map(Task::Enter).collect();

        while let Some(task) = stack.pop() {
            match task {
                Task::Enter(name) => {
                    if !pending.contains_key(&name) {
                        continue;
                    }
                    if !in_progress.insert(name.clone()) {
                        // Cyclic reference: leave it for the entry already on
                        // the stack to finish with the literal text.
                        tracing::debug!("cyclic variable reference through '{name}'");
                        continue;
                    }
                    let deps = referenced_names(&pending[&name].raw_value);
                    stack.push(Task::Finish(name));
                    for dep in deps {
                        if pending.contains_key(&dep) {
                            stack.push(Task::Enter(dep));
                        }
                    }
                }
                Task::Finish(name) => {
                    if let Some(var) = pending.shift_remove(&name) {
                        let resolved = resolver::resolve(self, &var.raw_value, None).into_text();
                        self.insert(var.name, resolved, var.var_type, var.location);
                    }
                    in_progress.remove(&name);
                }
            }
        }
    }

    /// Names of variables whose type satisfies `requested`. With
    /// `include_unresolved_predefined`, predefined names that no source has
    /// defined yet are appended (they are locations once resolved).
    pub fn vars_of_type(
        &self,
        requested: VariableType,
        include_unresolved_predefined: bool,
    ) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| requested.accepts(e.var_type))
            .map(|(n, _)| n.clone())
            .collect();
        if include_unresolved_predefined && requested.accepts(VariableType::Location) {
            for name in PREDEFINED_VARS {
                if !self.entries.contains_key(*name) {
                    names.push((*name).to_string());
                }
            }
        }
        names
    }

    /// Iterate over all defined variables as (name, value, type)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, VariableType)> {
        self.entries
            .iter()
            .map(|(n, e)| (n.as_str(), e.value.as_str(), e.var_type))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Create a local scope whose lookups fall back to this store
    pub fn local_scope(&self) -> LocalStore<'_> {
        LocalStore {
            parent: self,
            entries: IndexMap::new(),
        }
    }
}

impl VariableLookup for VariableStore {
    fn value(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.value.as_str())
    }

    fn var_type(&self, name: &str) -> Option<VariableType> {
        self.entries.get(name).map(|e| e.var_type)
    }

    fn document_location(&self, name: &str) -> Option<&DocumentLocation> {
        self.entries.get(name).and_then(|e| e.location.as_ref())
    }

    fn is_global_scope(&self) -> bool {
        true
    }
}

/// Element-local variable scope (attribute-derived variables). Falls back to
/// the parent store for anything not defined locally.
pub struct LocalStore<'a> {
    parent: &'a VariableStore,
    entries: IndexMap<String, Entry>,
}

impl LocalStore<'_> {
    pub fn add_resolved(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        var_type: Option<VariableType>,
        location: Option<DocumentLocation>,
    ) {
        let value = value.into();
        let var_type = var_type.unwrap_or_else(|| VariableType::compute(&value));
        self.entries.insert(
            name.into(),
            Entry {
                value,
                var_type,
                location,
            },
        );
    }
}

impl VariableLookup for LocalStore<'_> {
    fn value(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .map(|e| e.value.as_str())
            .or_else(|| self.parent.value(name))
    }

    fn var_type(&self, name: &str) -> Option<VariableType> {
        self.entries
            .get(name)
            .map(|e| e.var_type)
            .or_else(|| self.parent.var_type(name))
    }

    fn document_location(&self, name: &str) -> Option<&DocumentLocation> {
        self.entries
            .get(name)
            .and_then(|e| e.location.as_ref())
            .or_else(|| self.parent.document_location(name))
    }
}
