//! bootstrap.properties and server.env readers
//!
//! Both files feed the variable store before any `server.xml` content.
//! `bootstrap.properties` supports the `bootstrap.include` directive for
//! pulling in further properties files; across the whole include chain the
//! first value seen for a key wins. `server.env` values are taken verbatim.

use crate::error::ConfigError;
use crate::result::Result;
use crate::variables::{DocumentLocation, VariableStore};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Directive naming additional properties files to merge
pub const BOOTSTRAP_INCLUDE: &str = "bootstrap.include";

/// Prefix applied to server.env keys when stored as variables
pub const ENV_VAR_PREFIX: &str = "env.";

/// Read a bootstrap.properties file, following `bootstrap.include` chains.
///
/// Returns key -> value in first-seen order; keys from included files never
/// overwrite keys already present. Include cycles are skipped.
pub fn read_bootstrap_properties(path: &Path) -> Result<IndexMap<String, String>> {
    let mut merged = IndexMap::new();
    let mut visited = HashSet::new();
    read_properties_into(path, &mut merged, &mut visited)?;
    Ok(merged)
}

fn read_properties_into(
    path: &Path,
    merged: &mut IndexMap<String, String>,
    visited: &mut HashSet<PathBuf>,
) -> Result<()> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        tracing::debug!("bootstrap include cycle at {}", path.display());
        return Ok(());
    }
    let content = fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;

    let mut includes: Option<String> = None;
    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = split_property(line) else {
            return Err(ConfigError::properties_error(
                path,
                format!("malformed line '{line}'"),
            ));
        };
        if key == BOOTSTRAP_INCLUDE {
            // Handled after the file's own keys so they take precedence
            includes.get_or_insert(value);
            continue;
        }
        merged.entry(key).or_insert(value);
    }

    if let Some(list) = includes {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in list.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let target = resolve_include_path(entry, base);
            if target.exists() {
                read_properties_into(&target, merged, visited)?;
            } else {
                tracing::warn!(
                    "{}: bootstrap.include target '{entry}' not found",
                    path.display()
                );
            }
        }
    }
    Ok(())
}

/// Split a properties line on the first unescaped `=` or `:`
fn split_property(line: &str) -> Option<(String, String)> {
    let idx = line.find(['=', ':'])?;
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), line[idx + 1..].trim().to_string()))
}

fn resolve_include_path(entry: &str, base: &Path) -> PathBuf {
    let entry = entry.strip_prefix("file://").unwrap_or(entry);
    let entry = entry.strip_prefix("file:").unwrap_or(entry);
    let path = Path::new(entry);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Read a server.env file: `KEY=VALUE` on the first `=`, `#` comments and
/// blank lines skipped. No variable expansion is performed on the values.
pub fn read_server_env(path: &Path) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
    let mut entries = Vec::new();
    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(idx) = line.find('=') else {
            tracing::warn!("{}: skipping malformed line '{line}'", path.display());
            continue;
        };
        let key = line[..idx].trim();
        if key.is_empty() {
            continue;
        }
        entries.push((key.to_string(), line[idx + 1..].trim().to_string()));
    }
    Ok(entries)
}

/// Populate a store from both sources if the files exist. bootstrap
/// properties are added with resolution (they may reference each other);
/// server.env keys get the env prefix and stay verbatim.
pub fn populate_store(
    store: &mut VariableStore,
    bootstrap_path: &Path,
    server_env_path: &Path,
) -> Result<()> {
    if bootstrap_path.exists() {
        let props = read_bootstrap_properties(bootstrap_path)?;
        store.start_context();
        for (key, value) in props {
            store.add(
                key,
                value,
                None,
                Some(DocumentLocation::new(bootstrap_path.display().to_string())),
            );
        }
        store.end_context();
    }
    if server_env_path.exists() {
        for (key, value) in read_server_env(server_env_path)? {
            store.add_resolved(
                format!("{ENV_VAR_PREFIX}{key}"),
                value,
                None,
                Some(DocumentLocation::new(server_env_path.display().to_string())),
            );
        }
    }
    Ok(())
}
