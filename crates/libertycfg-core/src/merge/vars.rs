//! Variable collection across the configuration graph
//!
//! Follows the same traversal order as element resolution but populates a
//! [`VariableStore`] instead of merging XML. A per-traversal context keeps
//! the declared-vs-default bookkeeping and is discarded afterwards.

use super::OnConflict;
use crate::registry::DocumentRegistry;
use crate::result::{Result, ResultExt};
use crate::server::ServerLayout;
use crate::variables::{DocumentLocation, VariableStore};
use crate::xml::XmlElement;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Default)]
struct VarsContext {
    /// Names that have seen a `value=` declaration in this traversal
    declared: HashSet<String>,
    /// Names that have only seen a `defaultValue=` so far
    defaulted: HashSet<String>,
    visited: HashSet<PathBuf>,
}

/// Collect every `<variable>` declaration of the graph rooted at `root`
/// into `store`. The whole traversal runs as one store context, so
/// declarations may reference each other in any order.
pub fn collect_variables(
    registry: &DocumentRegistry,
    root: &Path,
    store: &mut VariableStore,
) -> Result<()> {
    registry.load(root, None)?;
    let mut ctx = VarsContext::default();
    store.start_context();
    let outcome = collect(registry, root, None, store, &mut ctx, false);
    store.end_context();
    outcome
}

fn collect(
    registry: &DocumentRegistry,
    path: &Path,
    layout: Option<&ServerLayout>,
    store: &mut VariableStore,
    ctx: &mut VarsContext,
    ignore: bool,
) -> Result<()> {
    let Some(doc) = registry.load(path, layout).recoverable()? else {
        return Ok(());
    };
    let (canonical, layout, root, includes, defaults, overrides) = {
        let mut writer = doc.write();
        (
            writer.path().to_path_buf(),
            writer.layout().cloned(),
            writer.root().clone(),
            writer.local_includes(Some(&*store)).to_vec(),
            writer.default_dropin_files(),
            writer.override_dropin_files(),
        )
    };
    if !ctx.visited.insert(canonical.clone()) {
        return Ok(());
    }

    for dropin in defaults {
        collect(registry, &dropin, layout.as_ref(), store, ctx, false)?;
    }

    let mut include_idx = 0;
    for child in root.child_elements() {
        match child.name.as_str() {
            "include" => {
                if child.attribute("location").is_none() {
                    continue;
                }
                let entry = includes.get(include_idx).cloned();
                include_idx += 1;
                let Some(entry) = entry else { continue };
                // An include's own onConflict drives the ignore flag for its
                // subtree; without one the parent's setting is inherited.
                let child_ignore = match entry.on_conflict {
                    Some(OnConflict::Ignore) => true,
                    Some(_) => false,
                    None => ignore,
                };
                if let Some(target) = &entry.path {
                    collect(registry, target, layout.as_ref(), store, ctx, child_ignore)?;
                }
            }
            "variable" => {
                apply_variable(child, &canonical, store, ctx, ignore);
            }
            _ => {}
        }
    }

    for dropin in overrides {
        collect(registry, &dropin, layout.as_ref(), store, ctx, false)?;
    }
    Ok(())
}

fn apply_variable(
    element: &XmlElement,
    source: &Path,
    store: &mut VariableStore,
    ctx: &mut VarsContext,
    ignore: bool,
) {
    let Some(name) = element.attribute("name") else {
        tracing::warn!("{}: <variable> without name", source.display());
        return;
    };
    let mut location = DocumentLocation::new(source.display().to_string());
    if let Some(pos) = element.source {
        location = location.with_position(pos.line, pos.col);
    }

    if let Some(value) = element.attribute("value") {
        // A value declaration sets unconditionally, unless this name was
        // already declared in this chain and the ignore policy is active.
        if ctx.declared.contains(name) && ignore {
            return;
        }
        store.add(name, value, None, Some(location));
        ctx.declared.insert(name.to_string());
    } else if let Some(default_value) = element.attribute("defaultValue") {
        // Defaults only fill gaps: never over a value declaration, and over
        // an earlier default only when ignore is not active.
        if ctx.declared.contains(name) || (ctx.defaulted.contains(name) && ignore) {
            return;
        }
        store.add(name, default_value, None, Some(location));
        ctx.defaulted.insert(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableLookup;
    use std::fs;
    use tempfile::TempDir;

    fn write_tree(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("usr/servers/s1");
        fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        let root = dir.join("server.xml");
        (temp, root)
    }

    #[test]
    fn collects_values_and_defaults() {
        let (_temp, root) = write_tree(&[(
            "server.xml",
            r#"<server>
                <variable name="a" value="1"/>
                <variable name="b" defaultValue="fallback"/>
                <variable name="a" defaultValue="ignored"/>
            </server>"#,
        )]);
        let registry = DocumentRegistry::new();
        let mut store = VariableStore::new();
        collect_variables(&registry, &root, &mut store).unwrap();
        assert_eq!(store.value("a"), Some("1"));
        assert_eq!(store.value("b"), Some("fallback"));
    }

    #[test]
    fn later_value_overrides_earlier() {
        let (_temp, root) = write_tree(&[(
            "server.xml",
            r#"<server>
                <variable name="port" value="9080"/>
                <variable name="port" value="9081"/>
            </server>"#,
        )]);
        let registry = DocumentRegistry::new();
        let mut store = VariableStore::new();
        collect_variables(&registry, &root, &mut store).unwrap();
        assert_eq!(store.value("port"), Some("9081"));
    }

    #[test]
    fn ignore_include_cannot_redeclare() {
        let (_temp, root) = write_tree(&[
            (
                "server.xml",
                r#"<server>
                    <variable name="a" value="root"/>
                    <include location="child.xml" onConflict="ignore"/>
                </server>"#,
            ),
            (
                "child.xml",
                r#"<server>
                    <variable name="a" value="child"/>
                    <variable name="fresh" value="new"/>
                </server>"#,
            ),
        ]);
        let registry = DocumentRegistry::new();
        let mut store = VariableStore::new();
        collect_variables(&registry, &root, &mut store).unwrap();
        // Already declared + ignore: the include cannot override
        assert_eq!(store.value("a"), Some("root"));
        // New names still land
        assert_eq!(store.value("fresh"), Some("new"));
    }

    #[test]
    fn merge_include_redeclares() {
        let (_temp, root) = write_tree(&[
            (
                "server.xml",
                r#"<server>
                    <variable name="a" value="root"/>
                    <include location="child.xml"/>
                </server>"#,
            ),
            (
                "child.xml",
                r#"<server><variable name="a" value="child"/></server>"#,
            ),
        ]);
        let registry = DocumentRegistry::new();
        let mut store = VariableStore::new();
        collect_variables(&registry, &root, &mut store).unwrap();
        assert_eq!(store.value("a"), Some("child"));
    }

    #[test]
    fn nested_include_inherits_ignore() {
        let (_temp, root) = write_tree(&[
            (
                "server.xml",
                r#"<server>
                    <variable name="a" value="root"/>
                    <include location="mid.xml" onConflict="ignore"/>
                </server>"#,
            ),
            (
                "mid.xml",
                r#"<server><include location="leaf.xml"/></server>"#,
            ),
            (
                "leaf.xml",
                r#"<server><variable name="a" value="leaf"/></server>"#,
            ),
        ]);
        let registry = DocumentRegistry::new();
        let mut store = VariableStore::new();
        collect_variables(&registry, &root, &mut store).unwrap();
        assert_eq!(store.value("a"), Some("root"));
    }

    #[test]
    fn cross_file_references_resolve() {
        let (_temp, root) = write_tree(&[
            (
                "server.xml",
                r#"<server>
                    <variable name="url" value="http://${host}:${port}/"/>
                    <include location="net.xml"/>
                </server>"#,
            ),
            (
                "net.xml",
                r#"<server>
                    <variable name="host" value="localhost"/>
                    <variable name="port" value="9080"/>
                </server>"#,
            ),
        ]);
        let registry = DocumentRegistry::new();
        let mut store = VariableStore::new();
        collect_variables(&registry, &root, &mut store).unwrap();
        assert_eq!(store.value("url"), Some("http://localhost:9080/"));
    }

    #[test]
    fn override_dropin_wins_over_root() {
        let (_temp, root) = write_tree(&[
            (
                "server.xml",
                r#"<server><variable name="a" value="root"/></server>"#,
            ),
            (
                "configDropins/defaults/d.xml",
                r#"<server><variable name="a" value="default-dropin"/><variable name="d" value="1"/></server>"#,
            ),
            (
                "configDropins/overrides/o.xml",
                r#"<server><variable name="a" value="override-dropin"/></server>"#,
            ),
        ]);
        let registry = DocumentRegistry::new();
        let mut store = VariableStore::new();
        collect_variables(&registry, &root, &mut store).unwrap();
        assert_eq!(store.value("a"), Some("override-dropin"));
        assert_eq!(store.value("d"), Some("1"));
    }
}
