//! Flattened single-document view for inspection and audit
//!
//! Same traversal order as element resolution, but nothing is merged by
//! identity: every contributed element is emitted verbatim, with comments
//! bracketing each include and dropin to record where content came from.

use super::OnConflict;
use crate::registry::DocumentRegistry;
use crate::result::{Result, ResultExt};
use crate::server::ServerLayout;
use crate::variables::VariableLookup;
use crate::xml::{self, XmlElement, XmlNode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Produce the flattened configuration document rooted at `root` as
/// indented XML text.
pub fn flatten(
    registry: &DocumentRegistry,
    root: &Path,
    vars: Option<&dyn VariableLookup>,
) -> Result<String> {
    registry.load(root, None)?;
    let mut visited = HashSet::new();
    let mut acc = XmlElement::new("server");
    flatten_into(registry, root, None, vars, &mut visited, &mut acc, true)?;
    xml::serialize_document(&acc)
}

#[allow(clippy::too_many_arguments)]
fn flatten_into(
    registry: &DocumentRegistry,
    path: &Path,
    layout: Option<&ServerLayout>,
    vars: Option<&dyn VariableLookup>,
    visited: &mut HashSet<PathBuf>,
    acc: &mut XmlElement,
    top_level: bool,
) -> Result<()> {
    let Some(doc) = registry.load(path, layout).recoverable()? else {
        acc.push_comment(format!(" {} could not be parsed, skipped ", path.display()));
        return Ok(());
    };
    let (canonical, layout, root, includes, defaults, overrides) = {
        let mut writer = doc.write();
        (
            writer.path().to_path_buf(),
            writer.layout().cloned(),
            writer.root().clone(),
            writer.local_includes(vars).to_vec(),
            writer.default_dropin_files(),
            writer.override_dropin_files(),
        )
    };
    if !visited.insert(canonical.clone()) {
        acc.push_comment(format!(" {} already contributed, skipped ", canonical.display()));
        return Ok(());
    }
    if top_level {
        // The flattened document keeps the root's own attributes
        for (key, value) in &root.attributes {
            acc.set_attribute(key.clone(), value.clone());
        }
    }

    for dropin in defaults {
        acc.push_comment(format!(" Begin default dropin: {} ", dropin.display()));
        flatten_into(registry, &dropin, layout.as_ref(), vars, visited, acc, false)?;
        acc.push_comment(format!(" End default dropin: {} ", dropin.display()));
    }

    let mut include_idx = 0;
    for child in &root.children {
        match child {
            XmlNode::Element(element) if element.name == "include" => {
                if element.attribute("location").is_none() {
                    continue;
                }
                let entry = includes.get(include_idx).cloned();
                include_idx += 1;
                let Some(entry) = entry else { continue };
                let policy = entry.on_conflict.unwrap_or(OnConflict::Merge);
                match &entry.path {
                    Some(target) => {
                        acc.push_comment(format!(
                            " Begin include: {} (onConflict={}) ",
                            entry.location,
                            policy.as_str()
                        ));
                        flatten_into(registry, target, layout.as_ref(), vars, visited, acc, false)?;
                        acc.push_comment(format!(" End include: {} ", entry.location));
                    }
                    None => {
                        acc.push_comment(format!(" Unresolved include: {} ", entry.location));
                    }
                }
            }
            XmlNode::Element(element) => acc.push_element(element.clone()),
            XmlNode::Comment(comment) => acc.push_comment(comment.clone()),
            XmlNode::Text(_) => {}
        }
    }

    for dropin in overrides {
        acc.push_comment(format!(" Begin override dropin: {} ", dropin.display()));
        flatten_into(registry, &dropin, layout.as_ref(), vars, visited, acc, false)?;
        acc.push_comment(format!(" End override dropin: {} ", dropin.display()));
    }
    Ok(())
}
