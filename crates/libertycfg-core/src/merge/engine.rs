//! Identity-based element resolution across the configuration graph

use super::OnConflict;
use crate::registry::DocumentRegistry;
use crate::result::{Result, ResultExt};
use crate::server::ServerLayout;
use crate::variables::VariableLookup;
use crate::xml::{XmlElement, XmlNode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Resolves a merged view of configuration elements. The registry supplies
/// (and caches) documents; a variable lookup, when given, is used to expand
/// `${...}` references in include locations.
pub struct MergeEngine<'a> {
    registry: &'a DocumentRegistry,
    vars: Option<&'a dyn VariableLookup>,
}

impl<'a> MergeEngine<'a> {
    pub fn new(registry: &'a DocumentRegistry) -> Self {
        Self {
            registry,
            vars: None,
        }
    }

    pub fn with_variables(mut self, vars: &'a dyn VariableLookup) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Merged `element_name` elements of the graph rooted at `root`,
    /// identity-matched on `id_attribute`.
    ///
    /// Order of contribution: default dropins (always merged), the root
    /// document's children in document order with includes expanded under
    /// their own or inherited conflict policy, then override dropins
    /// (always merged). Unparseable documents below the root contribute
    /// nothing.
    pub fn resolve_elements(
        &self,
        root: &Path,
        element_name: &str,
        id_attribute: &str,
    ) -> Result<Vec<XmlElement>> {
        self.registry.load(root, None)?;
        let mut visited = HashSet::new();
        let acc = self.accumulate(
            root,
            None,
            element_name,
            id_attribute,
            OnConflict::Merge,
            &mut visited,
        )?;
        Ok(acc.children_named(element_name).cloned().collect())
    }

    fn accumulate(
        &self,
        path: &Path,
        layout: Option<&ServerLayout>,
        element_name: &str,
        id_attribute: &str,
        inherited: OnConflict,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<XmlElement> {
        let mut acc = XmlElement::new("server");
        let Some(doc) = self.registry.load(path, layout).recoverable()? else {
            return Ok(acc);
        };
        let (canonical, layout, root, includes, defaults, overrides) = {
            let mut writer = doc.write();
            (
                writer.path().to_path_buf(),
                writer.layout().cloned(),
                writer.root().clone(),
                writer.local_includes(self.vars).to_vec(),
                writer.default_dropin_files(),
                writer.override_dropin_files(),
            )
        };
        if !visited.insert(canonical) {
            // Already contributed in this traversal (cyclic include)
            return Ok(acc);
        }

        for dropin in defaults {
            let sub = self.accumulate(
                &dropin,
                layout.as_ref(),
                element_name,
                id_attribute,
                OnConflict::Merge,
                visited,
            )?;
            merge_contribution(&mut acc, sub, OnConflict::Merge, element_name, id_attribute);
        }

        let mut include_idx = 0;
        for child in root.child_elements() {
            if child.name == "include" {
                // Includes without a location never made it into the entry
                // list, keep the index aligned
                if child.attribute("location").is_none() {
                    continue;
                }
                let entry = includes.get(include_idx).cloned();
                include_idx += 1;
                let Some(entry) = entry else { continue };
                let policy = entry.on_conflict.unwrap_or(inherited);
                match &entry.path {
                    Some(target) => {
                        let sub = self.accumulate(
                            target,
                            layout.as_ref(),
                            element_name,
                            id_attribute,
                            policy,
                            visited,
                        )?;
                        merge_contribution(&mut acc, sub, policy, element_name, id_attribute);
                    }
                    None => {
                        tracing::warn!("skipping unresolved include '{}'", entry.location);
                    }
                }
            } else if child.name == element_name {
                apply_element(&mut acc, child.clone(), OnConflict::Merge, id_attribute);
            }
        }

        for dropin in overrides {
            let sub = self.accumulate(
                &dropin,
                layout.as_ref(),
                element_name,
                id_attribute,
                OnConflict::Merge,
                visited,
            )?;
            merge_contribution(&mut acc, sub, OnConflict::Merge, element_name, id_attribute);
        }
        Ok(acc)
    }
}

/// Merge every matching element of `sub` into the accumulator under one
/// policy
fn merge_contribution(
    acc: &mut XmlElement,
    sub: XmlElement,
    policy: OnConflict,
    element_name: &str,
    id_attribute: &str,
) {
    for child in sub.children {
        if let XmlNode::Element(element) = child {
            if element.name == element_name {
                apply_element(acc, element, policy, id_attribute);
            }
        }
    }
}

/// Place one incoming element into the accumulator. An empty or absent id
/// attribute marks a singleton that never matches another element, so all
/// such instances coexist as siblings.
fn apply_element(
    acc: &mut XmlElement,
    incoming: XmlElement,
    policy: OnConflict,
    id_attribute: &str,
) {
    let id = incoming
        .attribute(id_attribute)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let position = id.as_deref().and_then(|id_value| {
        acc.children.iter().position(|c| match c {
            XmlNode::Element(e) => {
                e.name == incoming.name && e.attribute(id_attribute) == Some(id_value)
            }
            _ => false,
        })
    });
    match position {
        Some(index) => match policy {
            OnConflict::Merge => {
                if let XmlNode::Element(existing) = &mut acc.children[index] {
                    merge_element(existing, incoming);
                }
            }
            OnConflict::Replace => {
                acc.children[index] = XmlNode::Element(incoming);
            }
            OnConflict::Ignore => {}
        },
        None => acc.push_element(incoming),
    }
}

/// Merge two elements: incoming attributes overwrite, incoming children are
/// appended. Children are never merged recursively.
pub fn merge_element(target: &mut XmlElement, incoming: XmlElement) {
    for (key, value) in incoming.attributes {
        target.attributes.insert(key, value);
    }
    target.children.extend(incoming.children);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(name: &str, attrs: &[(&str, &str)]) -> XmlElement {
        let mut e = XmlElement::new(name);
        for (k, v) in attrs {
            e.set_attribute(*k, *v);
        }
        e
    }

    #[test]
    fn merge_overwrites_attributes_appends_children() {
        let mut target = element("library", &[("id", "L1"), ("apiTypeVisibility", "api")]);
        target.push_element(element("fileset", &[("dir", "a")]));
        let mut incoming = element("library", &[("id", "L1"), ("apiTypeVisibility", "spec")]);
        incoming.push_element(element("fileset", &[("dir", "b")]));

        merge_element(&mut target, incoming);
        assert_eq!(target.attribute("apiTypeVisibility"), Some("spec"));
        let dirs: Vec<&str> = target
            .children_named("fileset")
            .filter_map(|f| f.attribute("dir"))
            .collect();
        assert_eq!(dirs, vec!["a", "b"]);
    }

    #[test]
    fn singletons_without_id_coexist() {
        let mut acc = XmlElement::new("server");
        apply_element(&mut acc, element("library", &[]), OnConflict::Merge, "id");
        apply_element(&mut acc, element("library", &[]), OnConflict::Merge, "id");
        apply_element(
            &mut acc,
            element("library", &[("id", "")]),
            OnConflict::Merge,
            "id",
        );
        assert_eq!(acc.children_named("library").count(), 3);
    }

    #[test]
    fn replace_discards_existing() {
        let mut acc = XmlElement::new("server");
        let mut first = element("library", &[("id", "L1"), ("keep", "no")]);
        first.push_element(element("fileset", &[("dir", "old")]));
        apply_element(&mut acc, first, OnConflict::Merge, "id");

        let second = element("library", &[("id", "L1")]);
        apply_element(&mut acc, second, OnConflict::Replace, "id");

        let lib = acc.find_child("library").unwrap();
        assert_eq!(lib.attribute("keep"), None);
        assert_eq!(lib.children_named("fileset").count(), 0);
    }

    #[test]
    fn ignore_keeps_existing() {
        let mut acc = XmlElement::new("server");
        apply_element(
            &mut acc,
            element("library", &[("id", "L1"), ("v", "1")]),
            OnConflict::Merge,
            "id",
        );
        apply_element(
            &mut acc,
            element("library", &[("id", "L1"), ("v", "2")]),
            OnConflict::Ignore,
            "id",
        );
        assert_eq!(
            acc.find_child("library").unwrap().attribute("v"),
            Some("1")
        );
    }
}
