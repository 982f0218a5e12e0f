//! Configuration document model
//!
//! One [`ConfigDocument`] is one parsed configuration file plus its
//! discovered include entries and dropin files. Include and dropin lists
//! are computed lazily and cached until [`ConfigDocument::reset_includes`]
//! or an on-disk timestamp change invalidates them.

use crate::error::ConfigError;
use crate::merge::OnConflict;
use crate::result::Result;
use crate::server::{self, ServerLayout};
use crate::variables::VariableLookup;
use crate::xml::{self, XmlElement, XmlNode};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// One `<include>` child of the document root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeEntry {
    /// The raw `location` attribute text
    pub location: String,
    /// Resolved target on disk, when the file exists
    pub path: Option<PathBuf>,
    /// `onConflict` attribute, `None` when not specified (inherited)
    pub on_conflict: Option<OnConflict>,
}

impl IncludeEntry {
    pub fn is_resolved(&self) -> bool {
        self.path.is_some()
    }
}

/// A parsed configuration file
#[derive(Debug)]
pub struct ConfigDocument {
    path: PathBuf,
    root: XmlElement,
    last_modified: Option<SystemTime>,
    layout: Option<ServerLayout>,
    includes: Option<Vec<IncludeEntry>>,
}

impl ConfigDocument {
    /// Load and parse a configuration file. The layout is taken from the
    /// caller (documents reached through includes inherit their parent's)
    /// or derived from the path when it is a config root.
    pub fn load(path: &Path, layout: Option<ServerLayout>) -> Result<Self> {
        let canonical = path
            .canonicalize()
            .map_err(|e| ConfigError::io_error(path, e))?;
        let content =
            fs::read_to_string(&canonical).map_err(|e| ConfigError::io_error(&canonical, e))?;
        let root = xml::parse_document(&content, &canonical)?;
        let last_modified = fs::metadata(&canonical)
            .and_then(|m| m.modified())
            .ok();
        let layout = layout.or_else(|| ServerLayout::from_config_root(&canonical));
        tracing::debug!("loaded {}", canonical.display());
        Ok(Self {
            path: canonical,
            root,
            last_modified,
            layout,
            includes: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn layout(&self) -> Option<&ServerLayout> {
        self.layout.as_ref()
    }

    /// Key identifying the lock scope for mutations: the owning server when
    /// there is one, this document otherwise
    pub fn lock_key(&self) -> String {
        match &self.layout {
            Some(layout) => format!(
                "{}::{}",
                layout.user_dir.path().display(),
                layout.server_name
            ),
            None => self.path.display().to_string(),
        }
    }

    /// Whether the file changed on disk since this document was parsed
    pub fn has_changed(&self) -> bool {
        let current = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        current != self.last_modified
    }

    /// Whether this document is a server's configuration root
    pub fn is_config_root(&self) -> bool {
        server::is_config_root(&self.path)
    }

    /// Direct `<include>` entries, lazily computed and cached
    pub fn local_includes(&mut self, vars: Option<&dyn VariableLookup>) -> &[IncludeEntry] {
        if self.includes.is_none() {
            self.includes = Some(self.compute_includes(vars));
        }
        self.includes.as_deref().unwrap_or_default()
    }

    /// Uncached include computation, used both for the cache and for
    /// out-of-sync detection
    pub fn compute_includes(&self, vars: Option<&dyn VariableLookup>) -> Vec<IncludeEntry> {
        let base_dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut entries = Vec::new();
        for include in self.root.children_named("include") {
            let Some(location) = include.attribute("location") else {
                tracing::warn!("{}: <include> without location", self.path.display());
                continue;
            };
            let on_conflict = include.attribute("onConflict").map(OnConflict::parse);
            let path = server::resolve_location(location, &base_dir, self.layout.as_ref(), vars)
                .and_then(|p| p.canonicalize().ok());
            if path.is_none() {
                tracing::debug!(
                    "{}: include '{location}' unresolved",
                    self.path.display()
                );
            }
            entries.push(IncludeEntry {
                location: location.to_string(),
                path,
                on_conflict,
            });
        }
        entries
    }

    /// Raw locations of includes that could not be resolved to a file
    pub fn unresolved_includes(&mut self, vars: Option<&dyn VariableLookup>) -> Vec<String> {
        self.local_includes(vars)
            .iter()
            .filter(|e| !e.is_resolved())
            .map(|e| e.location.clone())
            .collect()
    }

    /// Whether the cached include list disagrees with the disk: a
    /// previously missing include appeared, or a resolved one vanished
    pub fn has_out_of_sync_includes(&self, vars: Option<&dyn VariableLookup>) -> bool {
        let Some(cached) = &self.includes else {
            return false;
        };
        let fresh = self.compute_includes(vars);
        if fresh.len() != cached.len() {
            return true;
        }
        fresh
            .iter()
            .zip(cached.iter())
            .any(|(f, c)| f.is_resolved() != c.is_resolved())
    }

    /// Drop cached include/dropin state, forcing re-discovery on next access
    pub fn reset_includes(&mut self) {
        self.includes = None;
    }

    /// Default dropins (`configDropins/defaults/*.xml`), name-sorted. Only
    /// config roots have dropins.
    pub fn default_dropin_files(&self) -> Vec<PathBuf> {
        self.dropin_files(server::DEFAULT_DROPINS_DIR)
    }

    /// Override dropins (`configDropins/overrides/*.xml`), name-sorted
    pub fn override_dropin_files(&self) -> Vec<PathBuf> {
        self.dropin_files(server::OVERRIDE_DROPINS_DIR)
    }

    fn dropin_files(&self, subdir: &str) -> Vec<PathBuf> {
        if !self.is_config_root() {
            return Vec::new();
        }
        let Some(dir) = self.path.parent().map(|p| p.join(subdir)) else {
            return Vec::new();
        };
        if !dir.is_dir() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
            })
            .collect();
        files.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
        files
    }

    // --- mutations -------------------------------------------------------
    //
    // Callers go through DocumentRegistry::mutate so all documents of one
    // server are serialized on the same lock.

    /// Add a feature to `<featureManager>`, creating it if needed. Returns
    /// false if the feature was already present.
    pub fn add_feature(&mut self, name: &str) -> bool {
        if let Some(fm) = self.root.find_child("featureManager") {
            if fm
                .children_named("feature")
                .any(|f| f.text().eq_ignore_ascii_case(name))
            {
                return false;
            }
        }
        if self.root.find_child("featureManager").is_none() {
            self.root.push_element(XmlElement::new("featureManager"));
        }
        let Some(fm) = self.root.find_child_mut("featureManager") else {
            return false;
        };
        let mut feature = XmlElement::new("feature");
        feature.push_text(name);
        fm.push_element(feature);
        true
    }

    /// Append an `<include>` and invalidate cached discovery
    pub fn add_include(&mut self, location: &str, on_conflict: Option<OnConflict>) {
        let mut include = XmlElement::new("include");
        include.set_attribute("location", location);
        if let Some(policy) = on_conflict {
            include.set_attribute("onConflict", policy.as_str());
        }
        self.root.push_element(include);
        self.reset_includes();
    }

    /// Append an application element (`<application>`, `<webApplication>`,
    /// ...) and invalidate cached discovery
    pub fn add_application(&mut self, element_name: &str, name: &str, location: &str) {
        let mut app = XmlElement::new(element_name);
        app.set_attribute("name", name);
        app.set_attribute("location", location);
        self.root.push_element(app);
        self.reset_includes();
    }

    /// Append a `<library id=...><fileset dir=... includes=.../></library>`
    /// and invalidate cached discovery
    pub fn add_shared_library(&mut self, id: &str, dir: &str, includes: &str) {
        let mut fileset = XmlElement::new("fileset");
        fileset.set_attribute("dir", dir);
        fileset.set_attribute("includes", includes);
        let mut library = XmlElement::new("library");
        library.set_attribute("id", id);
        library.push_element(fileset);
        self.root.push_element(library);
        self.reset_includes();
    }

    /// Append a `<variable name=... value=.../>` declaration and invalidate
    /// cached discovery: the new value may change how a `${...}` include
    /// location resolves
    pub fn add_variable(&mut self, name: &str, value: &str) {
        let mut var = XmlElement::new("variable");
        var.set_attribute("name", name);
        var.set_attribute("value", value);
        self.root.push_element(var);
        self.reset_includes();
    }

    /// Set an attribute on the first child matching `element_name` (and the
    /// id attribute pair when given). Returns false when no element matched.
    pub fn set_attribute(
        &mut self,
        element_name: &str,
        id: Option<(&str, &str)>,
        attribute: &str,
        value: &str,
    ) -> bool {
        let target = self
            .root
            .child_elements_mut()
            .filter(|e| e.name == element_name)
            .find(|e| match id {
                Some((id_attr, id_value)) => e.attribute(id_attr) == Some(id_value),
                None => true,
            });
        match target {
            Some(element) => {
                element.set_attribute(attribute, value);
                true
            }
            None => false,
        }
    }

    /// Remove the first child matching `element_name` (and the id attribute
    /// pair when given). Returns false when no element matched.
    pub fn remove_element(&mut self, element_name: &str, id: Option<(&str, &str)>) -> bool {
        let index = self.root.children.iter().position(|c| match c {
            XmlNode::Element(e) if e.name == element_name => match id {
                Some((id_attr, id_value)) => e.attribute(id_attr) == Some(id_value),
                None => true,
            },
            _ => false,
        });
        match index {
            Some(i) => {
                self.root.children.remove(i);
                self.reset_includes();
                true
            }
            None => false,
        }
    }

    /// Serialize the document
    pub fn to_xml(&self) -> Result<String> {
        xml::serialize_document(&self.root)
    }

    /// Write the document back to its file and refresh the timestamp
    pub fn save(&mut self) -> Result<()> {
        let content = self.to_xml()?;
        fs::write(&self.path, content).map_err(|e| ConfigError::io_error(&self.path, e))?;
        self.last_modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();
        Ok(())
    }
}
