//! Liberty directory layout and predefined variables
//!
//! A server lives at `<user dir>/servers/<name>/`; its `server.xml` there is
//! the configuration root. The layout also fixes the dropin subfolders and
//! the directories the predefined variables resolve to.

use crate::variables::{DocumentLocation, VariableLookup, VariableStore, VariableType, resolve};
use std::path::{Path, PathBuf};

/// Dropin subfolders of a config root, fixed names
pub const DEFAULT_DROPINS_DIR: &str = "configDropins/defaults";
pub const OVERRIDE_DROPINS_DIR: &str = "configDropins/overrides";

pub const WLP_INSTALL_DIR: &str = "wlp.install.dir";
pub const WLP_USER_DIR: &str = "wlp.user.dir";
pub const WLP_SERVER_NAME: &str = "wlp.server.name";
pub const SHARED_APP_DIR: &str = "shared.app.dir";
pub const SHARED_CONFIG_DIR: &str = "shared.config.dir";
pub const SHARED_RESOURCE_DIR: &str = "shared.resource.dir";
pub const SERVER_CONFIG_DIR: &str = "server.config.dir";
pub const SERVER_OUTPUT_DIR: &str = "server.output.dir";
pub const USR_EXTENSION_DIR: &str = "usr.extension.dir";

/// A user directory (`usr/`) holding servers and shared resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDirectory {
    path: PathBuf,
}

impl UserDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn servers_dir(&self) -> PathBuf {
        self.path.join("servers")
    }

    pub fn shared_app_dir(&self) -> PathBuf {
        self.path.join("shared").join("apps")
    }

    pub fn shared_config_dir(&self) -> PathBuf {
        self.path.join("shared").join("config")
    }

    pub fn shared_resource_dir(&self) -> PathBuf {
        self.path.join("shared").join("resources")
    }

    pub fn extension_dir(&self) -> PathBuf {
        self.path.join("extension")
    }
}

/// Identity and directory layout of one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLayout {
    pub install_dir: Option<PathBuf>,
    pub user_dir: UserDirectory,
    pub server_name: String,
}

impl ServerLayout {
    pub fn new(user_dir: UserDirectory, server_name: impl Into<String>) -> Self {
        Self {
            install_dir: None,
            user_dir,
            server_name: server_name.into(),
        }
    }

    pub fn with_install_dir(mut self, install_dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(install_dir.into());
        self
    }

    /// Derive the layout from a config-root path
    /// (`<user dir>/servers/<name>/server.xml`)
    pub fn from_config_root(server_xml: &Path) -> Option<Self> {
        if !is_config_root(server_xml) {
            return None;
        }
        let server_dir = server_xml.parent()?;
        let name = server_dir.file_name()?.to_str()?.to_string();
        let user_dir = server_dir.parent()?.parent()?;
        Some(Self::new(UserDirectory::new(user_dir), name))
    }

    pub fn config_dir(&self) -> PathBuf {
        self.user_dir.servers_dir().join(&self.server_name)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config_dir()
    }

    pub fn server_xml(&self) -> PathBuf {
        self.config_dir().join("server.xml")
    }

    pub fn bootstrap_properties(&self) -> PathBuf {
        self.config_dir().join("bootstrap.properties")
    }

    pub fn server_env(&self) -> PathBuf {
        self.config_dir().join("server.env")
    }

    pub fn default_dropins_dir(&self) -> PathBuf {
        self.config_dir().join(DEFAULT_DROPINS_DIR)
    }

    pub fn override_dropins_dir(&self) -> PathBuf {
        self.config_dir().join(OVERRIDE_DROPINS_DIR)
    }

    /// Populate the predefined variables into a store, typed as locations
    pub fn populate_predefined(&self, store: &mut VariableStore) {
        let mut put = |name: &str, value: PathBuf| {
            store.add_resolved(
                name,
                value.to_string_lossy().into_owned(),
                Some(VariableType::Location),
                Some(DocumentLocation::new(name)),
            );
        };
        if let Some(install) = &self.install_dir {
            put(WLP_INSTALL_DIR, install.clone());
        }
        put(WLP_USER_DIR, self.user_dir.path().to_path_buf());
        put(SHARED_APP_DIR, self.user_dir.shared_app_dir());
        put(SHARED_CONFIG_DIR, self.user_dir.shared_config_dir());
        put(SHARED_RESOURCE_DIR, self.user_dir.shared_resource_dir());
        put(SERVER_CONFIG_DIR, self.config_dir());
        put(SERVER_OUTPUT_DIR, self.output_dir());
        put(USR_EXTENSION_DIR, self.user_dir.extension_dir());
        store.add_resolved(
            WLP_SERVER_NAME,
            self.server_name.clone(),
            Some(VariableType::String),
            Some(DocumentLocation::new(WLP_SERVER_NAME)),
        );
    }
}

/// Whether a path is a server's configuration root:
/// `.../servers/<name>/server.xml`
pub fn is_config_root(path: &Path) -> bool {
    if path.file_name().and_then(|n| n.to_str()) != Some("server.xml") {
        return false;
    }
    path.parent()
        .and_then(Path::parent)
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        == Some("servers")
}

/// Resolve an include `location` attribute to a file on disk.
///
/// Variable references are expanded against `vars` first when present. The
/// location is then tried as an absolute path, relative to the including
/// document's directory, and relative to the shared config directory of the
/// layout. Remote URLs are not fetched; `None` means "not on disk (yet)".
pub fn resolve_location(
    raw: &str,
    base_dir: &Path,
    layout: Option<&ServerLayout>,
    vars: Option<&dyn VariableLookup>,
) -> Option<PathBuf> {
    let expanded = match vars {
        Some(store) if crate::variables::contains_reference(raw) => {
            resolve(store, raw, None).into_text()
        }
        _ => raw.to_string(),
    };
    if crate::variables::contains_reference(&expanded) {
        // Still unresolved references, cannot point at a file
        return None;
    }

    let trimmed = expanded.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return None;
    }
    let trimmed = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix("file:").unwrap_or(trimmed);

    let candidate = Path::new(trimmed);
    if candidate.is_absolute() {
        return candidate.exists().then(|| candidate.to_path_buf());
    }
    let relative = base_dir.join(candidate);
    if relative.exists() {
        return Some(relative);
    }
    if let Some(layout) = layout {
        let shared = layout.user_dir.shared_config_dir().join(candidate);
        if shared.exists() {
            return Some(shared);
        }
    }
    None
}
