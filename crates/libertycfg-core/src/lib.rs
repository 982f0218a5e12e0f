//! libertycfg core
//!
//! Configuration resolution engine for Liberty-style server configuration
//! trees. This crate provides the fundamental components for parsing,
//! merging, and resolving server configuration: the XML document model,
//! the variable store and `${...}` resolver, include and dropin traversal,
//! and the identity-based merge engine.

pub mod bootstrap;
pub mod document;
pub mod error;
pub mod merge;
pub mod password;
pub mod registry;
pub mod result;
pub mod server;
pub mod variables;
pub mod xml;

// Re-export commonly used types
pub use document::{ConfigDocument, IncludeEntry};
pub use error::{ConfigError, ErrorKind};
pub use merge::{MergeEngine, OnConflict, collect_variables, flatten, merge_element};
pub use password::{PasswordState, validate_password};
pub use registry::{DocumentRegistry, SharedDocument};
pub use result::{Result, ResultExt};
pub use server::ServerLayout;
pub use variables::{
    DocumentLocation, LocalStore, OperandError, Resolution, UndefinedRef, VariableLookup,
    VariableStore, VariableType,
};
pub use xml::{SourcePos, XmlElement, XmlNode};

/// Initialize the tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("libertycfg_core=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
