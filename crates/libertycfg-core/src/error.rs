//! Error types for configuration loading and resolution

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// XML parse errors from quick-xml or malformed markup
    #[error("Parse error in '{path}': {message} at line {line}, column {col}")]
    Parse {
        path: PathBuf,
        message: String,
        line: u32,
        col: u32,
    },

    /// The document has no usable root element
    #[error("Missing root <server> element in '{path}'")]
    MissingRoot { path: PathBuf },

    /// bootstrap.properties / server.env reading errors
    #[error("Properties error in '{path}': {message}")]
    Properties { path: PathBuf, message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    Properties,
    Internal,
}

impl ConfigError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Io { .. } => ErrorKind::Io,
            ConfigError::Parse { .. } => ErrorKind::Parse,
            ConfigError::MissingRoot { .. } => ErrorKind::Io,
            ConfigError::Properties { .. } => ErrorKind::Properties,
            ConfigError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable (can continue processing other documents)
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Parse)
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a parse error with source coordinates
    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>, line: u32, col: u32) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line,
            col,
        }
    }

    /// Create a properties error
    pub fn properties_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Properties {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}
