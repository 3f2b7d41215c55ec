use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Module not found: '{uri}' (from {from})")]
    NotFound { uri: String, from: String },

    #[error("Invalid module URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Failed to load module '{uri}': {message}")]
    Load { uri: String, message: String },
}

impl GraphError {
    pub fn not_found(uri: impl Into<String>, from: impl std::fmt::Display) -> Self {
        GraphError::NotFound {
            uri: uri.into(),
            from: from.to_string(),
        }
    }

    pub fn invalid(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        GraphError::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed dependency manifest {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported dependency manifest schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Invalid package URI '{uri}': {reason}")]
    InvalidPackage { uri: String, reason: String },
}
