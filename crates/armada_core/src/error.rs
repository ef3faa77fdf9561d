//! Error types for the core module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Contributor not found: {0}")]
    ContributorNotFound(String),

    #[error("Contributor {contributor} failed: {message}")]
    ContributionFailed { contributor: String, message: String },

    #[error("Invalid plugin manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("Secret could not be decrypted for {plugin}.{key}: {message}")]
    Decryption {
        plugin: String,
        key: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
