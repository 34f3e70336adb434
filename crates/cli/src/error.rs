//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration or manifest file not found
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Manifest parsing error
    #[error("Failed to parse manifest {}: {message}", path.display())]
    ManifestParse { path: PathBuf, message: String },

    /// Manifest refers to something it does not define
    #[error("Invalid manifest: {message}")]
    ManifestInvalid { message: String },

    /// Record commands need the file-backed job store
    #[error("No job record directory: set jobs.store_dir in the configuration or pass --store-dir")]
    StoreNotConfigured,

    /// Argument that clap cannot check on its own
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },
}

impl CliError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn manifest_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ManifestParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn manifest_invalid(message: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            message: message.into(),
        }
    }

    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }
}
