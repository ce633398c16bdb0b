//! Error types for the disabler

use std::path::PathBuf;

use dcd_host::{HostError, ServiceError, StorageError};
use thiserror::Error;

/// Result type for disabler operations
pub type DisablerResult<T> = Result<T, DisablerError>;

/// Errors raised while reading or patching the bundle
#[derive(Debug, Error)]
pub enum DisablerError {
    /// The file to read does not exist
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not a JSON object
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl DisablerError {
    /// Map an I/O error from reading `path`
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            DisablerError::NotFound { path }
        } else {
            DisablerError::Read { path, source }
        }
    }
}
