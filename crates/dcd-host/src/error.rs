//! Host error type

use thiserror::Error;

use crate::config_entries::ConfigEntriesError;
use crate::flows::FlowError;
use crate::service::ServiceError;
use crate::storage::StorageError;

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// Errors raised by the host while driving an integration
#[derive(Debug, Error)]
pub enum HostError {
    /// A blocking job offloaded to the executor panicked or was cancelled
    #[error("executor job failed: {0}")]
    Executor(#[from] tokio::task::JoinError),

    #[error("integration not found: {0}")]
    IntegrationNotFound(String),

    /// An integration's setup handler failed or returned false
    #[error("setup of {domain} failed: {reason}")]
    SetupFailed { domain: String, reason: String },

    /// An integration's unload handler failed or returned false
    #[error("unload of {domain} failed: {reason}")]
    UnloadFailed { domain: String, reason: String },

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
