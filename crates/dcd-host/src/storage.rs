//! Storage abstraction for JSON persistence
//!
//! Implements the Home Assistant `.storage/` directory pattern with versioning.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Migration required for {key}: from {from} to {to}")]
    MigrationRequired { key: String, from: u32, to: u32 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage file wrapper with version tracking
///
/// JSON format:
/// ```json
/// {
///   "version": 1,
///   "minor_version": 1,
///   "key": "core.config_entries",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version - breaking changes
    pub version: u32,
    /// Minor version - migrations within major version
    pub minor_version: u32,
    /// Storage key (file identifier)
    pub key: String,
    /// The actual data
    pub data: T,
}

impl<T> StorageFile<T> {
    /// Create a new storage file
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Types persisted under a fixed storage key
pub trait Storable: Serialize + DeserializeOwned {
    /// Storage key for this type
    const KEY: &'static str;
    /// Current major version
    const VERSION: u32;
    /// Current minor version
    const MINOR_VERSION: u32;
}

/// Storage manager for handling `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    /// Path to the `.storage/` directory
    storage_dir: PathBuf,
}

impl Storage {
    /// Create a new storage manager
    ///
    /// # Arguments
    /// * `config_dir` - Path to the Home Assistant config directory
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the file path for a storage key
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    /// Check if a storage key exists
    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.file_path(key)).await.unwrap_or(false)
    }

    /// Load a [`Storable`] value
    ///
    /// Returns None if the file doesn't exist. A file written by a newer major
    /// version is refused rather than misread.
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<T>> {
        let path = self.file_path(T::KEY);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Storage file not found: {}", T::KEY);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let storage_file: StorageFile<T> = serde_json::from_str(&content)?;

        if storage_file.version != T::VERSION {
            return Err(StorageError::MigrationRequired {
                key: T::KEY.to_string(),
                from: storage_file.version,
                to: T::VERSION,
            });
        }
        if storage_file.minor_version < T::MINOR_VERSION {
            warn!(
                "Storage {} has older minor version ({} < {})",
                T::KEY,
                storage_file.minor_version,
                T::MINOR_VERSION
            );
        }

        debug!(
            "Loaded storage file: {} (v{}.{})",
            T::KEY,
            storage_file.version,
            storage_file.minor_version
        );
        Ok(Some(storage_file.data))
    }

    /// Save a [`Storable`] value
    ///
    /// Writes atomically by first writing to a temp file, then renaming.
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        fs::create_dir_all(&self.storage_dir).await?;

        let path = self.file_path(T::KEY);
        let temp_path = self.file_path(&format!("{}.tmp", T::KEY));

        let storage_file = StorageFile::new(T::KEY, data, T::VERSION, T::MINOR_VERSION);
        let content = serde_json::to_string_pretty(&storage_file)?;

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(
            "Saved storage file: {} (v{}.{})",
            T::KEY,
            T::VERSION,
            T::MINOR_VERSION
        );
        Ok(())
    }

    /// Delete a storage file, returning whether it existed
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => {
                debug!("Deleted storage file: {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
