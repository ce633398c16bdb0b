//! Manifest rewrite with backup
//!
//! Disabling rewrites the `dependencies` list of the bundle manifest. The
//! manifest as found before the first rewrite is kept verbatim in
//! `.storage/default_config_disabler.manifest_backup`; every later rewrite
//! starts from that backup, and [`ManifestPatcher::restore`] writes it back
//! byte for byte.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dcd_host::{HomeAssistant, Storable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{manifest_path, BundleManifest, ComponentName, DisabledSet};
use crate::error::{DisablerError, DisablerResult};

/// Snapshot of the manifest before it was first rewritten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestBackup {
    /// Manifest the snapshot was taken from
    pub path: PathBuf,
    /// Raw manifest text
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Storable for ManifestBackup {
    const KEY: &'static str = "default_config_disabler.manifest_backup";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

impl ManifestBackup {
    fn new(path: PathBuf, content: String) -> Self {
        Self {
            path,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Rewrites the bundle manifest's dependency list
#[derive(Debug, Clone)]
pub struct ManifestPatcher {
    bundle_dir: PathBuf,
}

impl ManifestPatcher {
    pub fn new(bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.bundle_dir)
    }

    /// Drop `exclusions` from the pristine dependency list
    ///
    /// Returns true if the manifest on disk was rewritten. Names that are not
    /// in the manifest are ignored. An unparsable manifest is left alone and
    /// reported as unchanged. The backup is only stored right before the first
    /// rewrite, so its presence means the manifest on disk is rewritten.
    pub async fn apply(&self, hass: &HomeAssistant, exclusions: &DisabledSet) -> DisablerResult<bool> {
        let path = self.manifest_path();
        let current_text = read_file(hass, &path).await?;

        let stored = hass.storage().load::<ManifestBackup>().await?;
        let fresh = stored.is_none();
        let backup =
            stored.unwrap_or_else(|| ManifestBackup::new(path.clone(), current_text.clone()));

        let pristine = match BundleManifest::parse(&backup.path, &backup.content) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Not rewriting default_config manifest: {}", e);
                return Ok(false);
            }
        };
        let desired: Vec<ComponentName> = pristine
            .dependencies()
            .into_iter()
            .filter(|name| !exclusions.contains(name))
            .collect();

        let mut current = match BundleManifest::parse(&path, &current_text) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Not rewriting default_config manifest: {}", e);
                return Ok(false);
            }
        };

        if current.dependencies() == desired {
            debug!("Manifest dependencies already match: {:?}", desired);
            return Ok(false);
        }

        if fresh {
            hass.storage().save(&backup).await?;
            debug!("Created manifest backup of {:?}", backup.path);
        }

        current.set_dependencies(&desired);
        let content = current.to_json_pretty().map_err(|e| DisablerError::Write {
            path: path.clone(),
            source: e.into(),
        })?;
        write_file(hass, &path, content).await?;

        info!("Rewrote default_config dependencies: {:?}", desired);
        Ok(true)
    }

    /// Put the original manifest back and drop the backup
    ///
    /// Returns false, touching nothing, when there is no backup.
    pub async fn restore(&self, hass: &HomeAssistant) -> DisablerResult<bool> {
        let Some(backup) = hass.storage().load::<ManifestBackup>().await? else {
            debug!("No manifest backup, nothing to restore");
            return Ok(false);
        };

        write_file(hass, &backup.path, backup.content.clone()).await?;
        hass.storage().delete(ManifestBackup::KEY).await?;

        info!("Restored original default_config manifest at {:?}", backup.path);
        Ok(true)
    }

    /// Whether the manifest is currently rewritten
    pub async fn is_applied(&self, hass: &HomeAssistant) -> DisablerResult<bool> {
        Ok(hass.storage().exists(ManifestBackup::KEY).await)
    }
}

async fn read_file(hass: &HomeAssistant, path: &Path) -> DisablerResult<String> {
    let path = path.to_path_buf();
    hass.add_executor_job(move || {
        fs::read_to_string(&path).map_err(|e| DisablerError::read(path.clone(), e))
    })
    .await?
}

async fn write_file(hass: &HomeAssistant, path: &Path, content: String) -> DisablerResult<()> {
    let path = path.to_path_buf();
    hass.add_executor_job(move || {
        fs::write(&path, content).map_err(|source| DisablerError::Write {
            path: path.clone(),
            source,
        })
    })
    .await?
}
