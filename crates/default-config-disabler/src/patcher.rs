//! The two ways of suppressing bundle components behind one interface

use std::path::PathBuf;

use async_trait::async_trait;
use dcd_config::{DisablerSettings, PatchMode};
use dcd_host::{HomeAssistant, YAML_CONFIG_FILE};

use crate::catalog::DisabledSet;
use crate::error::DisablerResult;
use crate::manifest_patch::ManifestPatcher;
use crate::toggle::ConfigToggle;

/// Mutates files on disk so the bundle loads fewer components
///
/// Both operations return true when something on disk changed, which means
/// a restart is needed for the change to take effect.
#[async_trait]
pub trait Patcher: Send + Sync {
    fn mode(&self) -> PatchMode;

    /// Stop the bundle from loading `disabled`
    async fn suppress(&self, hass: &HomeAssistant, disabled: &DisabledSet) -> DisablerResult<bool>;

    /// Undo [`suppress`](Patcher::suppress)
    async fn release(&self, hass: &HomeAssistant) -> DisablerResult<bool>;
}

/// Build the patcher selected by the settings
pub fn patcher_for(settings: &DisablerSettings) -> Box<dyn Patcher> {
    match settings.patch_mode {
        PatchMode::ConfigFile => Box::new(ConfigFilePatcher),
        PatchMode::Manifest => Box::new(ManifestPatcher::new(settings.bundle_dir())),
    }
}

/// Comments out the whole bundle in `configuration.yaml`
///
/// Individual components are then set up by the integration's global setup,
/// so the disabled set is not needed here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigFilePatcher;

impl ConfigFilePatcher {
    fn toggle(hass: &HomeAssistant) -> ConfigToggle {
        ConfigToggle::new(config_file_path(hass))
    }
}

#[async_trait]
impl Patcher for ConfigFilePatcher {
    fn mode(&self) -> PatchMode {
        PatchMode::ConfigFile
    }

    async fn suppress(&self, hass: &HomeAssistant, _disabled: &DisabledSet) -> DisablerResult<bool> {
        let toggle = Self::toggle(hass);
        hass.add_executor_job(move || toggle.disable()).await?
    }

    async fn release(&self, hass: &HomeAssistant) -> DisablerResult<bool> {
        let toggle = Self::toggle(hass);
        hass.add_executor_job(move || toggle.enable()).await?
    }
}

#[async_trait]
impl Patcher for ManifestPatcher {
    fn mode(&self) -> PatchMode {
        PatchMode::Manifest
    }

    async fn suppress(&self, hass: &HomeAssistant, disabled: &DisabledSet) -> DisablerResult<bool> {
        self.apply(hass, disabled).await
    }

    async fn release(&self, hass: &HomeAssistant) -> DisablerResult<bool> {
        self.restore(hass).await
    }
}

/// Path of the configuration file a [`ConfigFilePatcher`] edits
pub fn config_file_path(hass: &HomeAssistant) -> PathBuf {
    hass.config_path(YAML_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentName;
    use dcd_host::RecordingComponentSetup;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_file_patcher_round_trip() {
        let config = TempDir::new().unwrap();
        let hass = HomeAssistant::new(config.path(), Arc::new(RecordingComponentSetup::new()));
        let path = config_file_path(&hass);
        fs::write(&path, "default_config:\nhttp:\n").unwrap();

        let settings = DisablerSettings::new("/nonexistent").with_patch_mode(PatchMode::ConfigFile);
        let patcher = patcher_for(&settings);
        assert_eq!(patcher.mode(), PatchMode::ConfigFile);

        let disabled: DisabledSet = [ComponentName::from("stream")].into_iter().collect();
        assert!(patcher.suppress(&hass, &disabled).await.unwrap());
        assert!(!patcher.suppress(&hass, &disabled).await.unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "# default_config:\nhttp:\n");

        assert!(patcher.release(&hass).await.unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "default_config:\nhttp:\n");
    }

    #[test]
    fn test_manifest_is_default() {
        let patcher = patcher_for(&DisablerSettings::new("/srv/components"));
        assert_eq!(patcher.mode(), PatchMode::Manifest);
    }
}
