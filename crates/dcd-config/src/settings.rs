//! Plugin settings

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Directory name of the default bundle inside the components directory
pub const BUNDLE_DIR_NAME: &str = "default_config";

/// How components of the default bundle are suppressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    /// Comment out the bundle line in `configuration.yaml`
    ConfigFile,
    /// Rewrite the bundle manifest's dependency list
    #[default]
    Manifest,
}

impl fmt::Display for PatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchMode::ConfigFile => write!(f, "config_file"),
            PatchMode::Manifest => write!(f, "manifest"),
        }
    }
}

impl FromStr for PatchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config_file" => Ok(PatchMode::ConfigFile),
            "manifest" => Ok(PatchMode::Manifest),
            other => Err(ConfigError::InvalidValue {
                key: "patch_mode".to_string(),
                reason: format!("unknown mode '{}'", other),
            }),
        }
    }
}

/// Settings of the disabler integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisablerSettings {
    #[serde(default)]
    pub patch_mode: PatchMode,
    /// Directory holding the integrations, `default_config/` among them
    pub components_dir: PathBuf,
}

impl DisablerSettings {
    pub fn new(components_dir: impl Into<PathBuf>) -> Self {
        Self {
            patch_mode: PatchMode::default(),
            components_dir: components_dir.into(),
        }
    }

    pub fn with_patch_mode(mut self, patch_mode: PatchMode) -> Self {
        self.patch_mode = patch_mode;
        self
    }

    /// Settings with a discovered components directory
    pub fn discover() -> ConfigResult<Self> {
        find_components_dir()
            .map(Self::new)
            .ok_or(ConfigError::ComponentsDirNotFound)
    }

    /// Directory of the default bundle
    pub fn bundle_dir(&self) -> PathBuf {
        self.components_dir.join(BUNDLE_DIR_NAME)
    }
}

/// Locate the host's components directory
///
/// Checks `HA_CORE_PATH` first, then `vendor/ha-core` relative to the
/// current directory.
pub fn find_components_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HA_CORE_PATH") {
        let components = components_dir_of(Path::new(&path));
        if components.is_dir() {
            return Some(components);
        }
        debug!("HA_CORE_PATH set but {:?} is not a directory", components);
    }

    let dev_path = components_dir_of(Path::new("vendor/ha-core"));
    if dev_path.is_dir() {
        return Some(dev_path);
    }

    None
}

fn components_dir_of(core: &Path) -> PathBuf {
    core.join("homeassistant").join("components")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_patch_mode_defaults_to_manifest() {
        let settings: DisablerSettings =
            serde_yaml::from_str("components_dir: /srv/ha/homeassistant/components\n").unwrap();

        assert_eq!(settings.patch_mode, PatchMode::Manifest);
        assert_eq!(
            settings.bundle_dir(),
            PathBuf::from("/srv/ha/homeassistant/components/default_config")
        );
    }

    #[test]
    fn test_patch_mode_parsing() {
        assert_eq!("config_file".parse::<PatchMode>().unwrap(), PatchMode::ConfigFile);
        assert_eq!("manifest".parse::<PatchMode>().unwrap(), PatchMode::Manifest);
        assert!("yaml".parse::<PatchMode>().is_err());
        assert_eq!(PatchMode::ConfigFile.to_string(), "config_file");

        let settings: DisablerSettings =
            serde_yaml::from_str("patch_mode: config_file\ncomponents_dir: /tmp\n").unwrap();
        assert_eq!(settings.patch_mode, PatchMode::ConfigFile);
    }

    #[test]
    fn test_find_components_dir_from_env() {
        let core = TempDir::new().unwrap();
        let components = core.path().join("homeassistant/components");
        std::fs::create_dir_all(&components).unwrap();

        std::env::set_var("HA_CORE_PATH", core.path());
        let found = find_components_dir();
        std::env::remove_var("HA_CORE_PATH");

        assert_eq!(found, Some(components));
    }
}
