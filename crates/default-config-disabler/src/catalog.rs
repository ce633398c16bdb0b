//! Component catalog
//!
//! The catalog is the `dependencies` list of the bundle manifest
//! (`<components_dir>/default_config/manifest.json`), in manifest order. It is
//! re-read from disk every time it is needed.

use std::borrow::Borrow;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use dcd_host::{ConfigEntry, HomeAssistant};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::consts::{CONF_COMPONENTS_TO_DISABLE, MANIFEST_FILE};
use crate::error::{DisablerError, DisablerResult};
use crate::manifest_patch::ManifestBackup;

/// Domain of a component listed in the bundle manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentName(String);

impl ComponentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ComponentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ComponentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ComponentName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Components the user asked to disable, in the order they were given
pub type DisabledSet = IndexSet<ComponentName>;

/// Components to disable according to a config entry's options
pub fn disabled_components(entry: &ConfigEntry) -> DisabledSet {
    entry
        .option::<Vec<ComponentName>>(CONF_COMPONENTS_TO_DISABLE)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

/// The bundle manifest as a JSON object with its field order kept
#[derive(Debug, Clone, PartialEq)]
pub struct BundleManifest {
    fields: Map<String, Value>,
}

impl BundleManifest {
    /// Parse manifest text; anything but a JSON object is an error
    pub fn parse(path: &Path, content: &str) -> DisablerResult<Self> {
        let fields = serde_json::from_str(content).map_err(|source| DisablerError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { fields })
    }

    /// The dependency list, skipping anything that is not a string
    pub fn dependencies(&self) -> Vec<ComponentName> {
        let Some(value) = self.fields.get("dependencies") else {
            warn!("Manifest of default_config has no dependencies");
            return Vec::new();
        };
        let Some(items) = value.as_array() else {
            warn!("Manifest dependencies is not a list: {}", value);
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| match item.as_str() {
                Some(name) => Some(ComponentName::from(name)),
                None => {
                    warn!("Skipping non-string manifest dependency: {}", item);
                    None
                }
            })
            .collect()
    }

    /// Replace the dependency list, keeping the field in place
    pub fn set_dependencies(&mut self, dependencies: &[ComponentName]) {
        let list = dependencies
            .iter()
            .map(|name| Value::String(name.to_string()))
            .collect();
        self.fields
            .insert("dependencies".to_string(), Value::Array(list));
    }

    /// Pretty JSON with two-space indentation and a trailing newline
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut out = serde_json::to_string_pretty(&self.fields)?;
        out.push('\n');
        Ok(out)
    }
}

/// Path of the manifest inside a bundle directory
pub fn manifest_path(bundle_dir: &Path) -> PathBuf {
    bundle_dir.join(MANIFEST_FILE)
}

/// Components listed in manifest text, empty if the text does not parse
pub fn components_from_str(path: &Path, content: &str) -> Vec<ComponentName> {
    match BundleManifest::parse(path, content) {
        Ok(manifest) => manifest.dependencies(),
        Err(e) => {
            warn!("Ignoring unreadable manifest: {}", e);
            Vec::new()
        }
    }
}

/// Read the component catalog from disk
///
/// A missing manifest is an error; a malformed one yields an empty catalog.
pub fn read_components(bundle_dir: &Path) -> DisablerResult<Vec<ComponentName>> {
    let path = manifest_path(bundle_dir);
    let content = fs::read_to_string(&path).map_err(|e| DisablerError::read(&path, e))?;
    Ok(components_from_str(&path, &content))
}

/// The catalog as shipped, ignoring our own rewrite of the manifest
///
/// While a manifest backup exists the on-disk manifest is missing the
/// disabled components, so the backup is read instead.
pub async fn pristine_components(
    hass: &HomeAssistant,
    bundle_dir: &Path,
) -> DisablerResult<Vec<ComponentName>> {
    if let Some(backup) = hass.storage().load::<ManifestBackup>().await? {
        debug!("Reading catalog from manifest backup of {:?}", backup.path);
        return Ok(components_from_str(&backup.path, &backup.content));
    }

    let bundle_dir = bundle_dir.to_path_buf();
    hass.add_executor_job(move || read_components(&bundle_dir))
        .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"{
  "domain": "default_config",
  "name": "Default Config",
  "dependencies": ["stream", "backup", "zeroconf"],
  "codeowners": ["@home-assistant/core"],
  "quality_scale": "internal"
}
"#;

    fn bundle_with(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), content).unwrap();
        dir
    }

    fn names(list: &[&str]) -> Vec<ComponentName> {
        list.iter().copied().map(ComponentName::from).collect()
    }

    #[test]
    fn test_read_components_in_manifest_order() {
        let dir = bundle_with(MANIFEST);
        let components = read_components(dir.path()).unwrap();
        assert_eq!(components, names(&["stream", "backup", "zeroconf"]));
    }

    #[test]
    fn test_missing_manifest_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = read_components(dir.path());
        assert!(matches!(result, Err(DisablerError::NotFound { .. })));
    }

    #[test]
    fn test_malformed_manifest_yields_empty_catalog() {
        for content in [
            "not json",
            "[\"stream\"]",
            "{\"domain\": \"default_config\"}",
            "{\"dependencies\": \"stream\"}",
        ] {
            let dir = bundle_with(content);
            assert!(read_components(dir.path()).unwrap().is_empty(), "{}", content);
        }
    }

    #[test]
    fn test_non_string_dependencies_skipped() {
        let dir = bundle_with(r#"{"dependencies": ["stream", 42, null, "zeroconf"]}"#);
        let components = read_components(dir.path()).unwrap();
        assert_eq!(components, names(&["stream", "zeroconf"]));
    }

    #[test]
    fn test_set_dependencies_keeps_field_order() {
        let mut manifest = BundleManifest::parse(Path::new("manifest.json"), MANIFEST).unwrap();
        manifest.set_dependencies(&names(&["zeroconf"]));

        let out = manifest.to_json_pretty().unwrap();
        let keys: Vec<String> = serde_json::from_str::<Map<String, Value>>(&out)
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(
            keys,
            ["domain", "name", "dependencies", "codeowners", "quality_scale"]
        );
        assert!(out.contains("  \"dependencies\": [\n    \"zeroconf\"\n  ],"));
        assert!(out.ends_with("}\n"));
    }

    #[test]
    fn test_disabled_components_from_options() {
        let mut options = std::collections::HashMap::new();
        options.insert(
            CONF_COMPONENTS_TO_DISABLE.to_string(),
            serde_json::json!(["stream", "backup", "stream"]),
        );
        let entry = ConfigEntry::new("default_config_disabler", "Default Config Disabler")
            .with_options(options);

        let disabled = disabled_components(&entry);
        assert_eq!(disabled.len(), 2);
        assert!(disabled.contains("stream"));
        assert_eq!(disabled.get_index(1).map(|c| c.as_str()), Some("backup"));

        let empty = ConfigEntry::new("default_config_disabler", "Default Config Disabler");
        assert!(disabled_components(&empty).is_empty());
    }
}
