//! `configuration.yaml` toggle
//!
//! Disables the bundle by commenting out its `default_config:` line and
//! enables it by uncommenting. The file is patched as text so the rest of
//! it (comments, tags, formatting) is left alone.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DisablerError, DisablerResult};

/// Line that loads the bundle
pub const ENABLED_SENTINEL: &str = "\ndefault_config:\n";

/// The same line commented out
pub const DISABLED_SENTINEL: &str = "\n# default_config:\n";

/// Whether the bundle line is live or commented out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Enabled,
    Disabled,
}

impl BundleState {
    fn sentinel(self) -> &'static str {
        match self {
            BundleState::Enabled => ENABLED_SENTINEL,
            BundleState::Disabled => DISABLED_SENTINEL,
        }
    }

    fn opposite(self) -> Self {
        match self {
            BundleState::Enabled => BundleState::Disabled,
            BundleState::Disabled => BundleState::Enabled,
        }
    }
}

/// Replace every whole-line occurrence of `from` by `to`
///
/// Sentinels start and end with a newline, so the text is matched as if it
/// were surrounded by newlines; those virtual newlines are not part of the
/// result. Returns `None` when `from` does not occur.
pub fn swap_sentinel(content: &str, from: &str, to: &str) -> Option<String> {
    let lead = !content.starts_with('\n');
    let trail = !content.ends_with('\n');

    let mut padded = String::with_capacity(content.len() + 2);
    if lead {
        padded.push('\n');
    }
    padded.push_str(content);
    if trail {
        padded.push('\n');
    }

    if !padded.contains(from) {
        return None;
    }

    let mut replaced = padded.replace(from, to);
    if trail {
        replaced.pop();
    }
    if lead {
        replaced.remove(0);
    }
    Some(replaced)
}

/// State of the bundle line in `content`, if present in either form
pub fn bundle_state(content: &str) -> Option<BundleState> {
    let padded = format!("\n{}\n", content);
    if padded.contains(ENABLED_SENTINEL) {
        Some(BundleState::Enabled)
    } else if padded.contains(DISABLED_SENTINEL) {
        Some(BundleState::Disabled)
    } else {
        None
    }
}

/// Toggles the bundle line of one configuration file
#[derive(Debug, Clone)]
pub struct ConfigToggle {
    config_path: PathBuf,
}

impl ConfigToggle {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Comment out the bundle line; true if the file changed
    pub fn disable(&self) -> DisablerResult<bool> {
        self.set(BundleState::Disabled)
    }

    /// Uncomment the bundle line; true if the file changed
    pub fn enable(&self) -> DisablerResult<bool> {
        self.set(BundleState::Enabled)
    }

    /// Current state of the bundle line
    pub fn state(&self) -> DisablerResult<Option<BundleState>> {
        Ok(bundle_state(&self.read()?))
    }

    fn set(&self, target: BundleState) -> DisablerResult<bool> {
        let content = self.read()?;

        let from = target.opposite().sentinel();
        let Some(patched) = swap_sentinel(&content, from, target.sentinel()) else {
            debug!(
                "No {:?} default_config line in {:?}, leaving it as is",
                target.opposite(),
                self.config_path
            );
            return Ok(false);
        };

        fs::write(&self.config_path, patched).map_err(|source| DisablerError::Write {
            path: self.config_path.clone(),
            source,
        })?;
        Ok(true)
    }

    fn read(&self) -> DisablerResult<String> {
        fs::read_to_string(&self.config_path)
            .map_err(|e| DisablerError::read(&self.config_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const CONFIG: &str = "homeassistant:\n  name: Home\n\ndefault_config:\n\nhttp:\n  server_port: 8123\n";

    fn toggle_with(content: &str) -> (TempDir, ConfigToggle) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("configuration.yaml");
        fs::write(&path, content).unwrap();
        (dir, ConfigToggle::new(path))
    }

    fn read(toggle: &ConfigToggle) -> String {
        fs::read_to_string(toggle.config_path()).unwrap()
    }

    #[test]
    fn test_disable_comments_out_line() {
        let (_dir, toggle) = toggle_with(CONFIG);

        assert!(toggle.disable().unwrap());
        assert_eq!(
            read(&toggle),
            "homeassistant:\n  name: Home\n\n# default_config:\n\nhttp:\n  server_port: 8123\n"
        );
        assert_eq!(toggle.state().unwrap(), Some(BundleState::Disabled));
    }

    #[test]
    fn test_disable_twice_writes_once() {
        let (_dir, toggle) = toggle_with(CONFIG);

        assert!(toggle.disable().unwrap());
        let after_first = read(&toggle);

        // Backdate the file so any rewrite would move its mtime forward
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        fs::File::options()
            .write(true)
            .open(toggle.config_path())
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert!(!toggle.disable().unwrap());
        assert_eq!(read(&toggle), after_first);
        let modified = fs::metadata(toggle.config_path()).unwrap().modified().unwrap();
        assert_eq!(modified, past);
    }

    #[test]
    fn test_enable_inverts_disable() {
        for content in [
            CONFIG,
            "default_config:\nhttp:\n",
            "http:\ndefault_config:",
            "default_config:",
        ] {
            let (_dir, toggle) = toggle_with(content);
            assert!(toggle.disable().unwrap(), "{:?}", content);
            assert!(toggle.enable().unwrap(), "{:?}", content);
            assert_eq!(read(&toggle), content);
        }
    }

    #[test]
    fn test_enable_also_uncomments_preexisting_line() {
        let content = "# default_config:\nhttp:\ndefault_config:\n";
        let (_dir, toggle) = toggle_with(content);

        assert!(toggle.disable().unwrap());
        assert_eq!(read(&toggle), "# default_config:\nhttp:\n# default_config:\n");

        // Both lines are indistinguishable once disabled
        assert!(toggle.enable().unwrap());
        assert_eq!(read(&toggle), "default_config:\nhttp:\ndefault_config:\n");
        assert_ne!(read(&toggle), content);
    }

    #[test]
    fn test_line_at_start_of_file() {
        let (_dir, toggle) = toggle_with("default_config:\nhttp:\n");

        assert!(toggle.disable().unwrap());
        assert_eq!(read(&toggle), "# default_config:\nhttp:\n");
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let patched = swap_sentinel(
            "default_config:\nhttp:\ndefault_config:\n",
            ENABLED_SENTINEL,
            DISABLED_SENTINEL,
        );
        assert_eq!(
            patched.as_deref(),
            Some("# default_config:\nhttp:\n# default_config:\n")
        );
    }

    #[test]
    fn test_partial_line_not_matched() {
        let (_dir, toggle) = toggle_with("my_default_config:\ndefault_config: !include dc.yaml\n");

        assert!(!toggle.disable().unwrap());
        assert!(!toggle.enable().unwrap());
        assert_eq!(toggle.state().unwrap(), None);
    }

    #[test]
    fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let toggle = ConfigToggle::new(dir.path().join("configuration.yaml"));

        assert!(matches!(toggle.disable(), Err(DisablerError::NotFound { .. })));
    }
}
