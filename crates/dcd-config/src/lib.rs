//! Configuration for the default config disabler
//!
//! - [`load_configuration`] reads `configuration.yaml` with `!include`,
//!   `!secret` and `!env_var` resolved
//! - [`DisablerSettings`] selects the [`PatchMode`] and where the bundle
//!   manifest lives
//!
//! # Example
//!
//! ```ignore
//! use dcd_config::{has_top_level_key, load_configuration, DisablerSettings};
//!
//! let config = load_configuration("/config")?;
//! let bundle_active = has_top_level_key(&config, "default_config");
//! let settings = DisablerSettings::discover()?;
//! ```

mod error;
mod loader;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    has_top_level_key, load_configuration, load_yaml, YamlLoader, CONFIGURATION_FILE,
    SECRETS_FILE,
};
pub use settings::{find_components_dir, DisablerSettings, PatchMode, BUNDLE_DIR_NAME};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
