//! Default Config Disabler
//!
//! Home Assistant's `default_config` bundle loads a fixed list of
//! integrations. This integration lets the user drop some of them, either by
//! commenting out the bundle in `configuration.yaml` and setting up the rest
//! itself ([`PatchMode::ConfigFile`](dcd_config::PatchMode)), or by rewriting
//! the bundle manifest's dependency list
//! ([`PatchMode::Manifest`](dcd_config::PatchMode), the default).
//!
//! # Example
//!
//! ```ignore
//! use dcd_config::DisablerSettings;
//!
//! let settings = DisablerSettings::discover()?;
//! hass.register_integration(default_config_disabler::integration(settings));
//! ```

pub mod catalog;
pub mod consts;
mod error;
pub mod flow;
pub mod lifecycle;
pub mod manifest_patch;
pub mod patcher;
mod registration;
pub mod repairs;
pub mod toggle;

pub use catalog::{
    pristine_components, read_components, BundleManifest, ComponentName, DisabledSet,
};
pub use consts::*;
pub use error::{DisablerError, DisablerResult};
pub use lifecycle::{disabled_union, Disabler};
pub use manifest_patch::{ManifestBackup, ManifestPatcher};
pub use patcher::{patcher_for, ConfigFilePatcher, Patcher};
pub use registration::{integration, integration_for};
pub use toggle::{BundleState, ConfigToggle};
