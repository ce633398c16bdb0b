//! Constants for the Default Config Disabler integration

/// Integration domain
pub const DOMAIN: &str = "default_config_disabler";

/// Title of the config entry
pub const TITLE: &str = "Default Config Disabler";

/// Domain of the bundle being patched
pub const DEFAULT_CONFIG_DOMAIN: &str = "default_config";

/// Option holding the components to disable
pub const CONF_COMPONENTS_TO_DISABLE: &str = "components_to_disable";

/// Issue raised when a restart is needed to apply changes
pub const ISSUE_RESTART_REQUIRED: &str = "restart_required";

/// File name of the bundle manifest
pub const MANIFEST_FILE: &str = "manifest.json";

pub(crate) const RESTART_LOG_MESSAGE: &str = "Restart Home Assistant to apply changes";
